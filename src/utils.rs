//-----------------------------------------------------
// HELPER FUNCTIONS
//-----------------------------------------------------

use chrono::{DateTime, Utc};
use serde::Serialize;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::error::PortalError;
use crate::models::ActionResponse;

// JSON body with 200 OK
pub fn success_response<T: Serialize>(body: T) -> Response {
    warp::reply::with_status(warp::reply::json(&body), StatusCode::OK).into_response()
}

// {"status":"error","message":...} with the given status
pub fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ActionResponse {
        status: "error".to_string(),
        message: message.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

// Error envelope with the status the error maps to
pub fn portal_error_response(err: &PortalError) -> Response {
    error_response(err.status_code(), &err.to_string())
}

/// Human-readable age of a timestamp relative to `now`
pub fn friendly_date(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = timestamp else {
        return "unknown".to_string();
    };

    let seconds = (now - ts).num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h ago", seconds / 3600)
    } else {
        ts.format("%b %d, %Y").to_string()
    }
}
