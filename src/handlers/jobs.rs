// handlers/jobs.rs
// Job handlers: status lookup and server-sent progress events

use futures::StreamExt;
use tracing::warn;
use warp::http::StatusCode;
use warp::sse::Event;
use warp::{Rejection, Reply};

use crate::job_events::JobEventStream;
use crate::models::JobResponse;
use crate::snapshot_service::{Conn, SnapshotService};
use crate::utils::{error_response, portal_error_response, success_response};

pub async fn job_status_handler(job_id: i64, service: SnapshotService) -> Result<impl Reply, Rejection> {
    match service.get_job(job_id, Conn::Fresh).await {
        Ok(Some(job)) => Ok(success_response(JobResponse { ok: true, job })),
        Ok(None) => Ok(error_response(StatusCode::NOT_FOUND, "job not found")),
        Err(e) => Ok(portal_error_response(&e)),
    }
}

pub async fn job_events_handler(job_id: i64, service: SnapshotService) -> Result<impl Reply, Rejection> {
    let stream = match JobEventStream::open(&service, job_id).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(job_id, "job event stream could not be opened: {}", e);
            return Ok(portal_error_response(&e));
        }
    };

    let events = stream.map(|event| Event::default().json_data(event));
    Ok(warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response())
}
