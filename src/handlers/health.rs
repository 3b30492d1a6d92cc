// handlers/health.rs
// Unauthenticated liveness check that also proves the middleware is reachable

use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::models::HealthResponse;
use crate::snapshot_service::{Conn, SnapshotService};
use crate::utils::success_response;

pub async fn health_handler(service: SnapshotService) -> Result<impl Reply, Rejection> {
    match service.validate_connectivity(Conn::Fresh).await {
        Ok(version) => Ok(success_response(HealthResponse {
            ok: true,
            truenas: "ok".to_string(),
            version: Some(version),
            error: None,
        })),
        Err(e) => {
            warn!("health check failed: {}", e);
            let body = HealthResponse {
                ok: false,
                truenas: "error".to_string(),
                version: None,
                error: Some(e.to_string()),
            };
            Ok(warp::reply::with_status(warp::reply::json(&body), StatusCode::SERVICE_UNAVAILABLE)
                .into_response())
        }
    }
}
