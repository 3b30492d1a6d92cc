// handlers/snapshots.rs
// Snapshot handlers: list, rollback, clone, diff

use chrono::Utc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::models::{
    required, CloneRequest, CloneResponse, DiffQuery, DiffResponse, RollbackRequest,
    RollbackResponse, SnapshotListResponse, SnapshotQuery, SnapshotView,
};
use crate::snapshot_service::{Conn, SnapshotService};
use crate::utils::{error_response, friendly_date, portal_error_response, success_response};

pub async fn list_snapshots_handler(
    query: SnapshotQuery,
    service: SnapshotService,
) -> Result<impl Reply, Rejection> {
    let dataset = required(&query.dataset);
    match service.list_snapshots(dataset, Conn::Fresh).await {
        Ok(snapshots) => {
            let now = Utc::now();
            let snapshots = snapshots
                .into_iter()
                .map(|snapshot| SnapshotView {
                    age: friendly_date(snapshot.created_at, now),
                    snapshot,
                })
                .collect();
            Ok(success_response(SnapshotListResponse {
                status: "success".to_string(),
                dataset: dataset.map(str::to_string),
                snapshots,
            }))
        }
        Err(e) => Ok(portal_error_response(&e)),
    }
}

pub async fn rollback_handler(
    body: RollbackRequest,
    service: SnapshotService,
) -> Result<impl Reply, Rejection> {
    let (Some(dataset), Some(snapshot)) = (required(&body.dataset), required(&body.snapshot)) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "dataset and snapshot are required",
        ));
    };

    info!(target: "audit", dataset, snapshot, "rollback requested");
    match service.rollback_snapshot(dataset, snapshot, Conn::Fresh).await {
        Ok(result) => {
            info!(target: "audit", dataset, snapshot, "rollback completed");
            Ok(success_response(RollbackResponse {
                status: "success".to_string(),
                message: format!("Rolled back {} to {}", dataset, snapshot),
                result,
            }))
        }
        Err(e) => {
            warn!(target: "audit", dataset, snapshot, "rollback failed: {}", e);
            Ok(portal_error_response(&e))
        }
    }
}

pub async fn clone_handler(body: CloneRequest, service: SnapshotService) -> Result<impl Reply, Rejection> {
    let (Some(dataset), Some(snapshot)) = (required(&body.dataset), required(&body.snapshot)) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "dataset and snapshot are required",
        ));
    };
    let Some(target) = required(&body.target) else {
        return Ok(error_response(StatusCode::BAD_REQUEST, "Missing target dataset"));
    };

    info!(target: "audit", dataset, snapshot, clone = target, "clone requested");
    match service.clone_snapshot(dataset, snapshot, target, Conn::Fresh).await {
        Ok(result) => Ok(success_response(CloneResponse {
            status: "success".to_string(),
            message: format!("Cloned {}@{} to {}", dataset, snapshot, target),
            target: target.to_string(),
            result,
        })),
        Err(e) => {
            warn!(target: "audit", dataset, snapshot, clone = target, "clone failed: {}", e);
            Ok(portal_error_response(&e))
        }
    }
}

pub async fn diff_handler(query: DiffQuery, service: SnapshotService) -> Result<impl Reply, Rejection> {
    let (Some(dataset), Some(a), Some(b)) = (
        required(&query.dataset),
        required(&query.a),
        required(&query.b),
    ) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "dataset, a and b are required",
        ));
    };

    info!(target: "audit", dataset, a, b, "diff requested");
    match service.snapshot_diff(dataset, a, b, Conn::Fresh).await {
        Ok(diff) => Ok(success_response(DiffResponse {
            status: "success".to_string(),
            dataset: dataset.to_string(),
            a: a.to_string(),
            b: b.to_string(),
            diff,
        })),
        Err(e) => Ok(portal_error_response(&e)),
    }
}
