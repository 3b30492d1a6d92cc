// handlers/files.rs
// Snapshot file handlers: browse, download and restore

use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use warp::http::{header, StatusCode};
use warp::hyper::Body;
use warp::path::Tail;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::models::{required, Breadcrumb, BrowseQuery, BrowseResponse, RestoreRequest, RestoreResponse};
use crate::paths::{breadcrumbs, normalize_subpath};
use crate::snapshot_service::{Conn, SnapshotService};
use crate::utils::{error_response, portal_error_response, success_response};

pub async fn browse_handler(query: BrowseQuery, service: SnapshotService) -> Result<impl Reply, Rejection> {
    let (Some(dataset), Some(snapshot)) = (required(&query.dataset), required(&query.snapshot)) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "dataset and snapshot are required",
        ));
    };

    let subpath = match normalize_subpath(query.subpath.as_deref().unwrap_or("")) {
        Ok(subpath) => subpath,
        Err(e) => {
            warn!(dataset, snapshot, raw = ?query.subpath, "browse subpath rejected");
            return Ok(portal_error_response(&e));
        }
    };

    info!(dataset, snapshot, subpath = %subpath, "browse request");
    match service
        .list_snapshot_files(dataset, snapshot, &subpath, Conn::Fresh)
        .await
    {
        Ok(entries) => Ok(success_response(BrowseResponse {
            status: "success".to_string(),
            dataset: dataset.to_string(),
            snapshot: snapshot.to_string(),
            breadcrumbs: breadcrumbs(&subpath)
                .into_iter()
                .map(|(name, path)| Breadcrumb { name, path })
                .collect(),
            current_path: subpath,
            entries,
        })),
        Err(e) => Ok(portal_error_response(&e)),
    }
}

/// Stream one file out of a snapshot as an attachment
///
/// Anything that does not name a readable file inside the snapshot is a 404.
pub async fn download_handler(tail: Tail, service: SnapshotService) -> Result<Response, Rejection> {
    let not_found = || error_response(StatusCode::NOT_FOUND, "File not found");

    let Ok(request_path) = urlencoding::decode(tail.as_str()) else {
        warn!(raw = tail.as_str(), "download path is not valid UTF-8");
        return Ok(not_found());
    };

    let found = match service.paths().locate_snapshot_file(&request_path) {
        Ok(found) => found,
        Err(e) => {
            warn!(path = %request_path, "download rejected: {}", e);
            return Ok(not_found());
        }
    };

    let file = match tokio::fs::File::open(&found.path).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %found.path.display(), "cannot open snapshot file: {}", e);
            return Ok(not_found());
        }
    };
    let length = file.metadata().await.ok().map(|meta| meta.len());

    // named after what was asked for, not where a link led
    let filename: String = found
        .subpath
        .rsplit('/')
        .next()
        .unwrap_or("download")
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();

    info!(
        target: "audit",
        dataset = %found.dataset,
        snapshot = %found.snapshot,
        path = %found.subpath,
        "snapshot file downloaded"
    );

    let mut builder = warp::http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        );
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length.to_string());
    }

    match builder.body(Body::wrap_stream(ReaderStream::new(file))) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            warn!("cannot build download response: {}", e);
            Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))
        }
    }
}

pub async fn restore_handler(body: RestoreRequest, service: SnapshotService) -> Result<impl Reply, Rejection> {
    let (Some(dataset), Some(snapshot), Some(path)) = (
        required(&body.dataset),
        required(&body.snapshot),
        required(&body.path),
    ) else {
        return Ok(error_response(
            StatusCode::BAD_REQUEST,
            "dataset, snapshot and path are required",
        ));
    };

    let destination = match required(&body.destination) {
        Some(destination) => destination.to_string(),
        None => service.paths().live_destination(dataset, path),
    };

    info!(
        target: "audit",
        dataset,
        snapshot,
        path,
        destination = %destination,
        overwrite = body.overwrite,
        "restore requested"
    );
    match service
        .restore_path(dataset, snapshot, path, &destination, body.overwrite, Conn::Fresh)
        .await
    {
        Ok(job_id) => {
            info!(target: "audit", job_id, dataset, snapshot, path, "restore submitted");
            Ok(success_response(RestoreResponse {
                status: "submitted".to_string(),
                job_id,
            }))
        }
        Err(e) => {
            warn!(target: "audit", dataset, snapshot, path, "restore failed: {}", e);
            Ok(portal_error_response(&e))
        }
    }
}
