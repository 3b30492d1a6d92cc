//-----------------------------------------------------
// ROUTES
//-----------------------------------------------------

use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

use crate::auth::{admin_only, authenticated, handle_rejection, require_configured, ApiKeys};
use crate::config::MiddlewareConfig;
use crate::handlers::*;
use crate::models::{BrowseQuery, CloneRequest, DiffQuery, RestoreRequest, RollbackRequest, SnapshotQuery};
use crate::snapshot_service::SnapshotService;

fn with_service(
    service: SnapshotService,
) -> impl Filter<Extract = (SnapshotService,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

/// Every route of the portal, with rejections rendered as JSON errors
///
/// Each route checks its path first, then that the middleware is
/// configured (503), then the caller's key (401/403).
pub fn build(
    service: SnapshotService,
    middleware: MiddlewareConfig,
    keys: ApiKeys,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let keys = Arc::new(keys);
    let configured = require_configured(Arc::new(middleware));
    let viewer = configured.clone().and(authenticated(keys.clone()));
    let admin = configured.clone().and(admin_only(keys));

    let health_routes = {
        // GET /health - middleware reachability, no key required
        warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and(configured.clone())
            .and(with_service(service.clone()))
            .and_then(health_handler)
    };

    let pool_routes = {
        // GET /api/pools - pools with their annotated datasets
        let tree = warp::path!("api" / "pools")
            .and(warp::get())
            .and(viewer.clone())
            .and(with_service(service.clone()))
            .and_then(pool_tree_handler);

        // GET /api/pools/health - pool name -> status
        let health = warp::path!("api" / "pools" / "health")
            .and(warp::get())
            .and(viewer.clone())
            .and(with_service(service.clone()))
            .and_then(pool_health_handler);

        tree.or(health)
    };

    let snapshot_routes = {
        // GET /api/snapshots?dataset= - newest first
        let list = warp::path!("api" / "snapshots")
            .and(warp::get())
            .and(viewer.clone())
            .and(warp::query::<SnapshotQuery>())
            .and(with_service(service.clone()))
            .and_then(list_snapshots_handler);

        // POST /api/snapshots/rollback
        let rollback = warp::path!("api" / "snapshots" / "rollback")
            .and(warp::post())
            .and(admin.clone())
            .and(warp::body::json())
            .and(with_service(service.clone()))
            .and_then(|body: RollbackRequest, service| rollback_handler(body, service));

        // POST /api/snapshots/clone
        let clone = warp::path!("api" / "snapshots" / "clone")
            .and(warp::post())
            .and(admin.clone())
            .and(warp::body::json())
            .and(with_service(service.clone()))
            .and_then(|body: CloneRequest, service| clone_handler(body, service));

        // GET /api/diff?dataset=&a=&b=
        let diff = warp::path!("api" / "diff")
            .and(warp::get())
            .and(viewer.clone())
            .and(warp::query::<DiffQuery>())
            .and(with_service(service.clone()))
            .and_then(diff_handler);

        list.or(rollback).or(clone).or(diff)
    };

    let file_routes = {
        // GET /api/browse?dataset=&snapshot=&subpath=
        let browse = warp::path!("api" / "browse")
            .and(warp::get())
            .and(viewer.clone())
            .and(warp::query::<BrowseQuery>())
            .and(with_service(service.clone()))
            .and_then(browse_handler);

        // GET /download/{dataset}/{snapshot}/{path} - one file from a snapshot
        let download = warp::path("download")
            .and(warp::path::tail())
            .and(warp::get())
            .and(viewer.clone())
            .and(with_service(service.clone()))
            .and_then(download_handler);

        // POST /api/restore - schedules a copy job
        let restore = warp::path!("api" / "restore")
            .and(warp::post())
            .and(admin.clone())
            .and(warp::body::json())
            .and(with_service(service.clone()))
            .and_then(|body: RestoreRequest, service| restore_handler(body, service));

        browse.or(download).or(restore)
    };

    let job_routes = {
        // GET /api/jobs/{id}
        let status = warp::path!("api" / "jobs" / i64)
            .and(warp::get())
            .and(viewer.clone())
            .and(with_service(service.clone()))
            .and_then(job_status_handler);

        // GET /events/jobs/{id} - server-sent events until the job finishes
        let events = warp::path!("events" / "jobs" / i64)
            .and(warp::get())
            .and(viewer)
            .and(with_service(service))
            .and_then(job_events_handler);

        status.or(events)
    };

    health_routes
        .or(pool_routes)
        .or(snapshot_routes)
        .or(file_routes)
        .or(job_routes)
        .recover(handle_rejection)
        .with(warp::trace::request())
}
