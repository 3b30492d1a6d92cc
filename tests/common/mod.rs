// Shared setup for the HTTP integration tests

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;
use zfs_snapshot_portal::auth::ApiKeys;
use zfs_snapshot_portal::config::{Config, FileSettings};
use zfs_snapshot_portal::middleware::{Connect, WsConnector};
use zfs_snapshot_portal::paths::PathGuard;
use zfs_snapshot_portal::routes;
use zfs_snapshot_portal::snapshot_service::SnapshotService;

pub const ADMIN_KEY: &str = "integration-admin";
pub const VIEWER_KEY: &str = "integration-viewer";

/// Nothing listens on port 1, so every connection attempt is refused
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1";

pub fn config(vars: &[(&str, &str)]) -> Config {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_sources(FileSettings::default(), |name| map.get(name).cloned())
}

/// Middleware configured but unreachable
pub fn unreachable_config() -> Config {
    config(&[("TRUENAS_URL", UNREACHABLE_URL), ("TRUENAS_API_KEY", "middleware-key")])
}

pub fn routes(config: Config) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let connector: Arc<dyn Connect> = Arc::new(WsConnector::new(config.middleware.clone()));
    let service = SnapshotService::new(
        connector,
        PathGuard::new(&config.paths),
        config.snapshot_cache_ttl,
    );
    let keys = ApiKeys::new(ADMIN_KEY.to_string(), Some(VIEWER_KEY.to_string()));
    routes::build(service, config.middleware, keys)
}

pub fn json_body(resp: &warp::http::Response<warp::hyper::body::Bytes>) -> serde_json::Value {
    serde_json::from_slice(resp.body()).unwrap()
}
