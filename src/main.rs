use std::sync::Arc;
use tracing::{error, info};
use zfs_snapshot_portal::auth::{default_key_file, get_or_create_admin_key, ApiKeys};
use zfs_snapshot_portal::middleware::{Connect, WsConnector};
use zfs_snapshot_portal::paths::PathGuard;
use zfs_snapshot_portal::snapshot_service::SnapshotService;
use zfs_snapshot_portal::{routes, Config};

//-----------------------------------------------------
// MAIN FUNCTION
//-----------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting ZFS Snapshot Portal v{}", env!("CARGO_PKG_VERSION"));
    let config = Config::load();

    // Use the configured admin key or generate and keep one
    let admin_key = match config.server.admin_key.clone() {
        Some(key) => key,
        None => {
            let key_file = default_key_file();
            let key = get_or_create_admin_key(&key_file).map_err(|e| {
                error!("Cannot read or create admin key at {}: {}", key_file.display(), e);
                e
            })?;
            info!("Admin API key (stored in {}): {}", key_file.display(), key);
            key
        }
    };
    let keys = ApiKeys::new(admin_key, config.server.viewer_key.clone());

    let connector: Arc<dyn Connect> = Arc::new(WsConnector::new(config.middleware.clone()));
    let service = SnapshotService::new(
        connector,
        PathGuard::new(&config.paths),
        config.snapshot_cache_ttl,
    );

    let routes = routes::build(service, config.middleware.clone(), keys);

    info!("Server listening on {}", config.server.listen);
    warp::serve(routes).run(config.server.listen).await;

    Ok(())
}
