// handlers/datasets.rs
// Dataset handlers: pool tree and pool health

use warp::{Rejection, Reply};

use crate::models::{PoolHealthResponse, PoolTreeResponse};
use crate::snapshot_service::{Conn, SnapshotService};
use crate::utils::{portal_error_response, success_response};

pub async fn pool_tree_handler(service: SnapshotService) -> Result<impl Reply, Rejection> {
    let mut client = match service.connect().await {
        Ok(client) => client,
        Err(e) => return Ok(portal_error_response(&e)),
    };

    // datasets and snapshots share one connection
    let pools = match service.list_datasets(Conn::Borrowed(&mut client)).await {
        Ok(datasets) => Ok(service
            .build_pool_tree(datasets, Conn::Borrowed(&mut client))
            .await),
        Err(e) => Err(e),
    };
    client.close().await;

    match pools {
        Ok(pools) => Ok(success_response(PoolTreeResponse {
            status: "success".to_string(),
            pools,
        })),
        Err(e) => Ok(portal_error_response(&e)),
    }
}

pub async fn pool_health_handler(service: SnapshotService) -> Result<impl Reply, Rejection> {
    match service.pools_health(Conn::Fresh).await {
        Ok(pools) => Ok(success_response(PoolHealthResponse {
            status: "success".to_string(),
            pools,
        })),
        Err(e) => Ok(portal_error_response(&e)),
    }
}
