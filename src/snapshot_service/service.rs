// snapshot_service/service.rs
// SnapshotService struct, constructor and connection leasing

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::cache::SnapshotCache;
use crate::error::Result;
use crate::middleware::{Connect, MiddlewareClient};
use crate::paths::PathGuard;

/// Domain operations over the storage middleware
/// Cheap to clone; clones share the snapshot cache.
#[derive(Clone)]
pub struct SnapshotService {
    pub(crate) connector: Arc<dyn Connect>,
    pub(crate) paths: PathGuard,
    pub(crate) cache: Arc<SnapshotCache>,
}

/// Which connection an operation runs on
pub enum Conn<'a> {
    /// The caller's connection; left open afterwards
    Borrowed(&'a mut MiddlewareClient),
    /// Open a connection for this operation only and close it when done
    Fresh,
}

pub(crate) enum Lease<'a> {
    Borrowed(&'a mut MiddlewareClient),
    Owned(MiddlewareClient),
}

impl<'a> Lease<'a> {
    pub(crate) fn client(&mut self) -> &mut MiddlewareClient {
        match self {
            Lease::Borrowed(client) => &mut **client,
            Lease::Owned(client) => client,
        }
    }

    /// Close the connection if this lease opened it
    pub(crate) async fn release(self) {
        if let Lease::Owned(mut client) = self {
            client.close().await;
        }
    }
}

impl SnapshotService {
    pub fn new(connector: Arc<dyn Connect>, paths: PathGuard, cache_ttl: Duration) -> Self {
        SnapshotService {
            connector,
            paths,
            cache: Arc::new(SnapshotCache::new(cache_ttl)),
        }
    }

    pub fn paths(&self) -> &PathGuard {
        &self.paths
    }

    /// A new authenticated connection owned by the caller
    pub async fn connect(&self) -> Result<MiddlewareClient> {
        self.connector.connect().await
    }

    pub(crate) async fn lease<'a>(&self, conn: Conn<'a>) -> Result<Lease<'a>> {
        match conn {
            Conn::Borrowed(client) => Ok(Lease::Borrowed(client)),
            Conn::Fresh => Ok(Lease::Owned(self.connector.connect().await?)),
        }
    }

    /// Run one middleware call on the given connection
    pub(crate) async fn call(&self, conn: Conn<'_>, method: &str, params: &[Value]) -> Result<Value> {
        let mut lease = self.lease(conn).await?;
        let result = lease.client().call(method, params).await;
        lease.release().await;
        result
    }

    /// Cheap round trip used by health checks; returns the appliance version
    pub async fn validate_connectivity(&self, conn: Conn<'_>) -> Result<Value> {
        self.call(conn, "system.version", &[]).await
    }
}
