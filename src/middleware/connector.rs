// middleware/connector.rs
// Factory for fresh authenticated connections

use async_trait::async_trait;

use super::client::MiddlewareClient;
use crate::config::MiddlewareConfig;
use crate::error::Result;

/// Opens a new authenticated middleware session on demand
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self) -> Result<MiddlewareClient>;
}

/// Connects over the websocket described by the middleware config
pub struct WsConnector {
    config: MiddlewareConfig,
}

impl WsConnector {
    pub fn new(config: MiddlewareConfig) -> Self {
        WsConnector { config }
    }
}

#[async_trait]
impl Connect for WsConnector {
    async fn connect(&self) -> Result<MiddlewareClient> {
        MiddlewareClient::connect(&self.config).await
    }
}
