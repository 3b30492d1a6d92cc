// middleware/client.rs
// Authenticated request/response client on top of RpcTransport

use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::frames;
use super::transport::RpcTransport;
use crate::config::MiddlewareConfig;
use crate::error::{PortalError, Result};

/// One authenticated session with the storage middleware
///
/// Calls are strictly sequential: `&mut self` on every operation keeps a
/// second request from being written before the first one is answered.
pub struct MiddlewareClient {
    transport: RpcTransport,
    authenticated: bool,
    subscriptions: HashSet<String>,
}

impl MiddlewareClient {
    /// Connect to the configured endpoint and log in with the configured API key
    pub async fn connect(config: &MiddlewareConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(PortalError::Configuration(
                "set TRUENAS_URL and TRUENAS_API_KEY".to_string(),
            ));
        }

        let transport = RpcTransport::connect(config).await?;
        let mut client = MiddlewareClient::from_transport(transport);

        if let Err(e) = client.authenticate(config.api_key.as_deref()).await {
            warn!("Middleware login failed: {}", e);
            client.close().await;
            return Err(e);
        }

        info!("WS connect+auth success");
        Ok(client)
    }

    /// Wrap a transport that has completed the handshake but not logged in
    pub fn from_transport(transport: RpcTransport) -> Self {
        MiddlewareClient {
            transport,
            authenticated: false,
            subscriptions: HashSet::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Log in with an API key; a no-op once the session is authenticated
    pub async fn authenticate(&mut self, api_key: Option<&str>) -> Result<()> {
        if self.authenticated {
            return Ok(());
        }

        let key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PortalError::Auth("API key is not configured".to_string()))?;

        if !self.transport.is_connected() {
            return Err(PortalError::NotConnected);
        }

        let id = self
            .transport
            .send_request(frames::LOGIN_METHOD, &[json!(key)])
            .await?;
        let response = self.transport.await_response(id).await?;

        if let Some(error) = frames::error_payload(&response) {
            return Err(PortalError::Auth(format!("login rejected: {}", error)));
        }

        match response.get("result") {
            Some(Value::Bool(true)) => {
                self.authenticated = true;
                Ok(())
            }
            other => Err(PortalError::Auth(format!(
                "login rejected, result: {}",
                other.cloned().unwrap_or(Value::Null)
            ))),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.transport.is_connected() {
            return Err(PortalError::NotConnected);
        }
        if !self.authenticated {
            return Err(PortalError::NotAuthenticated);
        }
        Ok(())
    }

    /// Invoke a middleware method and return its `result` payload
    ///
    /// A backend error payload comes back as `PortalError::Middleware`
    /// carrying the payload untouched.
    pub async fn call(&mut self, method: &str, params: &[Value]) -> Result<Value> {
        self.ensure_ready()?;

        let id = self.transport.send_request(method, params).await?;
        debug!(method, id, "middleware call");
        let response = self.transport.await_response(id).await?;

        if let Some(error) = frames::error_payload(&response) {
            debug!(method, id, %error, "middleware call failed");
            return Err(PortalError::Middleware(error.clone()));
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Subscribe to change events of a collection
    /// A request id is consumed even though the frame carries the subscription id.
    pub async fn subscribe(&mut self, collection: &str, subscription_id: &str) -> Result<()> {
        self.ensure_ready()?;
        self.transport.next_id();
        self.transport
            .send_frame(&frames::subscribe(collection, subscription_id))
            .await?;
        // events may now arrive ahead of any result
        self.subscriptions.insert(subscription_id.to_string());
        self.transport.keep_events(true);
        debug!(collection, subscription_id, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&mut self, subscription_id: &str) -> Result<()> {
        self.ensure_ready()?;
        self.transport.next_id();
        self.transport
            .send_frame(&frames::unsubscribe(subscription_id))
            .await?;
        self.subscriptions.remove(subscription_id);
        self.transport.keep_events(!self.subscriptions.is_empty());
        debug!(subscription_id, "unsubscribed");
        Ok(())
    }

    /// Next pushed frame, pings excluded; blocks until one arrives
    pub async fn receive_event(&mut self) -> Result<Value> {
        if !self.transport.is_connected() {
            return Err(PortalError::NotConnected);
        }
        self.transport.recv_event().await
    }

    /// Close the connection; repeated calls are harmless
    pub async fn close(&mut self) {
        self.transport.close().await;
        self.authenticated = false;
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::FakeMiddleware;

    #[tokio::test]
    async fn test_login_and_call() {
        let fake = FakeMiddleware::new();
        fake.respond("pool.dataset.query", json!([{"name": "tank"}]));

        let mut client = fake.client().await;
        assert!(client.is_authenticated());

        let result = client.call("pool.dataset.query", &[json!([])]).await.unwrap();
        assert_eq!(result, json!([{"name": "tank"}]));
        assert_eq!(fake.calls_to("pool.dataset.query"), 1);
    }

    #[tokio::test]
    async fn test_pings_are_answered_during_handshake_and_calls() {
        let fake = FakeMiddleware::new();
        fake.ping_before_every_reply();
        fake.respond("core.ping", json!("pong"));

        let mut client = fake.client().await;
        let result = client.call("core.ping", &[]).await.unwrap();
        assert_eq!(result, json!("pong"));

        let pongs = fake
            .sent_frames()
            .iter()
            .filter(|f| f["msg"] == "pong")
            .count();
        // handshake, login and the call each saw one ping
        assert_eq!(pongs, 3);
    }

    #[tokio::test]
    async fn test_unrelated_frames_are_discarded() {
        let fake = FakeMiddleware::new();
        fake.noise_before_every_reply();
        fake.respond("system.info", json!({"version": "24.04"}));

        let mut client = fake.client().await;
        let result = client.call("system.info", &[]).await.unwrap();
        assert_eq!(result["version"], "24.04");
    }

    #[tokio::test]
    async fn test_request_ids_increase_across_calls_and_subscriptions() {
        let fake = FakeMiddleware::new();
        fake.respond("a", json!(1));
        fake.respond("b", json!(2));

        let mut client = fake.client().await;
        client.call("a", &[]).await.unwrap();
        client.subscribe("core.get_jobs", "sub-1").await.unwrap();
        client.call("b", &[]).await.unwrap();

        let ids: Vec<u64> = fake
            .sent_frames()
            .iter()
            .filter(|f| f["msg"] == "method")
            .filter_map(|f| f["id"].as_u64())
            .collect();
        // login=1, a=2, sub consumed 3, b=4
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_events_read_during_a_call_are_kept_while_subscribed() {
        let fake = FakeMiddleware::new();
        fake.respond("core.get_jobs", json!([]));
        let event = json!({"msg": "changed", "collection": "core.get_jobs", "fields": {"id": 1}});
        fake.emit_before_reply("core.get_jobs", event.clone());

        let mut client = fake.client().await;
        // not subscribed: the event is just noise
        client.call("core.get_jobs", &[]).await.unwrap();

        client.subscribe("core.get_jobs", "sub-1").await.unwrap();
        client.call("core.get_jobs", &[]).await.unwrap();
        assert_eq!(client.receive_event().await.unwrap(), event);

        // after unsubscribing nothing is queued any more
        client.unsubscribe("sub-1").await.unwrap();
        client.call("core.get_jobs", &[]).await.unwrap();
        fake.broadcast(json!({"msg": "added", "collection": "alert.list"}));
        assert_eq!(client.receive_event().await.unwrap()["collection"], "alert.list");
    }

    #[tokio::test]
    async fn test_backend_error_is_passed_through() {
        let fake = FakeMiddleware::new();
        fake.fail("pool.snapshot.rollback", json!("[EBUSY] dataset is busy"));

        let mut client = fake.client().await;
        let err = client
            .call("pool.snapshot.rollback", &[json!("tank/a@s1")])
            .await
            .unwrap_err();
        match err {
            PortalError::Middleware(payload) => assert_eq!(payload, json!("[EBUSY] dataset is busy")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_rejected_when_result_is_not_true() {
        let fake = FakeMiddleware::new();
        fake.respond(frames::LOGIN_METHOD, json!(false));

        let transport = fake.transport().await;
        let mut client = MiddlewareClient::from_transport(transport);
        let err = client.authenticate(Some("bad-key")).await.unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_error_payload_is_auth_error() {
        let fake = FakeMiddleware::new();
        fake.fail(frames::LOGIN_METHOD, json!("invalid key"));

        let transport = fake.transport().await;
        let mut client = MiddlewareClient::from_transport(transport);
        let err = client.authenticate(Some("bad-key")).await.unwrap_err();
        assert!(matches!(err, PortalError::Auth(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let fake = FakeMiddleware::new();
        let transport = fake.transport().await;
        let mut client = MiddlewareClient::from_transport(transport);

        assert!(matches!(
            client.authenticate(None).await,
            Err(PortalError::Auth(_))
        ));
        assert!(matches!(
            client.authenticate(Some("")).await,
            Err(PortalError::Auth(_))
        ));
        assert_eq!(fake.calls_to(frames::LOGIN_METHOD), 0);
    }

    #[tokio::test]
    async fn test_second_authenticate_is_a_no_op() {
        let fake = FakeMiddleware::new();
        let mut client = fake.client().await;
        client.authenticate(Some("other")).await.unwrap();
        assert_eq!(fake.calls_to(frames::LOGIN_METHOD), 1);
    }

    #[tokio::test]
    async fn test_call_before_login_is_rejected() {
        let fake = FakeMiddleware::new();
        let transport = fake.transport().await;
        let mut client = MiddlewareClient::from_transport(transport);

        let err = client.call("system.info", &[]).await.unwrap_err();
        assert!(matches!(err, PortalError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_further_calls() {
        let fake = FakeMiddleware::new();
        let mut client = fake.client().await;

        client.close().await;
        client.close().await;
        assert_eq!(fake.closed_channels(), 1);

        let err = client.call("system.info", &[]).await.unwrap_err();
        assert!(matches!(err, PortalError::NotConnected));
        assert!(matches!(
            client.receive_event().await,
            Err(PortalError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_channel() {
        let fake = FakeMiddleware::new();
        fake.reject_handshake();

        let result = fake.try_transport().await;
        assert!(matches!(result, Err(PortalError::Connection(_))));
        assert_eq!(fake.closed_channels(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_backend_times_out() {
        let fake = FakeMiddleware::new();
        fake.hang("pool.query");

        let mut client = fake.client().await;
        let err = client.call("pool.query", &[]).await.unwrap_err();
        assert!(matches!(err, PortalError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_connect_fails_fast() {
        let config = MiddlewareConfig::default();
        let err = MiddlewareClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, PortalError::Configuration(_)));
    }
}
