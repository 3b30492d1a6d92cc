// middleware/testing.rs
// Scripted in-memory middleware for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::client::MiddlewareClient;
use super::connector::Connect;
use super::frames;
use super::transport::{FrameChannel, RpcTransport};
use crate::error::{PortalError, Result};

pub const TEST_API_KEY: &str = "test-key";

/// How the fake answers one method call
#[derive(Clone, Debug)]
pub enum Reply {
    Result(Value),
    Error(Value),
    /// Never answer
    Hang,
}

type Handler = Arc<dyn Fn(&[Value]) -> Reply + Send + Sync>;

#[derive(Default)]
struct FakeState {
    handlers: HashMap<String, Handler>,
    before_reply: HashMap<String, Vec<Value>>,
    calls: Vec<(String, Vec<Value>)>,
    sent: Vec<Value>,
    live: Vec<(usize, UnboundedSender<Value>)>,
    next_channel: usize,
    closed: usize,
    ping_before_reply: bool,
    noise_before_reply: bool,
    reject_handshake: bool,
    refuse_connections: bool,
}

/// Shared handle on a scripted middleware; clones see the same state
#[derive(Clone, Default)]
pub struct FakeMiddleware {
    state: Arc<Mutex<FakeState>>,
}

impl FakeMiddleware {
    pub fn new() -> Self {
        FakeMiddleware::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&[Value]) -> Reply + Send + Sync + 'static,
    {
        self.lock()
            .handlers
            .insert(method.to_string(), Arc::new(handler));
    }

    pub fn respond(&self, method: &str, result: Value) {
        self.on(method, move |_| Reply::Result(result.clone()));
    }

    pub fn fail(&self, method: &str, error: Value) {
        self.on(method, move |_| Reply::Error(error.clone()));
    }

    pub fn hang(&self, method: &str) {
        self.on(method, |_| Reply::Hang);
    }

    /// Push `frame` ahead of every reply to `method`
    pub fn emit_before_reply(&self, method: &str, frame: Value) {
        self.lock()
            .before_reply
            .entry(method.to_string())
            .or_default()
            .push(frame);
    }

    pub fn ping_before_every_reply(&self) {
        self.lock().ping_before_reply = true;
    }

    pub fn noise_before_every_reply(&self) {
        self.lock().noise_before_reply = true;
    }

    pub fn reject_handshake(&self) {
        self.lock().reject_handshake = true;
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// Push a frame to every open connection
    pub fn broadcast(&self, frame: Value) {
        for (_, tx) in self.lock().live.iter() {
            let _ = tx.send(frame.clone());
        }
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|(m, _)| m == method).count()
    }

    pub fn params_of(&self, method: &str) -> Vec<Vec<Value>> {
        self.lock()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Every frame any client has written, in order
    pub fn sent_frames(&self) -> Vec<Value> {
        self.lock().sent.clone()
    }

    pub fn frames_of_kind(&self, kind: &str) -> Vec<Value> {
        self.sent_frames()
            .into_iter()
            .filter(|f| frames::kind(f) == Some(kind))
            .collect()
    }

    pub fn opened_channels(&self) -> usize {
        self.lock().next_channel
    }

    pub fn closed_channels(&self) -> usize {
        self.lock().closed
    }

    pub fn open_channels(&self) -> usize {
        self.lock().live.len()
    }

    pub fn channel(&self) -> FakeChannel {
        let (tx, rx) = unbounded_channel();
        let mut state = self.lock();
        let id = state.next_channel;
        state.next_channel += 1;
        state.live.push((id, tx.clone()));
        FakeChannel {
            id,
            backend: self.clone(),
            tx,
            rx,
        }
    }

    pub async fn try_transport(&self) -> Result<RpcTransport> {
        RpcTransport::establish(Box::new(self.channel()), Duration::from_secs(30)).await
    }

    /// A transport past the handshake, not logged in
    pub async fn transport(&self) -> RpcTransport {
        self.try_transport().await.unwrap()
    }

    /// A logged-in client
    pub async fn client(&self) -> MiddlewareClient {
        let mut client = MiddlewareClient::from_transport(self.transport().await);
        client.authenticate(Some(TEST_API_KEY)).await.unwrap();
        client
    }

    pub fn connector(&self) -> Arc<dyn Connect> {
        Arc::new(FakeConnector {
            backend: self.clone(),
        })
    }

    fn handle(&self, frame: &Value, tx: &UnboundedSender<Value>) {
        let (ping, noise, reject) = {
            let mut state = self.lock();
            state.sent.push(frame.clone());
            (
                state.ping_before_reply,
                state.noise_before_reply,
                state.reject_handshake,
            )
        };

        let prelude = |tx: &UnboundedSender<Value>| {
            if ping {
                let _ = tx.send(json!({"msg": "ping"}));
            }
            if noise {
                let _ = tx.send(json!({"msg": "added", "collection": "alert.list", "id": 9999}));
            }
        };

        match frames::kind(frame) {
            Some("connect") => {
                prelude(tx);
                if reject {
                    let _ = tx.send(json!({"msg": "failed", "version": "1"}));
                } else {
                    let _ = tx.send(json!({"msg": "connected", "session": "fake-session"}));
                }
            }
            Some("method") => {
                let id = frame["id"].clone();
                let method = frame["method"].as_str().unwrap_or_default().to_string();
                let params = frame["params"].as_array().cloned().unwrap_or_default();

                let (handler, extra) = {
                    let mut state = self.lock();
                    state.calls.push((method.clone(), params.clone()));
                    (
                        state.handlers.get(&method).cloned(),
                        state.before_reply.get(&method).cloned().unwrap_or_default(),
                    )
                };

                let reply = match handler {
                    Some(handler) => handler(&params),
                    None if method == frames::LOGIN_METHOD => Reply::Result(json!(true)),
                    None => Reply::Error(json!(format!("[ENOMETHOD] {} not scripted", method))),
                };

                prelude(tx);
                for frame in extra {
                    let _ = tx.send(frame);
                }
                match reply {
                    Reply::Result(result) => {
                        let _ = tx.send(json!({"msg": "result", "id": id, "result": result}));
                    }
                    Reply::Error(error) => {
                        let _ = tx.send(json!({"msg": "result", "id": id, "error": error}));
                    }
                    Reply::Hang => {}
                }
            }
            _ => {}
        }
    }
}

pub struct FakeChannel {
    id: usize,
    backend: FakeMiddleware,
    tx: UnboundedSender<Value>,
    rx: UnboundedReceiver<Value>,
}

#[async_trait]
impl FrameChannel for FakeChannel {
    async fn send_frame(&mut self, frame: &Value) -> Result<()> {
        self.backend.handle(frame, &self.tx);
        Ok(())
    }

    async fn recv_frame(&mut self) -> Result<Value> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| PortalError::Connection("fake channel closed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.backend.lock();
        state.closed += 1;
        let id = self.id;
        state.live.retain(|(live, _)| *live != id);
        Ok(())
    }
}

struct FakeConnector {
    backend: FakeMiddleware,
}

#[async_trait]
impl Connect for FakeConnector {
    async fn connect(&self) -> Result<MiddlewareClient> {
        if self.backend.lock().refuse_connections {
            return Err(PortalError::Connection(
                "cannot reach ws://fake/websocket: connection refused".to_string(),
            ));
        }
        let transport = self.backend.try_transport().await?;
        let mut client = MiddlewareClient::from_transport(transport);
        if let Err(e) = client.authenticate(Some(TEST_API_KEY)).await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }
}
