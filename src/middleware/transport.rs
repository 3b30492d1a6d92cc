// middleware/transport.rs
// RpcTransport: one persistent websocket to the middleware, framed by request id

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};
use url::Url;

use super::frames;
use super::tls;
use crate::config::MiddlewareConfig;
use crate::error::{PortalError, Result};

/// A bidirectional channel of JSON frames
#[async_trait]
pub trait FrameChannel: Send {
    async fn send_frame(&mut self, frame: &Value) -> Result<()>;

    /// Next frame from the peer; waits as long as it takes
    async fn recv_frame(&mut self) -> Result<Value>;

    async fn close(&mut self) -> Result<()>;
}

/// Websocket channel (plain or TLS) to the middleware endpoint
pub struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsChannel {
    /// Open the socket and perform the websocket upgrade, bounded by the connect timeout
    pub async fn open(config: &MiddlewareConfig) -> Result<Self> {
        let ws_url = config.ws_url()?;
        let parsed = Url::parse(&ws_url)
            .map_err(|e| PortalError::Configuration(format!("invalid websocket URL {}: {}", ws_url, e)))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| PortalError::Configuration(format!("websocket URL has no host: {}", ws_url)))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| PortalError::Configuration(format!("websocket URL has no port: {}", ws_url)))?;

        let connector = match parsed.scheme() {
            "wss" => Connector::Rustls(Arc::new(tls::client_config(config)?)),
            "ws" => Connector::Plain,
            other => {
                return Err(PortalError::Configuration(format!(
                    "websocket URL scheme must be ws or wss; got: {:?}",
                    other
                )))
            }
        };

        info!(url = %ws_url, "WS connect start");

        let connect = async {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| PortalError::Connection(format!("cannot reach {}: {}", ws_url, e)))?;
            let (stream, _response) =
                client_async_tls_with_config(ws_url.as_str(), tcp, None, Some(connector))
                    .await
                    .map_err(|e| {
                        PortalError::Connection(format!("websocket upgrade with {} failed: {}", ws_url, e))
                    })?;
            Ok::<_, PortalError>(stream)
        };

        let stream = timeout(config.connect_timeout, connect).await.map_err(|_| {
            PortalError::Connection(format!(
                "connect to {} timed out after {}s",
                ws_url,
                config.connect_timeout.as_secs()
            ))
        })??;

        Ok(WsChannel { stream })
    }
}

#[async_trait]
impl FrameChannel for WsChannel {
    async fn send_frame(&mut self, frame: &Value) -> Result<()> {
        self.stream
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| PortalError::Connection(format!("send failed: {}", e)))
    }

    async fn recv_frame(&mut self) -> Result<Value> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                Some(Ok(Message::Binary(bytes))) => return Ok(serde_json::from_slice(&bytes)?),
                // websocket-level control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                    continue
                }
                Some(Ok(Message::Close(frame))) => {
                    return Err(PortalError::Connection(format!(
                        "connection closed by middleware: {:?}",
                        frame
                    )))
                }
                Some(Err(e)) => return Err(PortalError::Connection(format!("receive failed: {}", e))),
                None => return Err(PortalError::Connection("connection closed".to_string())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| PortalError::Connection(format!("close failed: {}", e)))
    }
}

/// Collection events held back while a response is awaited
const MAX_PENDING_EVENTS: usize = 1024;

/// Owns one connection and its request-id counter
///
/// Exactly one reader drives the channel: responses are awaited one at a
/// time and every frame that is not the awaited result is dropped, except
/// pings which are answered with a pong. While events are kept, collection
/// events read during a call are queued for `recv_event` instead.
pub struct RpcTransport {
    channel: Option<Box<dyn FrameChannel>>,
    last_id: u64,
    call_timeout: Duration,
    keep_events: bool,
    pending: VecDeque<Value>,
}

impl RpcTransport {
    /// Open a websocket to the configured endpoint and complete the protocol handshake
    pub async fn connect(config: &MiddlewareConfig) -> Result<Self> {
        let channel = WsChannel::open(config).await?;
        RpcTransport::establish(Box::new(channel), config.call_timeout).await
    }

    /// Run the handshake over an already-open channel
    /// The channel is closed again if the handshake fails.
    pub async fn establish(channel: Box<dyn FrameChannel>, call_timeout: Duration) -> Result<Self> {
        let mut transport = RpcTransport {
            channel: Some(channel),
            last_id: 0,
            call_timeout,
            keep_events: false,
            pending: VecDeque::new(),
        };

        if let Err(e) = transport.handshake().await {
            transport.close().await;
            return Err(e);
        }

        Ok(transport)
    }

    async fn handshake(&mut self) -> Result<()> {
        self.send_frame(&frames::handshake()).await?;

        let limit = self.call_timeout;
        let wait = async {
            loop {
                let frame = self.read_frame().await?;
                match frames::kind(&frame) {
                    Some("connected") => return Ok::<(), PortalError>(()),
                    Some("failed") => {
                        return Err(PortalError::Connection(format!(
                            "Middleware handshake failed: {}",
                            frame
                        )))
                    }
                    _ => trace!(%frame, "discarding frame during handshake"),
                }
            }
        };

        timeout(limit, wait).await.map_err(|_| {
            PortalError::Connection(format!(
                "Middleware handshake timed out after {}s",
                limit.as_secs()
            ))
        })?
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Queue collection events seen while awaiting responses; off drops the queue
    pub fn keep_events(&mut self, keep: bool) {
        self.keep_events = keep;
        if !keep {
            self.pending.clear();
        }
    }

    /// Allocate the next request id; ids start at 1 and are never reused
    pub fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    pub async fn send_frame(&mut self, frame: &Value) -> Result<()> {
        let channel = self.channel.as_mut().ok_or(PortalError::NotConnected)?;
        trace!(%frame, "frame out");
        channel.send_frame(frame).await
    }

    /// Write a method frame and return the id it was sent with
    pub async fn send_request(&mut self, method: &str, params: &[Value]) -> Result<u64> {
        let id = self.next_id();
        self.send_frame(&frames::method_call(id, method, params)).await?;
        Ok(id)
    }

    /// Read until the result frame for `id` arrives, bounded by the call timeout
    pub async fn await_response(&mut self, id: u64) -> Result<Value> {
        let limit = self.call_timeout;
        let wait = async {
            loop {
                let frame = self.read_frame().await?;
                if frames::is_result_for(&frame, id) {
                    return Ok::<Value, PortalError>(frame);
                }
                if self.keep_events && frames::is_collection_event(&frame) {
                    if self.pending.len() == MAX_PENDING_EVENTS {
                        warn!(awaiting = id, "event queue full, dropping the oldest event");
                        self.pending.pop_front();
                    }
                    trace!(%frame, awaiting = id, "queueing event");
                    self.pending.push_back(frame);
                    continue;
                }
                trace!(%frame, awaiting = id, "discarding unrelated frame");
            }
        };

        timeout(limit, wait).await.map_err(|_| PortalError::Timeout {
            seconds: limit.as_secs(),
        })?
    }

    /// Next non-ping frame, without any deadline; queued events come first
    pub async fn recv_event(&mut self) -> Result<Value> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        self.read_frame().await
    }

    async fn read_frame(&mut self) -> Result<Value> {
        loop {
            let channel = self.channel.as_mut().ok_or(PortalError::NotConnected)?;
            let frame = channel.recv_frame().await?;
            if frames::is_ping(&frame) {
                trace!("ping received, answering pong");
                channel.send_frame(&frames::pong()).await?;
                continue;
            }
            return Ok(frame);
        }
    }

    /// Release the socket; safe to call any number of times
    pub async fn close(&mut self) {
        self.pending.clear();
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("error while closing middleware connection: {}", e);
            }
            info!("WS closed");
        }
    }
}

impl Drop for RpcTransport {
    fn drop(&mut self) {
        // dropping the channel drops the socket
        if self.channel.take().is_some() {
            debug!("middleware connection dropped without close");
        }
    }
}
