// middleware/mod.rs
//! Client for the storage middleware's websocket RPC protocol
//!
//! A connection is opened with a versioned handshake, logged in with an API
//! key, and then carries id-correlated method calls and collection
//! subscriptions. Pings from the server are answered wherever frames are read.

pub mod client;
pub mod connector;
pub mod frames;
pub mod tls;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::MiddlewareClient;
pub use connector::{Connect, WsConnector};
pub use transport::{FrameChannel, RpcTransport};
