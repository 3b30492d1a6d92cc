//! ZFS snapshot portal
//!
//! Browses, diffs, rolls back, clones and restores ZFS snapshots through a
//! TrueNAS-style middleware reached over an authenticated websocket RPC
//! protocol, and serves the result as a small JSON API.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod job_events;
pub mod middleware;
pub mod models;
pub mod paths;
pub mod routes;
pub mod snapshot_service;
pub mod utils;

pub use config::Config;
pub use error::{PortalError, Result};
