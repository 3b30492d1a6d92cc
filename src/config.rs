//! Portal configuration
//!
//! Built once at startup and injected into the transport, the snapshot
//! service and the routes. Values come from an optional `settings.json`
//! next to the executable, overlaid by environment variables:
//! - TRUENAS_URL / TRUENAS_API_KEY: middleware endpoint and key
//! - TRUENAS_WS_URL: explicit websocket URL (wins over TRUENAS_URL)
//! - TRUENAS_WS_PATH, TRUENAS_VERIFY_TLS, TRUENAS_CA_BUNDLE
//! - PORTAL_LISTEN, PORTAL_ADMIN_KEY, PORTAL_VIEWER_KEY
//! - PORTAL_PUBLIC_ROOT / PORTAL_BACKEND_ROOT: the two path namespaces
//! - SNAPSHOT_CACHE_TTL_SECS, MIDDLEWARE_CALL_TIMEOUT_SECS

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{PortalError, Result};

const DEFAULT_WS_PATH: &str = "/websocket";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PUBLIC_ROOT: &str = "/data";
const DEFAULT_BACKEND_ROOT: &str = "/mnt";
const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Socket connects never wait longer than this
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings loaded from settings.json; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub truenas_url: Option<String>,
    pub truenas_api_key: Option<String>,
    pub truenas_ws_url: Option<String>,
    pub truenas_ws_path: Option<String>,
    pub verify_tls: Option<bool>,
    pub ca_bundle: Option<PathBuf>,
    pub listen: Option<String>,
    pub admin_key: Option<String>,
    pub viewer_key: Option<String>,
    pub public_root: Option<PathBuf>,
    pub backend_root: Option<PathBuf>,
    pub snapshot_cache_ttl_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

/// Where and how to reach the storage middleware
#[derive(Debug, Clone)]
pub struct MiddlewareConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub ws_url_override: Option<String>,
    pub ws_path: String,
    pub verify_tls: bool,
    pub ca_bundle: Option<PathBuf>,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

/// The public (container) and backend (host) path roots
#[derive(Debug, Clone)]
pub struct PathConfig {
    pub public_root: PathBuf,
    pub backend_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub admin_key: Option<String>,
    pub viewer_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub middleware: MiddlewareConfig,
    pub paths: PathConfig,
    pub server: ServerConfig,
    pub snapshot_cache_ttl: Duration,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        MiddlewareConfig {
            url: None,
            api_key: None,
            ws_url_override: None,
            ws_path: DEFAULT_WS_PATH.to_string(),
            verify_tls: false,
            ca_bundle: None,
            connect_timeout: CONNECT_TIMEOUT,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl MiddlewareConfig {
    /// Both the base URL and the API key are present
    ///
    /// A websocket override only redirects the socket; it does not stand in
    /// for `TRUENAS_URL`.
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }

    /// Websocket URL of the middleware, derived from the base URL unless overridden
    pub fn ws_url(&self) -> Result<String> {
        if let Some(url) = &self.ws_url_override {
            return Ok(url.clone());
        }

        let base = self
            .url
            .as_deref()
            .ok_or_else(|| PortalError::Configuration("TRUENAS_URL is not configured".into()))?;
        let base = base.trim().trim_end_matches('/');

        let parsed = Url::parse(base).map_err(|_| {
            PortalError::Configuration(format!(
                "TRUENAS_URL must include scheme and host; got: {:?}",
                base
            ))
        })?;

        let ws_scheme = match parsed.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(PortalError::Configuration(format!(
                    "TRUENAS_URL scheme must be http or https; got: {:?}",
                    other
                )))
            }
        };

        let host = parsed.host_str().ok_or_else(|| {
            PortalError::Configuration(format!(
                "TRUENAS_URL must include scheme and host; got: {:?}",
                base
            ))
        })?;

        let authority = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(format!("{}://{}{}", ws_scheme, authority, self.ws_path))
    }
}

impl Config {
    /// Load settings.json (if any) and overlay the process environment
    pub fn load() -> Config {
        let config = Config::from_sources(load_file_settings(), |name| std::env::var(name).ok());
        config.log_status();
        config
    }

    /// Build a config from file settings and an environment lookup
    pub fn from_sources<F>(file: FileSettings, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let verify_tls = env("TRUENAS_VERIFY_TLS")
            .map(|v| parse_bool(&v))
            .or(file.verify_tls)
            .unwrap_or(false);

        let listen = env("PORTAL_LISTEN")
            .or(file.listen)
            .and_then(|addr| match addr.parse() {
                Ok(addr) => Some(addr),
                Err(_) => {
                    warn!("Invalid listen address {:?}, using port {}", addr, DEFAULT_PORT);
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let secs = |name: &str, file_value: Option<u64>, default: u64| {
            env(name)
                .and_then(|v| v.parse::<u64>().ok())
                .or(file_value)
                .unwrap_or(default)
        };

        Config {
            middleware: MiddlewareConfig {
                url: env("TRUENAS_URL").or(file.truenas_url),
                api_key: env("TRUENAS_API_KEY").or(file.truenas_api_key),
                ws_url_override: env("TRUENAS_WS_URL").or(file.truenas_ws_url),
                ws_path: env("TRUENAS_WS_PATH")
                    .or(file.truenas_ws_path)
                    .unwrap_or_else(|| DEFAULT_WS_PATH.to_string()),
                verify_tls,
                ca_bundle: env("TRUENAS_CA_BUNDLE").map(PathBuf::from).or(file.ca_bundle),
                connect_timeout: CONNECT_TIMEOUT,
                call_timeout: Duration::from_secs(secs(
                    "MIDDLEWARE_CALL_TIMEOUT_SECS",
                    file.call_timeout_secs,
                    DEFAULT_CALL_TIMEOUT_SECS,
                )),
            },
            paths: PathConfig {
                public_root: env("PORTAL_PUBLIC_ROOT")
                    .map(PathBuf::from)
                    .or(file.public_root)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_ROOT)),
                backend_root: env("PORTAL_BACKEND_ROOT")
                    .map(PathBuf::from)
                    .or(file.backend_root)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKEND_ROOT)),
            },
            server: ServerConfig {
                listen,
                admin_key: env("PORTAL_ADMIN_KEY").or(file.admin_key),
                viewer_key: env("PORTAL_VIEWER_KEY").or(file.viewer_key),
            },
            snapshot_cache_ttl: Duration::from_secs(secs(
                "SNAPSHOT_CACHE_TTL_SECS",
                file.snapshot_cache_ttl_secs,
                DEFAULT_CACHE_TTL_SECS,
            )),
        }
    }

    /// Log presence (not values) of the middleware configuration
    fn log_status(&self) {
        info!(
            url = self.middleware.url.is_some(),
            api_key = self.middleware.api_key.is_some(),
            verify_tls = self.middleware.verify_tls,
            "Config status"
        );
        if self.middleware.url.is_none() {
            warn!("TRUENAS_URL not set; running in unconfigured mode");
        }
        if self.middleware.api_key.is_none() {
            warn!("TRUENAS_API_KEY not set; running in unconfigured mode");
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Load settings from settings.json or use defaults
/// Looks for settings.json in the same directory as the executable
fn load_file_settings() -> FileSettings {
    let settings_path = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("settings.json")))
        .unwrap_or_else(|| PathBuf::from("settings.json"));

    match fs::read_to_string(&settings_path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    settings_path.display(),
                    e
                );
                FileSettings::default()
            }
        },
        Err(_) => {
            info!(
                "{} not found, using environment only",
                settings_path.display()
            );
            FileSettings::default()
        }
    }
}
