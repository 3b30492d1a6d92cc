//-----------------------------------------------------
// AUTHENTICATION
//-----------------------------------------------------

use rand::distr::Alphanumeric;
use rand::Rng;
use std::convert::Infallible;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use warp::http::{HeaderMap, StatusCode};
use warp::reply::Response;
use warp::{Filter, Rejection};

use crate::config::MiddlewareConfig;
use crate::utils::error_response;

const KEY_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Viewer,
}

// Rejections raised by the access filters
#[derive(Debug)]
pub enum AccessError {
    MissingKey,
    InvalidKey,
    Forbidden,
    NotConfigured,
}
impl warp::reject::Reject for AccessError {}

/// The keys accepted in the `X-API-Key` header
#[derive(Debug, Clone)]
pub struct ApiKeys {
    admin: String,
    viewer: Option<String>,
}

impl ApiKeys {
    pub fn new(admin: String, viewer: Option<String>) -> Self {
        ApiKeys { admin, viewer }
    }

    /// Role granted by a key; the admin key also passes viewer routes
    pub fn role_for(&self, key: &str) -> Option<Role> {
        if key == self.admin {
            Some(Role::Admin)
        } else if self.viewer.as_deref() == Some(key) {
            Some(Role::Viewer)
        } else {
            None
        }
    }
}

/// Where a generated admin key is kept
pub fn default_key_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zfs_snapshot_portal")
        .join("admin_key")
}

// Function to get an existing admin key or create a new one
pub fn get_or_create_admin_key(file_path: &Path) -> std::io::Result<String> {
    if let Ok(api_key) = fs::read_to_string(file_path) {
        let api_key = api_key.trim().to_string();
        if !api_key.is_empty() {
            return Ok(api_key);
        }
    }

    let api_key: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect();
    if let Some(dir) = file_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut file = fs::File::create(file_path)?;
    file.write_all(api_key.as_bytes())?;
    Ok(api_key)
}

// Check the X-API-Key header against the configured keys
async fn check_api_key(headers: HeaderMap, keys: Arc<ApiKeys>) -> Result<Role, Rejection> {
    let Some(value) = headers.get("X-API-Key") else {
        warn!(target: "audit", "request without API key");
        return Err(warp::reject::custom(AccessError::MissingKey));
    };

    match value.to_str().ok().and_then(|key| keys.role_for(key)) {
        Some(role) => {
            debug!(target: "audit", ?role, "API key accepted");
            Ok(role)
        }
        None => {
            warn!(target: "audit", "invalid API key");
            Err(warp::reject::custom(AccessError::InvalidKey))
        }
    }
}

/// Any valid key; extracts the caller's role
pub fn with_role(keys: Arc<ApiKeys>) -> impl Filter<Extract = (Role,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(warp::any().map(move || keys.clone()))
        .and_then(check_api_key)
}

/// Any valid key, role discarded
pub fn authenticated(keys: Arc<ApiKeys>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    with_role(keys).map(|_: Role| ()).untuple_one()
}

/// Only the admin key
pub fn admin_only(keys: Arc<ApiKeys>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    with_role(keys)
        .and_then(|role: Role| async move {
            if role == Role::Admin {
                Ok(())
            } else {
                warn!(target: "audit", "viewer key used on an admin route");
                Err(warp::reject::custom(AccessError::Forbidden))
            }
        })
        .untuple_one()
}

/// Rejects with 503 while the middleware endpoint or key is missing
pub fn require_configured(
    middleware: Arc<MiddlewareConfig>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::any()
        .and_then(move || {
            let configured = middleware.is_configured();
            async move {
                if configured {
                    Ok(())
                } else {
                    Err(warp::reject::custom(AccessError::NotConfigured))
                }
            }
        })
        .untuple_one()
}

/// Turn rejections into the JSON error envelope
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if let Some(access) = err.find::<AccessError>() {
        match access {
            AccessError::MissingKey => (StatusCode::UNAUTHORIZED, "Missing API key"),
            AccessError::InvalidKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
            AccessError::Forbidden => (StatusCode::FORBIDDEN, "Admin access required"),
            AccessError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, "TrueNAS is not configured"),
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(error_response(status, message))
}
