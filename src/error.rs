//! Error types for the snapshot portal

use serde_json::Value;
use thiserror::Error;
use warp::http::StatusCode;

/// Result type alias using the portal error
pub type Result<T> = std::result::Result<T, PortalError>;

/// Every failure the middleware client, path guard and snapshot service can raise
#[derive(Error, Debug)]
pub enum PortalError {
    /// Endpoint or API key missing; no connection is attempted
    #[error("Middleware not configured: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Middleware authentication failed: {0}")]
    Auth(String),

    #[error("Client not connected")]
    NotConnected,

    #[error("Client not authenticated")]
    NotAuthenticated,

    /// Explicit error payload returned by the backend, passed through verbatim
    #[error("{}", middleware_message(.0))]
    Middleware(Value),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unexpected middleware result: {0}")]
    UnexpectedResult(String),

    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn middleware_message(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PortalError {
    /// HTTP status the request layer answers with for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PortalError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            PortalError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            PortalError::Connection(_)
            | PortalError::Auth(_)
            | PortalError::Timeout { .. }
            | PortalError::UnexpectedResult(_)
            | PortalError::Serialization(_) => StatusCode::BAD_GATEWAY,
            PortalError::NotConnected
            | PortalError::NotAuthenticated
            | PortalError::Middleware(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_middleware_string_payload_is_verbatim() {
        let err = PortalError::Middleware(json!("[ENOENT] dataset not found"));
        assert_eq!(err.to_string(), "[ENOENT] dataset not found");
    }

    #[test]
    fn test_middleware_object_payload_is_rendered_as_json() {
        let err = PortalError::Middleware(json!({"error": 2, "reason": "nope"}));
        let text = err.to_string();
        assert!(text.contains("\"reason\":\"nope\""));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PortalError::InvalidPath("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PortalError::Configuration("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PortalError::Timeout { seconds: 10 }.status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
