// middleware/frames.rs
// Wire frames of the middleware websocket protocol

use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "1";

/// Method used to authenticate a fresh connection
pub const LOGIN_METHOD: &str = "auth.login_with_api_key";

/// `{msg: connect, version: "1", support: ["1"]}`
pub fn handshake() -> Value {
    json!({
        "msg": "connect",
        "version": PROTOCOL_VERSION,
        "support": [PROTOCOL_VERSION],
    })
}

pub fn pong() -> Value {
    json!({ "msg": "pong" })
}

pub fn method_call(id: u64, method: &str, params: &[Value]) -> Value {
    json!({
        "id": id,
        "msg": "method",
        "method": method,
        "params": params,
    })
}

/// Subscription frames are keyed by the subscription id, not the request id
pub fn subscribe(collection: &str, subscription_id: &str) -> Value {
    json!({
        "id": subscription_id,
        "msg": "sub",
        "name": collection,
    })
}

pub fn unsubscribe(subscription_id: &str) -> Value {
    json!({
        "id": subscription_id,
        "msg": "unsub",
    })
}

/// The `msg` discriminator of a frame, if any
pub fn kind(frame: &Value) -> Option<&str> {
    frame.get("msg").and_then(Value::as_str)
}

pub fn is_ping(frame: &Value) -> bool {
    kind(frame) == Some("ping")
}

/// A `result` frame carrying the given request id
pub fn is_result_for(frame: &Value, id: u64) -> bool {
    kind(frame) == Some("result") && frame.get("id").and_then(Value::as_u64) == Some(id)
}

/// A pushed change to a subscribed collection
pub fn is_collection_event(frame: &Value) -> bool {
    matches!(kind(frame), Some("added" | "changed" | "removed")) && frame.get("collection").is_some()
}

/// Error payload of a result frame; an explicit `null` counts as no error
pub fn error_payload(frame: &Value) -> Option<&Value> {
    frame.get("error").filter(|e| !e.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_shape() {
        let frame = handshake();
        assert_eq!(frame["msg"], "connect");
        assert_eq!(frame["version"], "1");
        assert_eq!(frame["support"], json!(["1"]));
    }

    #[test]
    fn test_subscribe_uses_subscription_id() {
        let frame = subscribe("core.get_jobs", "abc");
        assert_eq!(frame["id"], "abc");
        assert_eq!(frame["name"], "core.get_jobs");
        assert_eq!(frame["msg"], "sub");
    }

    #[test]
    fn test_result_matching() {
        let frame = json!({"msg": "result", "id": 3, "result": true});
        assert!(is_result_for(&frame, 3));
        assert!(!is_result_for(&frame, 4));
        assert!(!is_result_for(&json!({"msg": "changed", "id": 3}), 3));
    }

    #[test]
    fn test_collection_events() {
        assert!(is_collection_event(&json!({"msg": "changed", "collection": "core.get_jobs"})));
        assert!(is_collection_event(&json!({"msg": "added", "collection": "alert.list"})));
        assert!(!is_collection_event(&json!({"msg": "changed"})));
        assert!(!is_collection_event(&json!({"msg": "result", "collection": "x", "id": 1})));
        assert!(!is_collection_event(&json!({"msg": "ping"})));
    }

    #[test]
    fn test_null_error_is_not_an_error() {
        assert!(error_payload(&json!({"msg": "result", "id": 1, "error": null})).is_none());
        assert!(error_payload(&json!({"msg": "result", "id": 1, "error": "boom"})).is_some());
    }
}
