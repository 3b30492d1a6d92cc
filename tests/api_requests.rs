//! # Integration Tests: Request validation
//!
//! ## What is tested
//! - Restore with an escaping path → 400 before any connection
//! - Clone without target, diff without both snapshots → 400
//! - Browse with a `..` escape → 400
//! - Valid requests against an unreachable middleware → 502
//!
//! ## Expected outcome
//! - Bad input is refused locally; upstream failures map to 502

mod common;

use common::*;
use serde_json::json;
use warp::http::StatusCode;
use warp::test::request;

#[tokio::test]
async fn test_restore_with_escaping_path_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("POST")
        .path("/api/restore")
        .header("X-API-Key", ADMIN_KEY)
        .json(&json!({"dataset": "tank/a", "snapshot": "s1", "path": "../../../../../etc/shadow"}))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(&resp)["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid path"));
}

#[tokio::test]
async fn test_restore_missing_fields_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("POST")
        .path("/api/restore")
        .header("X-API-Key", ADMIN_KEY)
        .json(&json!({"dataset": "tank/a"}))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("POST")
        .path("/api/snapshots/rollback")
        .header("X-API-Key", ADMIN_KEY)
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clone_without_target_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("POST")
        .path("/api/snapshots/clone")
        .header("X-API-Key", ADMIN_KEY)
        .json(&json!({"dataset": "tank/a", "snapshot": "s1", "target": "  "}))
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_diff_without_both_snapshots_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("GET")
        .path("/api/diff?dataset=tank/a&b=s2")
        .header("X-API-Key", VIEWER_KEY)
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_browse_escape_returns_400() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("GET")
        .path("/api/browse?dataset=tank/a&snapshot=s1&subpath=docs%2F..%2F..%2F..")
        .header("X-API-Key", VIEWER_KEY)
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unreachable_middleware_returns_502() {
    let routes = routes(unreachable_config());
    for path in [
        "/api/pools",
        "/api/snapshots?dataset=tank/a",
        "/api/browse?dataset=tank/a&snapshot=s1",
        "/api/jobs/12",
    ] {
        let resp = request()
            .method("GET")
            .path(path)
            .header("X-API-Key", VIEWER_KEY)
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY, "{}", path);
    }
}

#[tokio::test]
async fn test_job_id_must_be_numeric() {
    let routes = routes(unreachable_config());
    let resp = request()
        .method("GET")
        .path("/api/jobs/abc")
        .header("X-API-Key", VIEWER_KEY)
        .reply(&routes)
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
