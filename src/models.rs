use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::snapshot_service::{Job, Pool, Snapshot, SnapshotDiff, SnapshotEntry};

// Response structures
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub truenas: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PoolTreeResponse {
    pub status: String,
    pub pools: Vec<Pool>,
}

#[derive(Debug, Serialize)]
pub struct PoolHealthResponse {
    pub status: String,
    pub pools: BTreeMap<String, String>,
}

/// A snapshot with its human-readable age
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub age: String,
}

#[derive(Debug, Serialize)]
pub struct SnapshotListResponse {
    pub status: String,
    pub dataset: Option<String>,
    pub snapshots: Vec<SnapshotView>,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub status: String,
    pub message: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct CloneResponse {
    pub status: String,
    pub message: String,
    pub target: String,
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub status: String,
    pub dataset: String,
    pub a: String,
    pub b: String,
    pub diff: SnapshotDiff,
}

#[derive(Debug, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub status: String,
    pub dataset: String,
    pub snapshot: String,
    pub current_path: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub status: String,
    pub job_id: i64,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub ok: bool,
    pub job: Job,
}

// Request structures
//
// Required fields are still `Option` so a missing one becomes a 400 with a
// readable message instead of a body rejection.

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    pub dataset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RollbackRequest {
    pub dataset: Option<String>,
    pub snapshot: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloneRequest {
    pub dataset: Option<String>,
    pub snapshot: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffQuery {
    pub dataset: Option<String>,
    pub a: Option<String>,
    pub b: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrowseQuery {
    pub dataset: Option<String>,
    pub snapshot: Option<String>,
    pub subpath: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    pub dataset: Option<String>,
    pub snapshot: Option<String>,
    /// Path inside the snapshot, relative to the dataset root
    pub path: Option<String>,
    /// Public-namespace destination; defaults to the same path in the live dataset
    pub destination: Option<String>,
    #[serde(default)]
    pub overwrite: bool,
}

/// Non-blank value of an optional request field
pub fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    // -------------------------------------------------------------------------
    // Request Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_restore_request_defaults() {
        let req: RestoreRequest =
            serde_json::from_value(json!({"dataset": "tank/home", "snapshot": "s1", "path": "a.txt"})).unwrap();
        assert!(!req.overwrite);
        assert!(req.destination.is_none());
        assert_eq!(required(&req.path), Some("a.txt"));
    }

    #[test]
    fn test_clone_request_missing_target() {
        let req: CloneRequest = serde_json::from_value(json!({"dataset": "tank", "snapshot": "s"})).unwrap();
        assert!(required(&req.target).is_none());
    }

    #[test]
    fn test_required_rejects_blank() {
        assert_eq!(required(&Some("  ".to_string())), None);
        assert_eq!(required(&None), None);
        assert_eq!(required(&Some(" tank ".to_string())), Some("tank"));
    }

    // -------------------------------------------------------------------------
    // Response Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_snapshot_view_flattens_snapshot() {
        let view = SnapshotView {
            snapshot: Snapshot {
                full_name: "tank@s1".into(),
                dataset: "tank".into(),
                snapshot_name: "s1".into(),
                created_at: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            },
            age: "Jan 02, 2024".into(),
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["full_name"], "tank@s1");
        assert_eq!(value["snapshot_name"], "s1");
        assert_eq!(value["created_at"], "2024-01-02T03:04:05Z");
        assert_eq!(value["age"], "Jan 02, 2024");
    }

    #[test]
    fn test_health_response_omits_missing_fields() {
        let resp = HealthResponse {
            ok: false,
            truenas: "error".into(),
            version: None,
            error: Some("Connection error: refused".into()),
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"ok": false, "truenas": "error", "error": "Connection error: refused"})
        );

        let resp = HealthResponse {
            ok: true,
            truenas: "ok".into(),
            version: Some(json!("24.04")),
            error: None,
        };
        assert!(!serde_json::to_string(&resp).unwrap().contains("error"));
    }

    #[test]
    fn test_restore_response_serialization() {
        let resp = RestoreResponse {
            status: "submitted".into(),
            job_id: 42,
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"status": "submitted", "job_id": 42})
        );
    }
}
