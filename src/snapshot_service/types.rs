// snapshot_service/types.rs
// Read-only projections of middleware objects

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{PortalError, Result};

/// A dataset as listed by the middleware, plus snapshot annotations
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub pool: String,
    pub used: Option<u64>,
    pub available: Option<u64>,
    pub snapshot_count: usize,
    pub latest_snapshot: Option<String>,
}

impl Dataset {
    /// Project a raw `zfs.dataset.query` object; `None` when it has no name
    pub fn from_raw(raw: &Value) -> Option<Dataset> {
        let name = raw.get("name").and_then(Value::as_str)?;
        if name.is_empty() {
            return None;
        }
        Some(Dataset {
            name: name.to_string(),
            pool: pool_of(name).to_string(),
            used: parsed_property(raw, "used"),
            available: parsed_property(raw, "available"),
            snapshot_count: 0,
            latest_snapshot: None,
        })
    }
}

/// First `/`-separated segment of a dataset name
pub fn pool_of(name: &str) -> &str {
    name.split('/').next().unwrap_or(name)
}

fn parsed_property(raw: &Value, property: &str) -> Option<u64> {
    let parsed = raw.get("properties")?.get(property)?.get("parsed")?;
    parsed
        .as_u64()
        .or_else(|| parsed.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .or_else(|| parsed.as_str().and_then(|s| s.parse().ok()))
}

/// Datasets sharing a pool, sorted case-insensitively by name
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pool {
    pub name: String,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    pub full_name: String,
    pub dataset: String,
    pub snapshot_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Project a raw `zfs.snapshot.query` object; `None` when it has no name
    pub fn from_raw(raw: &Value) -> Option<Snapshot> {
        let full_name = raw.get("name").and_then(Value::as_str)?;
        if full_name.is_empty() {
            return None;
        }

        let dataset = raw
            .get("dataset")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| full_name.split('@').next().unwrap_or(full_name).to_string());
        let snapshot_name = full_name.rsplit('@').next().unwrap_or(full_name).to_string();

        let created_at = raw
            .get("properties")
            .and_then(|p| p.get("creation"))
            .and_then(|c| c.get("parsed"))
            .and_then(parse_timestamp);

        Some(Snapshot {
            full_name: full_name.to_string(),
            dataset,
            snapshot_name,
            created_at,
        })
    }
}

/// Newest first; snapshots without a creation time sort as the oldest
pub fn newest_first(a: &Snapshot, b: &Snapshot) -> Ordering {
    match (&a.created_at, &b.created_at) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn sort_newest_first(snapshots: &mut [Snapshot]) {
    snapshots.sort_by(newest_first);
}

/// Lenient creation-time parsing
///
/// Accepts RFC 3339 strings, naive ISO timestamps (taken as UTC),
/// `{"$date": millis}` objects and epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Object(map) => map
            .get("$date")
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

/// Changes between two snapshots; every key is always present
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotDiff {
    #[serde(default)]
    pub added: Vec<Value>,
    #[serde(default)]
    pub removed: Vec<Value>,
    #[serde(default)]
    pub modified: Vec<Value>,
}

/// One entry of a snapshot directory listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    /// Always `None` for directories
    pub size: Option<u64>,
}

impl SnapshotEntry {
    pub fn from_raw(raw: &Value) -> Option<SnapshotEntry> {
        let name = raw.get("name").and_then(Value::as_str)?.to_string();
        let path = raw
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let is_dir = raw
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.eq_ignore_ascii_case("DIRECTORY"))
            .unwrap_or(false);
        let size = if is_dir {
            None
        } else {
            raw.get("size").and_then(Value::as_u64)
        };

        Some(SnapshotEntry {
            name,
            path,
            is_dir,
            size,
        })
    }
}

/// Directories first, then case-insensitive name
pub fn sort_entries(entries: &mut [SnapshotEntry]) {
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// Job state as reported by the middleware; unknown states are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Unknown,
    Waiting,
    Running,
    Success,
    Failed,
    Aborted,
    Other(String),
}

impl JobState {
    pub fn parse(state: &str) -> JobState {
        match state {
            "UNKNOWN" => JobState::Unknown,
            "WAITING" => JobState::Waiting,
            "RUNNING" => JobState::Running,
            "SUCCESS" => JobState::Success,
            "FAILED" => JobState::Failed,
            "ABORTED" => JobState::Aborted,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Unknown => "UNKNOWN",
            JobState::Waiting => "WAITING",
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
            JobState::Aborted => "ABORTED",
            JobState::Other(s) => s,
        }
    }

    /// SUCCESS, FAILED and ABORTED end a job
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failed | JobState::Aborted)
    }
}

impl Serialize for JobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Job {
    pub id: i64,
    pub state: JobState,
    pub progress: Option<Value>,
    pub error: Option<Value>,
    pub result: Option<Value>,
}

impl Job {
    /// Build from a job object (or the `fields` of a change event)
    pub fn from_fields(fields: &Value, fallback_id: i64) -> Job {
        let non_null = |key: &str| fields.get(key).filter(|v| !v.is_null()).cloned();
        Job {
            id: fields.get("id").and_then(Value::as_i64).unwrap_or(fallback_id),
            state: fields
                .get("state")
                .and_then(Value::as_str)
                .map(JobState::parse)
                .unwrap_or(JobState::Unknown),
            progress: non_null("progress"),
            error: non_null("error"),
            result: non_null("result"),
        }
    }
}

/// Job id out of a `filesystem.copy` response
///
/// Accepts a bare integer, a numeric string, or an object carrying `id`.
pub fn extract_job_id(result: &Value) -> Result<i64> {
    let id = match result {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(map) => match map.get("id") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        },
        _ => None,
    };

    id.ok_or_else(|| {
        PortalError::UnexpectedResult(format!(
            "middleware returned unexpected result for filesystem.copy: {}",
            result
        ))
    })
}
