// snapshot_service/snapshots.rs
// Snapshot operations: list, rollback, clone, diff

use serde_json::{json, Value};
use tracing::debug;

use super::cache::CacheKey;
use super::datasets::as_list;
use super::service::{Conn, SnapshotService};
use super::types::{sort_newest_first, Snapshot, SnapshotDiff};
use crate::error::{PortalError, Result};

impl SnapshotService {
    /// Snapshots of one dataset (or of all), newest first
    /// Served from the cache while the entry is fresh.
    pub async fn list_snapshots(&self, dataset: Option<&str>, conn: Conn<'_>) -> Result<Vec<Snapshot>> {
        let key = CacheKey::for_dataset(dataset);
        if let Some(cached) = self.cache.get(&key) {
            debug!(?key, "snapshot listing served from cache");
            return Ok(cached.as_ref().clone());
        }

        let filters = match dataset {
            Some(name) => json!([["dataset", "=", name]]),
            None => json!([]),
        };
        let raw = self.call(conn, "zfs.snapshot.query", &[filters]).await?;

        let mut snapshots: Vec<Snapshot> = as_list(raw, "zfs.snapshot.query")?
            .iter()
            .filter_map(Snapshot::from_raw)
            .collect();
        sort_newest_first(&mut snapshots);

        let stored = self.cache.put(key, snapshots);
        Ok(stored.as_ref().clone())
    }

    /// Revert a dataset to one of its snapshots; the backend result is returned untouched
    pub async fn rollback_snapshot(&self, dataset: &str, snapshot_name: &str, conn: Conn<'_>) -> Result<Value> {
        let full_name = format!("{}@{}", dataset, snapshot_name);
        let result = self
            .call(conn, "zfs.snapshot.rollback", &[json!(full_name)])
            .await;
        // invalidated whether or not the call succeeded
        self.cache.invalidate(&[dataset]);
        result
    }

    /// Create `target` as a writable clone of a snapshot
    pub async fn clone_snapshot(
        &self,
        dataset: &str,
        snapshot_name: &str,
        target: &str,
        conn: Conn<'_>,
    ) -> Result<Value> {
        let full_name = format!("{}@{}", dataset, snapshot_name);
        let result = self
            .call(conn, "zfs.snapshot.clone", &[json!(full_name), json!(target)])
            .await;
        self.cache.invalidate(&[dataset, target]);
        result
    }

    /// Files added, removed and modified between snapshots `a` and `b`
    pub async fn snapshot_diff(&self, dataset: &str, a: &str, b: &str, conn: Conn<'_>) -> Result<SnapshotDiff> {
        let raw = self
            .call(
                conn,
                "zfs.snapshot.get_diff",
                &[json!(format!("{}@{}", dataset, a)), json!(format!("{}@{}", dataset, b))],
            )
            .await?;

        let empty = match &raw {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(SnapshotDiff::default());
        }
        if !raw.is_object() {
            return Err(PortalError::UnexpectedResult(format!(
                "zfs.snapshot.get_diff returned {}",
                raw
            )));
        }
        Ok(serde_json::from_value(raw)?)
    }
}
