// snapshot_service/datasets.rs
// Dataset operations: list, pool tree, pool health

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use super::service::{Conn, SnapshotService};
use super::types::{pool_of, Dataset, Pool, Snapshot};
use crate::error::{PortalError, Result};

impl SnapshotService {
    /// Every dataset known to the middleware; one query, never cached
    pub async fn list_datasets(&self, conn: Conn<'_>) -> Result<Vec<Dataset>> {
        let raw = self.call(conn, "zfs.dataset.query", &[]).await?;
        Ok(as_list(raw, "zfs.dataset.query")?
            .iter()
            .filter_map(Dataset::from_raw)
            .collect())
    }

    /// Group datasets by pool and annotate snapshot counts from one bulk listing
    ///
    /// A failed listing leaves every dataset at 0 snapshots and no latest.
    pub async fn build_pool_tree(&self, datasets: Vec<Dataset>, conn: Conn<'_>) -> Vec<Pool> {
        let datasets = match self.list_snapshots(None, conn).await {
            Ok(snapshots) => annotate(datasets, &snapshots),
            Err(e) => {
                warn!("Snapshot annotation failed, reporting no snapshots: {}", e);
                annotate(datasets, &[])
            }
        };
        group_into_pools(datasets)
    }

    /// Pool name to health status; missing status reads as UNKNOWN
    pub async fn pools_health(&self, conn: Conn<'_>) -> Result<BTreeMap<String, String>> {
        let raw = self.call(conn, "pool.query", &[]).await?;
        Ok(as_list(raw, "pool.query")?
            .iter()
            .filter_map(|pool| {
                let name = pool.get("name").and_then(Value::as_str)?;
                let status = pool
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN");
                Some((name.to_string(), status.to_string()))
            })
            .collect())
    }
}

/// `null` reads as an empty list; anything else but an array is unexpected
pub(crate) fn as_list(raw: Value, method: &str) -> Result<Vec<Value>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        other => Err(PortalError::UnexpectedResult(format!(
            "{} returned {}",
            method, other
        ))),
    }
}

struct SnapshotMeta<'a> {
    count: usize,
    latest: &'a Snapshot,
}

/// Fill `snapshot_count` and `latest_snapshot` from a flat snapshot list
pub fn annotate(mut datasets: Vec<Dataset>, snapshots: &[Snapshot]) -> Vec<Dataset> {
    let mut meta: HashMap<&str, SnapshotMeta> = HashMap::new();

    for snap in snapshots {
        if snap.dataset.is_empty() {
            continue;
        }
        match meta.get_mut(snap.dataset.as_str()) {
            None => {
                meta.insert(
                    snap.dataset.as_str(),
                    SnapshotMeta {
                        count: 1,
                        latest: snap,
                    },
                );
            }
            Some(item) => {
                item.count += 1;
                // missing creation times lose to any real one; ties keep the first seen
                if snap.created_at > item.latest.created_at {
                    item.latest = snap;
                }
            }
        }
    }

    for dataset in datasets.iter_mut() {
        match meta.get(dataset.name.as_str()) {
            Some(item) => {
                dataset.snapshot_count = item.count;
                dataset.latest_snapshot = Some(item.latest.snapshot_name.clone());
            }
            None => {
                dataset.snapshot_count = 0;
                dataset.latest_snapshot = None;
            }
        }
    }

    datasets
}

/// Pools sorted by name, each with its datasets sorted case-insensitively
pub fn group_into_pools(datasets: Vec<Dataset>) -> Vec<Pool> {
    let mut pools: BTreeMap<String, Vec<Dataset>> = BTreeMap::new();
    for dataset in datasets {
        pools
            .entry(pool_of(&dataset.name).to_string())
            .or_default()
            .push(dataset);
    }

    pools
        .into_iter()
        .map(|(name, mut datasets)| {
            datasets.sort_by_key(|d| d.name.to_lowercase());
            Pool { name, datasets }
        })
        .collect()
}
