// snapshot_service/cache.rs
// Short-lived cache of snapshot listings

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::types::Snapshot;

/// A listing for one dataset, or the listing of every snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    All,
    Dataset(String),
}

impl CacheKey {
    pub fn for_dataset(dataset: Option<&str>) -> CacheKey {
        match dataset {
            Some(name) => CacheKey::Dataset(name.to_string()),
            None => CacheKey::All,
        }
    }
}

struct CacheEntry {
    stored_at: Instant,
    snapshots: Arc<Vec<Snapshot>>,
}

/// Entries go stale after the TTL and are replaced on the next listing
/// Writers race freely; the last one wins.
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        SnapshotCache {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fresh entry for the key, if any
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Snapshot>>> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(Arc::clone(&entry.snapshots))
        } else {
            None
        }
    }

    pub fn put(&self, key: CacheKey, snapshots: Vec<Snapshot>) -> Arc<Vec<Snapshot>> {
        let snapshots = Arc::new(snapshots);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                CacheEntry {
                    stored_at: Instant::now(),
                    snapshots: Arc::clone(&snapshots),
                },
            );
        }
        snapshots
    }

    /// Drop the listings of the given datasets and the all-snapshots listing
    pub fn invalidate(&self, datasets: &[&str]) {
        if let Ok(mut entries) = self.entries.write() {
            for dataset in datasets {
                entries.remove(&CacheKey::Dataset(dataset.to_string()));
            }
            entries.remove(&CacheKey::All);
        }
        debug!(?datasets, "snapshot cache invalidated");
    }
}
