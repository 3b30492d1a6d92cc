// snapshot_service/files.rs
// Snapshot file operations: directory listing and restore

use serde_json::{json, Value};
use tracing::info;

use super::service::{Conn, SnapshotService};
use super::types::{extract_job_id, sort_entries, SnapshotEntry};
use crate::error::{PortalError, Result};
use crate::paths::{check_names, normalize_subpath, SNAPSHOT_MARKER};

impl SnapshotService {
    /// Entries of a directory inside a snapshot, directories first
    pub async fn list_snapshot_files(
        &self,
        dataset: &str,
        snapshot: &str,
        subpath: &str,
        conn: Conn<'_>,
    ) -> Result<Vec<SnapshotEntry>> {
        check_names(dataset, snapshot)?;
        let subpath = normalize_subpath(subpath)?;
        let base = format!(
            "{}/{}/{}/{}",
            self.paths.backend_root().to_string_lossy().trim_end_matches('/'),
            dataset,
            SNAPSHOT_MARKER,
            snapshot
        );
        let backend_path = if subpath.is_empty() {
            base
        } else {
            format!("{}/{}", base, subpath)
        };

        info!(dataset, snapshot, path = %backend_path, "listing snapshot directory");
        let raw = self
            .call(conn, "filesystem.listdir", &[json!(backend_path)])
            .await?;

        let items = match raw {
            Value::Array(items) => items,
            other => {
                return Err(PortalError::UnexpectedResult(format!(
                    "Unexpected filesystem.listdir result: {}",
                    other
                )))
            }
        };

        let mut entries: Vec<SnapshotEntry> = items.iter().filter_map(SnapshotEntry::from_raw).collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Schedule a middleware copy job restoring a snapshot path into the live tree
    ///
    /// `destination` is a public-namespace path. Both paths are validated
    /// before any connection is used; the job id is returned.
    pub async fn restore_path(
        &self,
        dataset: &str,
        snapshot: &str,
        subpath: &str,
        destination: &str,
        overwrite: bool,
        conn: Conn<'_>,
    ) -> Result<i64> {
        check_names(dataset, snapshot)?;
        let source = self.paths.snapshot_source(dataset, snapshot, subpath);
        let (source_real, destination_real) = self.paths.validate_restore(&source, destination)?;

        // the host only ever sees the resolved pair
        let backend_source = self.paths.to_backend_path(&source_real);
        let backend_destination = self.paths.to_backend_path(&destination_real);
        self.paths
            .validate_backend_pair(&backend_source, &backend_destination)?;

        let options = json!({
            "recursive": true,
            "preserve": true,
            "overwrite": overwrite,
        });
        let result = self
            .call(
                conn,
                "filesystem.copy",
                &[json!(backend_source), json!(backend_destination), options],
            )
            .await?;

        let job_id = extract_job_id(&result)?;
        info!(job_id, source = %backend_source, destination = %backend_destination, "restore job scheduled");
        Ok(job_id)
    }
}
