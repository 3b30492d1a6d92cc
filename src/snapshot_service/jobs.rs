// snapshot_service/jobs.rs
// Job status lookup

use serde_json::{json, Value};

use super::service::{Conn, SnapshotService};
use super::types::Job;
use crate::error::Result;

/// Collection that carries job updates
pub const JOBS_COLLECTION: &str = "core.get_jobs";

impl SnapshotService {
    /// Current state of a job, or `None` if the middleware does not know it
    pub async fn get_job(&self, job_id: i64, conn: Conn<'_>) -> Result<Option<Job>> {
        let raw = self
            .call(conn, JOBS_COLLECTION, &[json!([["id", "=", job_id]])])
            .await?;

        let job = match &raw {
            Value::Array(items) => items.first(),
            Value::Object(_) => Some(&raw),
            _ => None,
        };

        Ok(job
            .filter(|j| j.as_object().map_or(false, |m| !m.is_empty()))
            .map(|j| Job::from_fields(j, job_id)))
    }
}
