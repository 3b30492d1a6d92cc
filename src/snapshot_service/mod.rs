// snapshot_service/mod.rs
//! Snapshot operations orchestrated over middleware calls
//!
//! Every operation takes a [`Conn`]: either the caller's own connection or
//! `Conn::Fresh`, in which case a connection is opened for that operation
//! alone and closed before returning.

mod cache;
mod datasets;
mod files;
mod jobs;
mod service;
mod snapshots;
mod types;


pub use datasets::{annotate, group_into_pools};
pub use jobs::JOBS_COLLECTION;
pub use service::{Conn, SnapshotService};
pub use types::{
    extract_job_id, newest_first, parse_timestamp, pool_of, sort_entries, sort_newest_first, Dataset,
    Job, JobState, Pool, Snapshot, SnapshotDiff, SnapshotEntry,
};
