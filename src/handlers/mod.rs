// handlers/mod.rs
// Request handlers, one file per resource

mod datasets;
mod files;
mod health;
mod jobs;
mod snapshots;

pub use datasets::*;
pub use files::*;
pub use health::*;
pub use jobs::*;
pub use snapshots::*;
