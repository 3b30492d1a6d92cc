// paths.rs
// Mapping between the public and backend path namespaces, and restore path checks

use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::config::PathConfig;
use crate::error::{PortalError, Result};

/// Path segment that marks the inside of a snapshot
pub const SNAPSHOT_MARKER: &str = ".zfs/snapshot";

const MAX_SYMLINK_HOPS: usize = 40;

/// A readable file inside a snapshot, as located for a download
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotFile {
    pub dataset: String,
    pub snapshot: String,
    /// Normalised path below the snapshot root
    pub subpath: String,
    /// Resolved on-disk location
    pub path: PathBuf,
}

/// Confines restore and browse paths to the right prefixes
///
/// The portal sees datasets under the public root (`/data` by default) while
/// the middleware sees the same tree under the backend root (`/mnt`).
#[derive(Debug, Clone)]
pub struct PathGuard {
    public_root: PathBuf,
    backend_root: PathBuf,
}

impl PathGuard {
    pub fn new(config: &PathConfig) -> Self {
        PathGuard {
            public_root: config.public_root.clone(),
            backend_root: config.backend_root.clone(),
        }
    }

    pub fn public_root(&self) -> &Path {
        &self.public_root
    }

    pub fn backend_root(&self) -> &Path {
        &self.backend_root
    }

    /// `/data/x` -> `/mnt/x`; anything not under the public root is returned unchanged
    pub fn to_backend_path(&self, public_path: &str) -> String {
        swap_prefix(public_path, &self.public_root, &self.backend_root)
    }

    /// `/mnt/x` -> `/data/x`; anything not under the backend root is returned unchanged
    pub fn to_public_path(&self, backend_path: &str) -> String {
        swap_prefix(backend_path, &self.backend_root, &self.public_root)
    }

    /// `<public>/<dataset>/.zfs/snapshot/<snapshot>/<sub>`, lexically normalised
    pub fn snapshot_source(&self, dataset: &str, snapshot: &str, subpath: &str) -> String {
        let mut path = self.public_root.join(dataset).join(SNAPSHOT_MARKER).join(snapshot);
        let sub = subpath.trim_start_matches('/');
        if !sub.is_empty() {
            path.push(sub);
        }
        normalize_lexically(&path).to_string_lossy().into_owned()
    }

    /// `<public>/<dataset>/<path>`, the live counterpart of a snapshot path
    pub fn live_destination(&self, dataset: &str, path: &str) -> String {
        let mut dest = self.public_root.join(dataset);
        let sub = path.trim_start_matches('/');
        if !sub.is_empty() {
            dest.push(sub);
        }
        dest.to_string_lossy().into_owned()
    }

    /// Check a public-namespace (source, destination) pair before a restore
    ///
    /// The source must sit inside a snapshot and the destination must not,
    /// both textually and after symlinks are resolved, and both must resolve
    /// inside the resolved public root. Returns the resolved pair, re-based
    /// onto the configured public root so it maps cleanly to the backend.
    pub fn validate_restore(&self, source: &str, destination: &str) -> Result<(String, String)> {
        check_markers(source, destination)?;

        let root = resolve_lenient(&self.public_root)?;
        let source_real = resolve_lenient(Path::new(source))?;
        let destination_real = resolve_lenient(Path::new(destination))?;

        let source_text = source_real.to_string_lossy();
        let destination_text = destination_real.to_string_lossy();
        if !contains_snapshot_dir(&source_text) {
            warn!(source, resolved = %source_text, "restore source escapes the snapshot");
            return Err(PortalError::InvalidPath(
                "Source must be inside a .zfs/snapshot path".to_string(),
            ));
        }
        if destination_text.contains(SNAPSHOT_MARKER) {
            warn!(destination, resolved = %destination_text, "restore destination resolves into a snapshot");
            return Err(PortalError::InvalidPath(
                "Destination must not be inside a snapshot path".to_string(),
            ));
        }

        if !is_within(&source_real, &root) || !is_within(&destination_real, &root) {
            return Err(PortalError::InvalidPath(format!(
                "Restore paths must reside under {}",
                self.public_root.display()
            )));
        }

        Ok((
            self.rebase_public(&source_real, &root),
            self.rebase_public(&destination_real, &root),
        ))
    }

    /// A path under the resolved public root, spelled under the configured one
    fn rebase_public(&self, resolved: &Path, resolved_root: &Path) -> String {
        let relative = resolved.strip_prefix(resolved_root).unwrap_or(resolved);
        self.public_root.join(relative).to_string_lossy().into_owned()
    }

    /// Find the file a `<dataset>/<snapshot>/<path>` download names
    ///
    /// Datasets nest, so the split is taken from the longest dataset whose
    /// snapshot directory exists. The path is normalised and must resolve,
    /// symlinks included, to an existing file inside that snapshot.
    pub fn locate_snapshot_file(&self, request_path: &str) -> Result<SnapshotFile> {
        let segments: Vec<&str> = request_path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 {
            return Err(PortalError::InvalidPath(
                "Expected <dataset>/<snapshot>/<path>".to_string(),
            ));
        }

        let split = (1..segments.len() - 1).rev().find(|&i| {
            let dataset = segments[..i].join("/");
            check_names(&dataset, segments[i]).is_ok()
                && Path::new(&self.snapshot_source(&dataset, segments[i], "")).is_dir()
        });
        let Some(i) = split else {
            return Err(PortalError::InvalidPath(format!("No snapshot found in {}", request_path)));
        };

        let dataset = segments[..i].join("/");
        let snapshot = segments[i].to_string();
        let subpath = normalize_subpath(&segments[i + 1..].join("/"))?;
        let path = self.resolve_snapshot_file(&dataset, &snapshot, &subpath)?;
        if !path.is_file() {
            return Err(PortalError::InvalidPath(format!("Not a file: {}", subpath)));
        }

        Ok(SnapshotFile {
            dataset,
            snapshot,
            subpath,
            path,
        })
    }

    /// Resolve a file inside `<public>/<dataset>/.zfs/snapshot/<snapshot>`
    ///
    /// The subpath must already be normalised. Symlinks are followed and the
    /// result must still sit under the resolved snapshot root.
    pub fn resolve_snapshot_file(&self, dataset: &str, snapshot: &str, subpath: &str) -> Result<PathBuf> {
        check_names(dataset, snapshot)?;
        let snapshot_root = resolve_lenient(Path::new(&self.snapshot_source(dataset, snapshot, "")))?;
        let resolved = resolve_lenient(Path::new(&self.snapshot_source(dataset, snapshot, subpath)))?;

        if resolved == snapshot_root || !is_within(&resolved, &snapshot_root) {
            warn!(dataset, snapshot, subpath, resolved = %resolved.display(), "snapshot file escapes the snapshot");
            return Err(PortalError::InvalidPath(
                "Path must stay inside the snapshot".to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Marker checks repeated on the host-side paths handed to the middleware
    pub fn validate_backend_pair(&self, source: &str, destination: &str) -> Result<()> {
        check_markers(source, destination)?;

        let root = normalize_lexically(&self.backend_root);
        let source = normalize_lexically(Path::new(source));
        let destination = normalize_lexically(Path::new(destination));
        if !is_within(&source, &root) || !is_within(&destination, &root) {
            return Err(PortalError::InvalidPath(format!(
                "Restore paths must reside under {}",
                self.backend_root.display()
            )));
        }
        if !contains_snapshot_dir(&source.to_string_lossy()) {
            return Err(PortalError::InvalidPath(
                "Source must be inside a .zfs/snapshot path".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_markers(source: &str, destination: &str) -> Result<()> {
    if !contains_snapshot_dir(source) {
        return Err(PortalError::InvalidPath(
            "Source must be inside a .zfs/snapshot path".to_string(),
        ));
    }
    if destination.contains(SNAPSHOT_MARKER) {
        return Err(PortalError::InvalidPath(
            "Destination must not be inside a snapshot path".to_string(),
        ));
    }
    Ok(())
}

/// `.zfs/snapshot/` followed by at least one more segment
fn contains_snapshot_dir(path: &str) -> bool {
    path.contains(".zfs/snapshot/")
}

fn swap_prefix(path: &str, from: &Path, to: &Path) -> String {
    let from = from.to_string_lossy();
    let to = to.to_string_lossy();
    let from_dir = format!("{}/", from.trim_end_matches('/'));

    match path.strip_prefix(&from_dir) {
        Some(rest) => format!("{}/{}", to.trim_end_matches('/'), rest),
        None => path.to_string(),
    }
}

/// Prefix match on whole components, or equality
fn is_within(path: &Path, root: &Path) -> bool {
    path == root || path.starts_with(root)
}

/// Collapse `.` and `..` without touching the filesystem
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// realpath that tolerates missing components
///
/// Existing prefixes are resolved through symlinks; the nonexistent tail is
/// appended lexically. A symlink loop is reported as an invalid path.
pub fn resolve_lenient(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| PortalError::InvalidPath(format!("cannot resolve {}: {}", path.display(), e)))?
            .join(path)
    };

    let mut resolved = PathBuf::from("/");
    let mut hops = 0;

    // components are popped from a stack so symlink targets can be spliced in
    let mut queue: Vec<OsString> = absolute
        .components()
        .rev()
        .map(|c| c.as_os_str().to_os_string())
        .collect();

    while let Some(part) = queue.pop() {
        let part_path = Path::new(&part);
        match part_path.components().next() {
            Some(Component::RootDir) | Some(Component::Prefix(_)) => {
                resolved = PathBuf::from("/");
                continue;
            }
            Some(Component::CurDir) | None => continue,
            Some(Component::ParentDir) => {
                resolved.pop();
                continue;
            }
            Some(Component::Normal(_)) => {}
        }

        let candidate = resolved.join(&part);
        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(PortalError::InvalidPath(format!(
                        "too many levels of symbolic links: {}",
                        path.display()
                    )));
                }
                let target = fs::read_link(&candidate).map_err(|e| {
                    PortalError::InvalidPath(format!("cannot read link {}: {}", candidate.display(), e))
                })?;
                for component in target.components().rev() {
                    queue.push(component.as_os_str().to_os_string());
                }
            }
            _ => resolved = candidate,
        }
    }

    Ok(resolved)
}

/// Dataset and snapshot names as they may appear in a snapshot path
///
/// A dataset is one or more plain `/`-separated segments; a snapshot name is
/// a single segment. Neither may step outside its directory.
pub fn check_names(dataset: &str, snapshot: &str) -> Result<()> {
    let plain = |segment: &str| !segment.is_empty() && segment != "." && segment != "..";

    if !dataset.split('/').all(plain) || dataset.contains('@') {
        return Err(PortalError::InvalidPath(format!("Invalid dataset name: {:?}", dataset)));
    }
    if !plain(snapshot) || snapshot.contains('/') {
        return Err(PortalError::InvalidPath(format!("Invalid snapshot name: {:?}", snapshot)));
    }
    Ok(())
}

/// Decode and normalise a browse subpath relative to the snapshot root
///
/// Returns `""` for the root itself; rejects anything that climbs out.
pub fn normalize_subpath(raw: &str) -> Result<String> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Ok(String::new());
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(PortalError::InvalidPath("Invalid snapshot subpath".to_string()));
                }
            }
            other => parts.push(other),
        }
    }

    Ok(parts.join("/"))
}

/// `(label, cumulative path)` for each segment of a normalised subpath
pub fn breadcrumbs(subpath: &str) -> Vec<(String, String)> {
    let mut accum: Vec<&str> = Vec::new();
    subpath
        .split('/')
        .filter(|part| !part.is_empty())
        .map(|part| {
            accum.push(part);
            (part.to_string(), accum.join("/"))
        })
        .collect()
}
