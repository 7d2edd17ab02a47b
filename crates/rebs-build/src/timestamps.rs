//! Invocation-scoped cache of file modification times.
//!
//! Timestamps are integer milliseconds since the epoch; the only property
//! the rest of the pipeline relies on is that a more recent file has a
//! higher number. A missing file reads as 0, and `exists` is defined as a
//! nonzero timestamp. Results are memoized for the duration of the
//! invocation; `set_to_now` updates the cache, not the filesystem, which is
//! how the planner suppresses double-linking of outputs it has already
//! scheduled but not yet produced.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct TimestampCache {
    timestamps_by_path: HashMap<PathBuf, u64>,
}

impl TimestampCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The timestamp of a file, or 0 if it does not exist.
    pub fn timestamp_of(&mut self, path: &Path) -> u64 {
        let normalized = normalize_path(path);
        if let Some(timestamp) = self.timestamps_by_path.get(&normalized) {
            return *timestamp;
        }

        let timestamp = read_timestamp(&normalized);
        self.timestamps_by_path.insert(normalized, timestamp);
        timestamp
    }

    /// Whether a file exists.
    pub fn exists(&mut self, path: &Path) -> bool {
        self.timestamp_of(path) != 0
    }

    /// Sets the cached timestamp of a file to now.
    pub fn set_to_now(&mut self, path: &Path) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);
        self.timestamps_by_path.insert(normalize_path(path), now);
    }

    /// Drops the cached entry so the next read hits the filesystem.
    pub fn invalidate(&mut self, path: &Path) {
        self.timestamps_by_path.remove(&normalize_path(path));
    }
}

/// Weakly-canonical resolution: the longest existing prefix is canonicalized
/// and any non-existent suffix components are preserved as-is.
fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            normalize_path(parent).join(name)
        }
        _ => path.to_path_buf(),
    }
}

fn read_timestamp(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
