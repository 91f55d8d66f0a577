//! Append-only, bounded log of [`FailedComment`] records, persisted at a
//! stable path in the same atomic-write idiom used by the rest of this
//! repo's JSON stores: write to a temp file, rename into place, keep a
//! best-effort sibling backup.

use crate::model::FailedComment;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Hard cap on the number of entries retained; oldest entries are dropped
/// first once the cap is exceeded.
const DEFAULT_CAPACITY: usize = 100;

pub struct ErrorTracker {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<Vec<FailedComment>>,
}

impl ErrorTracker {
    /// Load the tracker from `path`. A missing or corrupted file yields an
    /// empty log rather than an error — corruption must not block new writes.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        Self::load_with_capacity(path, DEFAULT_CAPACITY)
    }

    pub fn load_with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str::<Vec<FailedComment>>(&text).ok())
            .unwrap_or_else(|| {
                if path.exists() {
                    warn!(path = %path.display(), "error log was corrupted; starting fresh");
                }
                Vec::new()
            });
        Self {
            path,
            capacity,
            entries: Mutex::new(entries),
        }
    }

    /// Append a record, evicting the oldest entry if the log is already at
    /// capacity, then persist. The in-memory state stays consistent with
    /// the on-disk state even if persistence fails; the error is logged but
    /// not propagated, matching the tracker's "never halt the pipeline" role.
    pub fn record(&self, failure: FailedComment) {
        let mut entries = self.entries.lock().expect("error tracker mutex poisoned");
        entries.push(failure);
        if entries.len() > self.capacity {
            let overflow = entries.len() - self.capacity;
            entries.drain(0..overflow);
        }
        if let Err(e) = write_atomic(&self.path, &entries) {
            warn!(path = %self.path.display(), error = %e, "failed to persist error log");
        }
    }

    pub fn entries(&self) -> Vec<FailedComment> {
        self.entries.lock().expect("error tracker mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("error tracker mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_atomic(path: &Path, entries: &[FailedComment]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        let backup = backup_path(path);
        let _ = std::fs::copy(path, backup);
    }
    let tmp = tmp_path(path);
    let json = serde_json::to_string_pretty(entries)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_os_string();
    p.push(".backup");
    PathBuf::from(p)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_os_string();
    p.push(".tmp");
    PathBuf::from(p)
}
