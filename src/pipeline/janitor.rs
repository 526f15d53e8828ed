//! Temp-file ownership for one batch.
//!
//! Every stage that creates a file on disk does so through
//! [`Janitor::create`], which registers the path before anything is written.
//! [`Janitor::release`] deletes everything still registered, exactly once;
//! the `Drop` impl calls it as well, so early returns and panics clean up
//! too. The single file handed back to the caller is taken out with
//! [`Janitor::detach`] and owned by [`crate::output::MergedDocument`].

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// The stage that created a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedBy {
    /// Downloaded body of a remote reference.
    Fetch,
    /// Per-item PDF produced by the rasterizer or renderer.
    Convert,
    /// HTML source written out for rendering.
    Render,
    /// Merged output or private copy of a single survivor.
    Assemble,
}

/// A temp file owned by the janitor until released.
#[derive(Debug)]
pub struct TrackedResource {
    pub path: PathBuf,
    pub created_by: CreatedBy,
}

impl TrackedResource {
    /// Delete the file now. A file that is already gone counts as deleted.
    pub fn remove(self) {
        remove_quietly(&self.path, self.created_by);
    }

    /// Delete the file after `grace` on a background task.
    ///
    /// Falls back to immediate deletion when called outside a Tokio runtime.
    pub fn remove_after(self, grace: Duration) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    self.remove();
                });
            }
            Err(_) => self.remove(),
        }
    }
}

fn remove_quietly(path: &Path, created_by: CreatedBy) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), ?created_by, "Released temp file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), ?created_by, "Failed to release temp file: {}", e),
    }
}

/// Tracks every temp file created during one batch.
#[derive(Debug)]
pub struct Janitor {
    dir: PathBuf,
    tracked: Mutex<Vec<TrackedResource>>,
}

impl Janitor {
    /// Create a janitor whose temp files live in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Create an empty, uniquely named file ending in `.{ext}` and track it.
    pub fn create(&self, ext: &str, created_by: CreatedBy) -> std::io::Result<PathBuf> {
        let suffix = format!(".{}", ext.trim_start_matches('.'));
        let file = tempfile::Builder::new()
            .prefix("pdfmerge-")
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;
        let (_file, path) = file.keep().map_err(|e| e.error)?;
        self.track(path.clone(), created_by);
        Ok(path)
    }

    /// Take ownership of a file some other component created.
    pub fn track(&self, path: impl Into<PathBuf>, created_by: CreatedBy) {
        let path = path.into();
        let mut tracked = self.tracked.lock();
        if tracked.iter().any(|r| r.path == path) {
            return;
        }
        tracked.push(TrackedResource { path, created_by });
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked.lock().iter().any(|r| r.path == path)
    }

    /// Number of files currently awaiting release.
    pub fn len(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop tracking `path` and hand its ownership to the caller.
    pub fn detach(&self, path: &Path) -> Option<TrackedResource> {
        let mut tracked = self.tracked.lock();
        let pos = tracked.iter().position(|r| r.path == path)?;
        Some(tracked.swap_remove(pos))
    }

    /// Delete every tracked file. Returns how many were released.
    pub fn release(&self) -> usize {
        let drained: Vec<TrackedResource> = std::mem::take(&mut *self.tracked.lock());
        let n = drained.len();
        for resource in drained {
            resource.remove();
        }
        n
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.release();
    }
}
