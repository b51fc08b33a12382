//! Per-session browser profile directories
//!
//! Every session gets a UUID-named user-data directory, which keeps
//! concurrent sessions from contending on Chrome's profile SingletonLock.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use uuid::Uuid;

/// RAII wrapper for a session's profile directory.
///
/// The directory is removed on drop unless ownership of the path was
/// transferred out with [`SessionProfile::into_path`].
#[derive(Debug)]
pub struct SessionProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl SessionProfile {
    /// Create a fresh UUID-named profile directory in the system temp dir.
    pub fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("eventharvest_session_{}", Uuid::new_v4()));

        // create_dir (not create_dir_all) fails on an existing directory,
        // which guards against UUID collision
        std::fs::create_dir(&path)
            .with_context(|| format!("failed to create profile directory {}", path.display()))?;

        debug!(path = %path.display(), "created session profile directory");
        Ok(Self {
            path,
            cleanup_on_drop: true,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the profile and return its path, disabling auto-cleanup.
    /// Use when another owner (the session teardown) takes over removal.
    #[must_use]
    pub fn into_path(mut self) -> PathBuf {
        self.cleanup_on_drop = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for SessionProfile {
    fn drop(&mut self) {
        if self.cleanup_on_drop && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to clean up profile directory");
            }
        }
    }
}

/// Remove a profile directory handed out via [`SessionProfile::into_path`].
pub fn remove_profile_dir(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "failed to remove profile directory");
        }
    }
}
