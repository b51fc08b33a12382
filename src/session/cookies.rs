//! Persisted cookie snapshots, one per logical session identity.
//!
//! A snapshot captures the authenticated browser state of a social
//! account so later runs can skip the login flow. Snapshots live as JSON
//! files under the cookie directory and are wiped by
//! [`CookieStore::invalidate`] when a session is detected as blocked or
//! logged out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam, TimeSinceEpoch};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One persisted cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Seconds since epoch; negative values mean a session cookie
    pub expires: f64,
    pub secure: bool,
    pub http_only: bool,
}

impl From<&Cookie> for CookieRecord {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

impl CookieRecord {
    /// Convert to the CDP parameter used to restore the cookie.
    pub fn to_param(&self) -> Result<CookieParam> {
        let mut builder = CookieParam::builder()
            .name(&self.name)
            .value(&self.value)
            .domain(&self.domain)
            .path(&self.path)
            .secure(self.secure)
            .http_only(self.http_only);
        if self.expires > 0.0 {
            builder = builder.expires(TimeSinceEpoch::new(self.expires));
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build cookie param: {e}"))
    }
}

/// On-disk store of cookie snapshots keyed by logical identity.
#[derive(Debug)]
pub struct CookieStore {
    dir: PathBuf,
}

impl CookieStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cookie directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn snapshot_path(&self, identity: &str) -> PathBuf {
        let digest = xxhash_rust::xxh3::xxh3_64(identity.as_bytes());
        self.dir
            .join(format!("{}.json", hex::encode(digest.to_be_bytes())))
    }

    /// Load the snapshot for an identity, or `None` when absent or
    /// unreadable (a bad snapshot just means a fresh login).
    pub fn load(&self, identity: &str) -> Option<Vec<CookieRecord>> {
        let path = self.snapshot_path(identity);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(identity, error = %e, "failed to read cookie snapshot");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(records) => {
                debug!(identity, "loaded cookie snapshot");
                Some(records)
            }
            Err(e) => {
                warn!(identity, error = %e, "corrupt cookie snapshot, ignoring");
                None
            }
        }
    }

    /// Persist a snapshot for reuse by later runs.
    pub fn save(&self, identity: &str, cookies: &[CookieRecord]) -> Result<()> {
        let path = self.snapshot_path(identity);
        let json = serde_json::to_vec_pretty(cookies).context("failed to serialize cookies")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write cookie snapshot {}", path.display()))?;
        debug!(identity, count = cookies.len(), "saved cookie snapshot");
        Ok(())
    }

    /// Discard the persisted snapshot, forcing a fresh login on the next
    /// acquisition.
    pub fn invalidate(&self, identity: &str) -> Result<()> {
        let path = self.snapshot_path(identity);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(identity, "invalidated cookie snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to remove cookie snapshot {}", path.display())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> CookieRecord {
        CookieRecord {
            name: name.into(),
            value: "v".into(),
            domain: ".social.example".into(),
            path: "/".into(),
            expires: 2_000_000_000.0,
            secure: true,
            http_only: true,
        }
    }

    #[test]
    fn snapshot_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CookieStore::open(dir.path()).expect("open");

        let cookies = vec![record("sid"), record("token")];
        store.save("social", &cookies).expect("save");
        assert_eq!(store.load("social"), Some(cookies));
    }

    #[test]
    fn invalidate_removes_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CookieStore::open(dir.path()).expect("open");

        store.save("social", &[record("sid")]).expect("save");
        store.invalidate("social").expect("invalidate");
        assert!(store.load("social").is_none());

        // Invalidating an absent snapshot is a no-op
        store.invalidate("social").expect("idempotent");
    }

    #[test]
    fn corrupt_snapshot_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CookieStore::open(dir.path()).expect("open");
        store.save("social", &[record("sid")]).expect("save");

        let path = store.snapshot_path("social");
        std::fs::write(&path, b"[ not json").expect("corrupt");
        assert!(store.load("social").is_none());
    }
}
