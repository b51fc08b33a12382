//! Per-source event cache with a freshness window.
//!
//! One JSON file per source, named by an xxh3 fingerprint of the source
//! id. An entry is valid iff `now < expires_at`; expired entries are inert
//! and eligible for eviction. Reads fail open: corruption or IO errors
//! are misses, never fatal. Writes go through a temp file and an atomic
//! rename so concurrent readers never observe a torn entry.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::Event;

/// Persisted cache record for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_id: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub events: Vec<Event>,
}

impl CacheEntry {
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Content-addressed store mapping source ids to normalized events.
#[derive(Debug, Clone)]
pub struct EventCache {
    dir: PathBuf,
    bypass: bool,
}

impl EventCache {
    /// Open (creating if needed) a cache directory.
    pub fn open(dir: &Path, bypass: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            bypass,
        })
    }

    fn entry_path(&self, source_id: &str) -> PathBuf {
        let digest = xxhash_rust::xxh3::xxh3_64(source_id.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest.to_be_bytes())))
    }

    /// Look up the cached events for a source. Returns `None` on bypass,
    /// absence, expiry, or any read/parse failure.
    pub async fn lookup(&self, source_id: &str) -> Option<Vec<Event>> {
        if self.bypass {
            return None;
        }

        let path = self.entry_path(source_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(source_id, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(source_id, error = %e, "corrupt cache entry, treating as miss");
                return None;
            }
        };

        if !entry.is_valid_at(Utc::now()) {
            debug!(source_id, expired_at = %entry.expires_at, "cache entry expired");
            return None;
        }

        debug!(source_id, events = entry.events.len(), "cache hit");
        Some(entry.events)
    }

    /// Store normalized events for a source with the given freshness
    /// window. Called only after a successful fetch + normalize.
    pub async fn store(&self, source_id: &str, events: &[Event], ttl: Duration) -> Result<()> {
        let now = Utc::now();
        let entry = CacheEntry {
            source_id: source_id.to_string(),
            stored_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24)),
            events: events.to_vec(),
        };

        let path = self.entry_path(source_id);
        let dir = self.dir.clone();
        let json = serde_json::to_vec_pretty(&entry).context("failed to serialize cache entry")?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .context("failed to create cache temp file")?;
            tmp.write_all(&json).context("failed to write cache entry")?;
            tmp.persist(&path)
                .with_context(|| format!("failed to persist cache entry {}", path.display()))?;
            Ok(())
        })
        .await
        .context("cache write task panicked")??;

        debug!(source_id, "cache entry stored");
        Ok(())
    }

    /// Remove expired and unreadable entries. Returns the eviction count.
    pub async fn evict_expired(&self) -> Result<usize> {
        let dir = self.dir.clone();
        let evicted = tokio::task::spawn_blocking(move || -> Result<usize> {
            let mut evicted = 0;
            let now = Utc::now();
            for entry in std::fs::read_dir(&dir)
                .with_context(|| format!("failed to read cache directory {}", dir.display()))?
                .flatten()
            {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let stale = match std::fs::read(&path)
                    .ok()
                    .and_then(|raw| serde_json::from_slice::<CacheEntry>(&raw).ok())
                {
                    Some(parsed) => !parsed.is_valid_at(now),
                    None => true, // unreadable entries are inert, drop them
                };
                if stale && std::fs::remove_file(&path).is_ok() {
                    evicted += 1;
                }
            }
            Ok(evicted)
        })
        .await
        .context("cache eviction task panicked")??;

        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDraft, SourceRef};
    use chrono::NaiveDate;

    fn sample_events() -> Vec<Event> {
        let draft = EventDraft {
            title: "Jazz Night".into(),
            start: NaiveDate::from_ymd_opt(2024, 7, 15)
                .expect("valid date")
                .and_hms_opt(21, 0, 0),
            ..EventDraft::default()
        };
        let source = SourceRef {
            source_id: "s1".into(),
            source_name: "Site".into(),
            source_url: "https://a.example".into(),
        };
        vec![draft.finalize(source).expect("valid draft")]
    }

    #[tokio::test]
    async fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = EventCache::open(dir.path(), false).expect("open");

        let events = sample_events();
        cache
            .store("s1", &events, Duration::from_secs(3600))
            .await
            .expect("store");

        let hit = cache.lookup("s1").await.expect("hit");
        assert_eq!(hit, events);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = EventCache::open(dir.path(), false).expect("open");

        cache
            .store("s1", &sample_events(), Duration::ZERO)
            .await
            .expect("store");

        assert!(cache.lookup("s1").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = EventCache::open(dir.path(), false).expect("open");

        cache
            .store("s1", &sample_events(), Duration::from_secs(3600))
            .await
            .expect("store");
        let path = cache.entry_path("s1");
        std::fs::write(&path, b"{ not json").expect("corrupt the entry");

        assert!(cache.lookup("s1").await.is_none());
    }

    #[tokio::test]
    async fn bypass_forces_misses_without_invalidating() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = EventCache::open(dir.path(), false).expect("open");
        cache
            .store("s1", &sample_events(), Duration::from_secs(3600))
            .await
            .expect("store");

        let bypassed = EventCache::open(dir.path(), true).expect("open");
        assert!(bypassed.lookup("s1").await.is_none());

        // The entry itself survives a bypassed run
        assert!(cache.lookup("s1").await.is_some());
    }

    #[tokio::test]
    async fn eviction_removes_only_expired_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = EventCache::open(dir.path(), false).expect("open");

        cache
            .store("fresh", &sample_events(), Duration::from_secs(3600))
            .await
            .expect("store");
        cache
            .store("stale", &sample_events(), Duration::ZERO)
            .await
            .expect("store");

        let evicted = cache.evict_expired().await.expect("evict");
        assert_eq!(evicted, 1);
        assert!(cache.lookup("fresh").await.is_some());
    }
}
