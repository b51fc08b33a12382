//! Compressed backup snapshots of the raw event collection.
//!
//! Written at the end of every non-dry run, before the events are handed
//! to downstream collaborators, so a failed export can always be replayed
//! from the snapshot.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::{Compression, write::GzEncoder};
use tracing::info;

use crate::events::Event;

/// Writes gzip-compressed JSON snapshots into the backup directory.
#[derive(Debug, Clone)]
pub struct BackupWriter {
    dir: PathBuf,
}

impl BackupWriter {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create backup directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Write one snapshot, named by the run's start time. Returns the
    /// snapshot path.
    pub async fn write_snapshot(
        &self,
        events: &[Event],
        started_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let filename = format!("events_{}.json.gz", started_at.format("%Y%m%d_%H%M%S"));
        let path = self.dir.join(filename);

        let json = serde_json::to_vec_pretty(events).context("failed to serialize events")?;
        let dir = self.dir.clone();
        let target = path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let tmp = tempfile::NamedTempFile::new_in(&dir)
                .context("failed to create backup temp file")?;
            let mut encoder = GzEncoder::new(tmp, Compression::default());
            encoder.write_all(&json).context("failed to compress snapshot")?;
            let tmp = encoder.finish().context("failed to finish compression")?;
            tmp.persist(&target)
                .with_context(|| format!("failed to persist snapshot {}", target.display()))?;
            Ok(())
        })
        .await
        .context("backup task panicked")??;

        info!(path = %path.display(), events = events.len(), "backup snapshot written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDraft, SourceRef};
    use chrono::NaiveDate;
    use std::io::Read;

    #[tokio::test]
    async fn snapshot_round_trips_through_gzip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = BackupWriter::open(dir.path()).expect("open");

        let draft = EventDraft {
            title: "Jazz Night".into(),
            start: NaiveDate::from_ymd_opt(2024, 7, 15)
                .expect("valid date")
                .and_hms_opt(21, 0, 0),
            ..EventDraft::default()
        };
        let events = vec![
            draft
                .finalize(SourceRef {
                    source_id: "s1".into(),
                    source_name: "Site".into(),
                    source_url: "https://a.example".into(),
                })
                .expect("valid draft"),
        ];

        let started_at = Utc::now();
        let path = writer
            .write_snapshot(&events, started_at)
            .await
            .expect("snapshot written");
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with(".json.gz"));

        let file = std::fs::File::open(&path).expect("open snapshot");
        let mut decoder = flate2::read::GzDecoder::new(file);
        let mut json = String::new();
        decoder.read_to_string(&mut json).expect("decompress");
        let restored: Vec<Event> = serde_json::from_str(&json).expect("parse");
        assert_eq!(restored, events);
    }
}
