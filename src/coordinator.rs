//! Run coordinator: the top-level driver of one harvest run.
//!
//! Loads the active source list, runs the dispatcher, deduplicates and
//! re-orders the aggregate, writes the backup snapshot, evicts expired
//! cache entries, and reports a run summary. A run always completes with
//! every source's outcome enumerated; only a missing browser runtime
//! aborts early.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::backup::BackupWriter;
use crate::config::HarvestConfig;
use crate::dedup::deduplicate;
use crate::dispatch::{CancelFlag, Dispatcher, SourceOutcome, SourceReport};
use crate::events::Event;
use crate::sources::{load_sources, select_active};

/// Overall run status for the operator and the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Enough sources succeeded or were served from cache
    Success,
    /// The run completed, but below the configured success fraction
    Degraded,
}

/// What one run did, per source and in aggregate.
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub sources_total: usize,
    pub succeeded: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub events_raw: usize,
    pub events_final: usize,
    pub backup_path: Option<std::path::PathBuf>,
    pub status: RunStatus,
    pub reports: Vec<SourceReport>,
}

/// Top-level driver owning the dispatcher and the cancellation flag.
pub struct RunCoordinator {
    config: Arc<HarvestConfig>,
    dispatcher: Dispatcher,
    cancel: CancelFlag,
}

impl RunCoordinator {
    pub fn new(config: HarvestConfig) -> Result<Self> {
        let config = Arc::new(config);
        let cancel = CancelFlag::new();
        let dispatcher = Dispatcher::new(Arc::clone(&config), cancel.clone())
            .context("failed to assemble dispatcher")?;
        Ok(Self {
            config,
            dispatcher,
            cancel,
        })
    }

    /// Handle for wiring external cancellation (e.g. SIGINT).
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute one run, optionally restricted to a subset of source ids.
    pub async fn run(&self, subset: Option<&[String]>) -> Result<(Vec<Event>, RunSummary)> {
        let started_at = Utc::now();

        let all_sources = load_sources(self.config.sources_file())
            .context("failed to load source list")?;
        let sources = select_active(all_sources, subset);
        let sources_total = sources.len();
        info!(active = sources_total, "loaded source list");

        let result = self.dispatcher.run(sources).await?;
        let events_raw = result.events.len();
        let succeeded = result.succeeded();
        let cached = result.cached();
        let skipped = result.skipped();
        let failed = result.failed();
        let elapsed = result.elapsed;
        let reports = result.reports;

        let mut events = deduplicate(result.events, self.config.similarity_threshold());
        // Completion order is never exposed: final ordering is by start
        // time, then title (deduplicate already guarantees this, restated
        // here because it is a contract of the run, not of dedup)
        events.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });

        let backup_path = if self.config.dry_run() {
            None
        } else {
            let writer = BackupWriter::open(self.config.backup_dir())?;
            match writer.write_snapshot(&events, started_at).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "backup snapshot failed");
                    None
                }
            }
        };

        if !self.config.dry_run()
            && let Err(e) = self.dispatcher.cache().evict_expired().await
        {
            warn!(error = %e, "cache eviction failed");
        }

        self.dispatcher.session_manager().shutdown().await;

        let status = run_status(
            succeeded + cached,
            sources_total,
            self.config.min_success_fraction(),
        );

        let summary = RunSummary {
            started_at,
            elapsed,
            sources_total,
            succeeded,
            cached,
            skipped,
            failed,
            events_raw,
            events_final: events.len(),
            backup_path,
            status,
            reports,
        };

        log_summary(&summary);
        Ok((events, summary))
    }
}

/// Success iff at least the configured fraction of active sources
/// succeeded or were served from cache. An empty run is a success.
#[must_use]
pub fn run_status(ok: usize, total: usize, min_fraction: f64) -> RunStatus {
    if total == 0 {
        return RunStatus::Success;
    }
    if (ok as f64) / (total as f64) >= min_fraction {
        RunStatus::Success
    } else {
        RunStatus::Degraded
    }
}

fn log_summary(summary: &RunSummary) {
    info!("================ run summary ================");
    info!(elapsed = ?summary.elapsed, status = ?summary.status, "run finished");
    info!(
        total = summary.sources_total,
        succeeded = summary.succeeded,
        cached = summary.cached,
        skipped = summary.skipped,
        failed = summary.failed,
        "sources"
    );
    info!(
        raw = summary.events_raw,
        after_dedup = summary.events_final,
        folded = summary.events_raw.saturating_sub(summary.events_final),
        "events"
    );
    if let Some(path) = &summary.backup_path {
        info!(path = %path.display(), "backup snapshot");
    }

    for report in &summary.reports {
        match &report.outcome {
            SourceOutcome::Failed { reason } => {
                warn!(source = report.source_id, name = report.source_name, reason, "failed");
            }
            SourceOutcome::SkippedUnhealthy { reason } => {
                warn!(source = report.source_id, name = report.source_name, reason, "skipped");
            }
            SourceOutcome::Success { events, attempts } => {
                info!(source = report.source_id, events, attempts, "ok");
            }
            SourceOutcome::CachedHit { events } => {
                info!(source = report.source_id, events, "cache");
            }
        }
    }
    info!("=============================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_threshold_is_a_fraction_of_active_sources() {
        assert_eq!(run_status(5, 10, 0.5), RunStatus::Success);
        assert_eq!(run_status(4, 10, 0.5), RunStatus::Degraded);
        assert_eq!(run_status(10, 10, 1.0), RunStatus::Success);
        assert_eq!(run_status(0, 10, 0.0), RunStatus::Success);
    }

    #[test]
    fn empty_run_is_a_success() {
        assert_eq!(run_status(0, 0, 0.5), RunStatus::Success);
    }
}
