//! Source dispatcher and worker pool.
//!
//! Iterates the active source list with a bounded worker pool. Each
//! source walks cache lookup → health check → retry-wrapped fetch →
//! normalize, and every error short of a run abort is converted into a
//! recorded outcome at this boundary; one bad source never stalls or
//! crashes the batch.

pub mod domain_health;
pub mod pipeline;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::cache::EventCache;
use crate::config::HarvestConfig;
use crate::events::Event;
use crate::fetch::{
    Fetch, FetcherChoice, HttpFetcher, RawContent, SessionFetcher, StructuralProbe,
    choose_fetcher,
};
use crate::health::{HealthChecker, HealthStatus};
use crate::normalize::Normalizer;
use crate::retry::RetryPolicy;
use crate::session::SessionManager;
use crate::sources::{FetchMethod, Source, SourceKind};

pub use domain_health::{DomainHealthBoard, extract_domain};
pub use pipeline::{SourcePipeline, SourceStage};

/// Only unrecoverable environment failures abort a run; everything else
/// becomes a per-source outcome.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("run aborted: {0}")]
    RunAbort(String),
}

/// Per-source result recorded into the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Success { events: usize, attempts: u32 },
    CachedHit { events: usize },
    SkippedUnhealthy { reason: String },
    Failed { reason: String },
}

/// One source's outcome with its identity, for the summary listing.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source_id: String,
    pub source_name: String,
    pub outcome: SourceOutcome,
}

/// Aggregated result of one dispatcher run. Events are in completion
/// order here; the coordinator re-establishes a deterministic order.
#[derive(Debug)]
pub struct RunResult {
    pub events: Vec<Event>,
    pub reports: Vec<SourceReport>,
    pub elapsed: Duration,
}

impl RunResult {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Success { .. }))
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::CachedHit { .. }))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::SkippedUnhealthy { .. }))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SourceOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.reports.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

/// Cooperative cancellation handle: no new sources are dispatched after
/// cancellation, in-flight fetches finish or time out, and partial
/// results are still emitted.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Shared components cloned into each worker task.
#[derive(Clone)]
struct WorkerContext {
    config: Arc<HarvestConfig>,
    health: Arc<HealthChecker>,
    cache: EventCache,
    retry: RetryPolicy,
    http: HttpFetcher,
    session_fetcher: Arc<SessionFetcher>,
    normalizer: Normalizer,
    domains: Arc<DomainHealthBoard>,
}

struct ProcessOutput {
    report: SourceReport,
    events: Vec<Event>,
    abort: Option<String>,
}

/// Runs the source list through the worker pool.
pub struct Dispatcher {
    context: WorkerContext,
    cancel: CancelFlag,
}

impl Dispatcher {
    pub fn new(config: Arc<HarvestConfig>, cancel: CancelFlag) -> anyhow::Result<Self> {
        let sessions = SessionManager::new(&config)?;
        let context = WorkerContext {
            health: Arc::new(HealthChecker::new(&config)?),
            cache: EventCache::open(config.cache_dir(), config.bypass_cache())?,
            retry: RetryPolicy::from_config(&config),
            http: HttpFetcher::new(&config)?,
            session_fetcher: Arc::new(SessionFetcher::new(sessions, &config)),
            normalizer: Normalizer::new(),
            domains: Arc::new(DomainHealthBoard::new(config.domain_failure_threshold())),
            config,
        };
        Ok(Self { context, cancel })
    }

    #[must_use]
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        self.context.session_fetcher.manager()
    }

    #[must_use]
    pub fn cache(&self) -> &EventCache {
        &self.context.cache
    }

    /// Process every source, bounded by the configured worker count.
    /// Outcomes are aggregated in completion order; no ordering between
    /// sources is promised.
    pub async fn run(&self, sources: Vec<Source>) -> Result<RunResult, HarvestError> {
        let start = Instant::now();
        let workers = self.context.config.workers();
        let semaphore = Arc::new(Semaphore::new(workers));

        let mut pending: VecDeque<Source> = sources.into();
        let mut active = FuturesUnordered::new();
        let mut reports = Vec::new();
        let mut events = Vec::new();
        let mut abort: Option<String> = None;

        info!(
            sources = pending.len(),
            workers,
            dry_run = self.context.config.dry_run(),
            "dispatching sources"
        );

        loop {
            while active.len() < workers {
                if self.cancel.is_cancelled() || abort.is_some() {
                    pending.clear();
                    break;
                }
                let Some(source) = pending.pop_front() else {
                    break;
                };

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    error!("worker semaphore closed unexpectedly");
                    break;
                };

                let context = self.context.clone();
                active.push(tokio::spawn(async move {
                    let _permit = permit;
                    process_source(source, context).await
                }));
            }

            match active.next().await {
                Some(Ok(output)) => {
                    if let Some(reason) = output.abort {
                        abort.get_or_insert(reason);
                    }
                    events.extend(output.events);
                    reports.push(output.report);
                }
                Some(Err(e)) => {
                    // A panicking task loses its report but not the run
                    error!(error = %e, "worker task panicked");
                }
                None => {
                    if pending.is_empty() {
                        break;
                    }
                }
            }

            if pending.is_empty() && active.is_empty() {
                break;
            }
        }

        if let Some(reason) = abort {
            return Err(HarvestError::RunAbort(reason));
        }

        if self.cancel.is_cancelled() {
            info!(
                completed = reports.len(),
                "run cancelled; emitting partial results"
            );
        }

        Ok(RunResult {
            events,
            reports,
            elapsed: start.elapsed(),
        })
    }
}

async fn process_source(source: Source, ctx: WorkerContext) -> ProcessOutput {
    let mut pipeline = SourcePipeline::new(&source.id);
    let domain = extract_domain(&source.url).ok();

    let output = |outcome: SourceOutcome, events: Vec<Event>, abort: Option<String>| {
        ProcessOutput {
            report: SourceReport {
                source_id: source.id.clone(),
                source_name: source.name.clone(),
                outcome,
            },
            events,
            abort,
        }
    };

    // Cache lookup first: a fresh entry short-circuits straight to
    // normalized output with zero network or browser calls
    if let Some(cached) = ctx.cache.lookup(&source.id).await {
        let count = cached.len();
        info!(source = source.id, events = count, "served from cache");
        let _ = pipeline.succeeded(count);
        return output(SourceOutcome::CachedHit { events: count }, cached, None);
    }

    // Domain-level short circuit before spending any probe effort
    if let Some(domain) = &domain
        && !ctx.domains.should_attempt(domain)
    {
        let reason = format!("domain {domain} disabled after repeated failures");
        let _ = pipeline.failed(&reason);
        return output(SourceOutcome::SkippedUnhealthy { reason }, Vec::new(), None);
    }

    // Health check: a skip costs no retry budget and touches no session
    match ctx.health.check(&source).await {
        HealthStatus::Healthy => {
            let _ = pipeline.health_checked();
        }
        HealthStatus::Unhealthy(reason) => {
            warn!(source = source.id, reason, "health check failed, skipping");
            let _ = pipeline.failed(&reason);
            return output(SourceOutcome::SkippedUnhealthy { reason }, Vec::new(), None);
        }
    }

    // Resolve the fetch method, probing once for `auto` sources
    let (choice, mut prefetched) = resolve_method(&source, &ctx).await;

    let retry_report = ctx
        .retry
        .execute(|attempt| {
            if let Err(e) = pipeline.fetching(attempt) {
                warn!(source = source.id, error = %e, "pipeline transition glitch");
            }
            let reused = prefetched.take();
            let source = &source;
            let ctx = &ctx;
            async move {
                if let Some(content) = reused {
                    return Ok(content);
                }
                match choice {
                    FetcherChoice::Lightweight => ctx.http.fetch(source).await,
                    FetcherChoice::Session => ctx.session_fetcher.fetch(source).await,
                }
            }
        })
        .await;

    match retry_report.outcome {
        Ok(raw) => {
            let normalized = ctx.normalizer.normalize(&raw, &source);

            if !ctx.config.dry_run() && !normalized.is_empty() {
                let ttl = ctx.config.cache_ttl(source.kind);
                if let Err(e) = ctx.cache.store(&source.id, &normalized, ttl).await {
                    warn!(source = source.id, error = %e, "failed to store cache entry");
                }
            }

            if let Some(domain) = &domain {
                ctx.domains.record_success(domain);
            }

            let count = normalized.len();
            let _ = pipeline.succeeded(count);
            info!(
                source = source.id,
                events = count,
                attempts = retry_report.attempts,
                elapsed = ?pipeline.elapsed(),
                "source harvested"
            );
            output(
                SourceOutcome::Success {
                    events: count,
                    attempts: retry_report.attempts,
                },
                normalized,
                None,
            )
        }
        Err(err) => {
            if let Some(domain) = &domain {
                ctx.domains.record_failure(domain, &err.reason);
            }
            let _ = pipeline.failed(&err.reason);
            warn!(
                source = source.id,
                attempts = retry_report.attempts,
                reason = err.reason,
                "source failed"
            );

            // A missing browser runtime is the one failure that cannot be
            // isolated: every browser-requiring source would fail the same
            // way, so the run aborts
            let abort = ctx
                .session_fetcher
                .manager()
                .runtime_unavailable()
                .then(|| format!("no usable browser runtime ({})", err.reason));

            output(
                SourceOutcome::Failed { reason: err.reason },
                Vec::new(),
                abort,
            )
        }
    }
}

/// Resolve a source's method hint into a fetcher choice. `Auto` probes
/// with a lightweight fetch whose content is reused as the first attempt
/// when the probe shows complete static structure; a failed or hollow
/// probe falls back to the session fetcher.
async fn resolve_method(
    source: &Source,
    ctx: &WorkerContext,
) -> (FetcherChoice, Option<RawContent>) {
    match choose_fetcher(source.method, source.kind, None) {
        FetcherChoice::Lightweight => (FetcherChoice::Lightweight, None),
        FetcherChoice::Session
            if source.method != FetchMethod::Auto || source.kind == SourceKind::SocialPage =>
        {
            (FetcherChoice::Session, None)
        }
        FetcherChoice::Session => {
            // Auto hint on a website: probe the static HTML once
            match ctx.http.fetch_html(&source.url).await {
                Ok((html, final_url)) => {
                    let probe = StructuralProbe::from_html(&html);
                    let choice = choose_fetcher(source.method, source.kind, Some(&probe));
                    if choice == FetcherChoice::Lightweight {
                        let mut content = RawContent::new(&source.id, html);
                        content.final_url = final_url;
                        (choice, Some(content))
                    } else {
                        (FetcherChoice::Session, None)
                    }
                }
                Err(e) => {
                    warn!(source = source.id, error = %e, "structural probe failed, using session fetcher");
                    (FetcherChoice::Session, None)
                }
            }
        }
    }
}
