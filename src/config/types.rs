//! Core configuration types for harvest runs
//!
//! This module contains the main `HarvestConfig` struct and its associated
//! types that define the configuration parameters for a scraping run.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_CACHE_TTL_HOURS, DEFAULT_DOMAIN_FAILURE_THRESHOLD,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_HEALTH_TIMEOUT_SECS, DEFAULT_JITTER_MS,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_FETCH_DELAY_SECS,
    DEFAULT_MAX_SCROLLS, DEFAULT_MIN_FETCH_DELAY_SECS, DEFAULT_MIN_SUCCESS_FRACTION,
    DEFAULT_PAGE_LOAD_TIMEOUT_SECS, DEFAULT_SCROLL_PAUSE_MS, DEFAULT_SIMILARITY_THRESHOLD,
    DEFAULT_WORKERS,
};

/// An opaque configuration secret. `Debug` and `Display` never reveal the
/// value; the inner string is only reachable through [`Credential::expose`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value. Callers must not log it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Configuration error raised by the builder or file loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Main configuration for a harvest run.
///
/// Construct through [`HarvestConfig::builder`] or [`HarvestConfig::from_file`];
/// all fields carry defaults suitable for a polite production run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Directory holding per-source cache entry files
    pub(crate) cache_dir: PathBuf,
    /// Directory holding persisted cookie snapshots
    pub(crate) cookie_dir: PathBuf,
    /// Directory receiving compressed backup snapshots
    pub(crate) backup_dir: PathBuf,
    /// JSON source list consumed by the run coordinator
    pub(crate) sources_file: PathBuf,

    /// Bounded worker count for the dispatcher
    pub(crate) workers: usize,
    /// Browser session pool size. `None` follows the worker count
    /// (session-per-worker).
    pub(crate) max_sessions: Option<usize>,
    pub(crate) headless: bool,

    /// Cache freshness window in hours
    pub(crate) cache_ttl_hours: u64,
    /// Per-kind override for social pages, which change faster
    pub(crate) social_cache_ttl_hours: Option<u64>,
    /// Force every cache lookup to miss without invalidating entries
    pub(crate) bypass_cache: bool,

    /// Maximum fetch attempts per source (first try + retries)
    pub(crate) max_attempts: u32,
    pub(crate) base_backoff_ms: u64,
    pub(crate) max_backoff_ms: u64,
    pub(crate) jitter_ms: u64,

    pub(crate) health_check_enabled: bool,
    pub(crate) health_timeout_secs: u64,

    /// Timeout for a single lightweight fetch attempt
    pub(crate) fetch_timeout_secs: u64,
    /// Timeout for a single browser page load
    pub(crate) page_load_timeout_secs: u64,
    /// Politeness delay bounds between lightweight requests
    pub(crate) min_fetch_delay_secs: u64,
    pub(crate) max_fetch_delay_secs: u64,

    /// Scroll budget and pacing for feed-style pages
    pub(crate) max_scrolls: u32,
    pub(crate) scroll_pause_ms: u64,

    /// Consecutive in-run failures before a domain is skipped
    pub(crate) domain_failure_threshold: u32,

    /// Social-page login credentials; never logged
    pub(crate) social_email: Option<Credential>,
    pub(crate) social_password: Option<Credential>,

    /// Inclusive composite similarity threshold for dedup
    pub(crate) similarity_threshold: f64,
    /// Fraction of active sources that must succeed or be cached for the
    /// run to report overall success
    pub(crate) min_success_fraction: f64,

    /// Fetch without committing cache writes or backup snapshots
    pub(crate) dry_run: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data/cache"),
            cookie_dir: PathBuf::from("data/cookies"),
            backup_dir: PathBuf::from("data/backups"),
            sources_file: PathBuf::from("sources.json"),
            workers: DEFAULT_WORKERS,
            max_sessions: None,
            headless: true,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            social_cache_ttl_hours: None,
            bypass_cache: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            jitter_ms: DEFAULT_JITTER_MS,
            health_check_enabled: true,
            health_timeout_secs: DEFAULT_HEALTH_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            page_load_timeout_secs: DEFAULT_PAGE_LOAD_TIMEOUT_SECS,
            min_fetch_delay_secs: DEFAULT_MIN_FETCH_DELAY_SECS,
            max_fetch_delay_secs: DEFAULT_MAX_FETCH_DELAY_SECS,
            max_scrolls: DEFAULT_MAX_SCROLLS,
            scroll_pause_ms: DEFAULT_SCROLL_PAUSE_MS,
            domain_failure_threshold: DEFAULT_DOMAIN_FAILURE_THRESHOLD,
            social_email: None,
            social_password: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_success_fraction: DEFAULT_MIN_SUCCESS_FRACTION,
            dry_run: false,
        }
    }
}

impl HarvestConfig {
    /// Start building a configuration from defaults.
    #[must_use]
    pub fn builder() -> super::HarvestConfigBuilder {
        super::HarvestConfigBuilder::new()
    }

    /// Load a configuration from a JSON file. Missing fields fall back to
    /// defaults; the result is validated the same way the builder does.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Override the source list path (CLI `--sources`).
    #[must_use]
    pub fn with_sources_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.sources_file = path.into();
        self
    }

    /// Force every cache lookup to miss (CLI `--no-cache`).
    #[must_use]
    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Fetch without committing cache writes or backups (CLI `--dry-run`).
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the worker count (CLI `--workers`).
    pub fn with_workers(mut self, workers: usize) -> Result<Self, ConfigError> {
        self.workers = workers;
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.min_fetch_delay_secs > self.max_fetch_delay_secs {
            return Err(ConfigError::Invalid(
                "min_fetch_delay_secs exceeds max_fetch_delay_secs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_success_fraction) {
            return Err(ConfigError::Invalid(
                "min_success_fraction must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
