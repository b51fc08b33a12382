//! Builder for [`HarvestConfig`]
//!
//! Mirrors the field set of the config struct; `build` validates the
//! assembled configuration before handing it out.

use std::path::PathBuf;

use super::types::{ConfigError, Credential, HarvestConfig};

/// Fluent builder over [`HarvestConfig`] defaults.
#[derive(Debug, Clone, Default)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    #[must_use]
    pub fn cookie_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cookie_dir = dir.into();
        self
    }

    #[must_use]
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backup_dir = dir.into();
        self
    }

    #[must_use]
    pub fn sources_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sources_file = path.into();
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    #[must_use]
    pub fn max_sessions(mut self, sessions: usize) -> Self {
        self.config.max_sessions = Some(sessions);
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn cache_ttl_hours(mut self, hours: u64) -> Self {
        self.config.cache_ttl_hours = hours;
        self
    }

    #[must_use]
    pub fn social_cache_ttl_hours(mut self, hours: u64) -> Self {
        self.config.social_cache_ttl_hours = Some(hours);
        self
    }

    #[must_use]
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.config.bypass_cache = bypass;
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn base_backoff_ms(mut self, millis: u64) -> Self {
        self.config.base_backoff_ms = millis;
        self
    }

    #[must_use]
    pub fn max_backoff_ms(mut self, millis: u64) -> Self {
        self.config.max_backoff_ms = millis;
        self
    }

    #[must_use]
    pub fn jitter_ms(mut self, millis: u64) -> Self {
        self.config.jitter_ms = millis;
        self
    }

    #[must_use]
    pub fn health_check_enabled(mut self, enabled: bool) -> Self {
        self.config.health_check_enabled = enabled;
        self
    }

    #[must_use]
    pub fn health_timeout_secs(mut self, secs: u64) -> Self {
        self.config.health_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn page_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn fetch_delay_secs(mut self, min: u64, max: u64) -> Self {
        self.config.min_fetch_delay_secs = min;
        self.config.max_fetch_delay_secs = max;
        self
    }

    #[must_use]
    pub fn max_scrolls(mut self, scrolls: u32) -> Self {
        self.config.max_scrolls = scrolls;
        self
    }

    #[must_use]
    pub fn scroll_pause_ms(mut self, millis: u64) -> Self {
        self.config.scroll_pause_ms = millis;
        self
    }

    #[must_use]
    pub fn domain_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.domain_failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn social_credentials(
        mut self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.social_email = Some(Credential::new(email));
        self.config.social_password = Some(Credential::new(password));
        self
    }

    #[must_use]
    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn min_success_fraction(mut self, fraction: f64) -> Self {
        self.config.min_success_fraction = fraction;
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Validate and return the assembled configuration.
    pub fn build(self) -> Result<HarvestConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
