//! Read accessors for [`HarvestConfig`]
//!
//! Duration-valued settings are exposed as `std::time::Duration` so call
//! sites never re-derive units from raw integers.

use std::path::Path;
use std::time::Duration;

use super::types::{Credential, HarvestConfig};
use crate::sources::SourceKind;

impl HarvestConfig {
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    #[must_use]
    pub fn cookie_dir(&self) -> &Path {
        &self.cookie_dir
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    #[must_use]
    pub fn sources_file(&self) -> &Path {
        &self.sources_file
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Session pool size: explicit setting, otherwise one per worker.
    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions.unwrap_or(self.workers).max(1)
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    /// Cache freshness window for a given source kind.
    #[must_use]
    pub fn cache_ttl(&self, kind: SourceKind) -> Duration {
        let hours = match kind {
            SourceKind::SocialPage => {
                self.social_cache_ttl_hours.unwrap_or(self.cache_ttl_hours)
            }
            SourceKind::Website => self.cache_ttl_hours,
        };
        Duration::from_secs(hours * 3600)
    }

    #[must_use]
    pub fn bypass_cache(&self) -> bool {
        self.bypass_cache
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    #[must_use]
    pub fn health_check_enabled(&self) -> bool {
        self.health_check_enabled
    }

    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    #[must_use]
    pub fn fetch_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.min_fetch_delay_secs),
            Duration::from_secs(self.max_fetch_delay_secs),
        )
    }

    #[must_use]
    pub fn max_scrolls(&self) -> u32 {
        self.max_scrolls
    }

    #[must_use]
    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    #[must_use]
    pub fn domain_failure_threshold(&self) -> u32 {
        self.domain_failure_threshold
    }

    #[must_use]
    pub fn social_email(&self) -> Option<&Credential> {
        self.social_email.as_ref()
    }

    #[must_use]
    pub fn social_password(&self) -> Option<&Credential> {
        self.social_password.as_ref()
    }

    #[must_use]
    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    #[must_use]
    pub fn min_success_fraction(&self) -> f64 {
        self.min_success_fraction
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}
