//! Per-domain failure tracking within one run.
//!
//! Several sources can share a domain (one portal hosting many regional
//! listing pages). When a domain keeps failing, further sources on it are
//! skipped for the rest of the run instead of burning their retry budgets
//! against a dead host.

use dashmap::DashMap;
use tracing::{debug, warn};

/// Health counters for a single domain.
#[derive(Debug, Clone, Default)]
pub struct DomainRecord {
    pub consecutive_failures: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
}

/// Lock-free per-domain failure board shared by all workers.
pub struct DomainHealthBoard {
    domains: DashMap<String, DomainRecord>,
    failure_threshold: u32,
}

impl DomainHealthBoard {
    #[must_use]
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            domains: DashMap::new(),
            failure_threshold,
        }
    }

    /// Whether sources on this domain should still be attempted.
    #[must_use]
    pub fn should_attempt(&self, domain: &str) -> bool {
        match self.domains.get(domain) {
            Some(record) => record.consecutive_failures < self.failure_threshold,
            None => true,
        }
    }

    pub fn record_success(&self, domain: &str) {
        let mut record = self.domains.entry(domain.to_string()).or_default();
        record.consecutive_failures = 0;
        record.total_attempts += 1;
        record.total_successes += 1;
    }

    pub fn record_failure(&self, domain: &str, error: &str) {
        let mut record = self.domains.entry(domain.to_string()).or_default();
        record.consecutive_failures += 1;
        record.total_attempts += 1;

        if record.consecutive_failures == self.failure_threshold {
            warn!(
                domain,
                failures = record.consecutive_failures,
                error,
                "domain disabled for the rest of the run"
            );
        } else {
            debug!(
                domain,
                failures = record.consecutive_failures,
                threshold = self.failure_threshold,
                error,
                "domain failure recorded"
            );
        }
    }

    /// Domains currently past the failure threshold.
    #[must_use]
    pub fn disabled_domains(&self) -> Vec<String> {
        self.domains
            .iter()
            .filter(|entry| entry.value().consecutive_failures >= self.failure_threshold)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// Extract the host portion of a URL for domain bookkeeping.
pub fn extract_domain(url_str: &str) -> Result<String, String> {
    match url::Url::parse(url_str) {
        Ok(url) => url
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| format!("URL has no host: {url_str}")),
        Err(e) => Err(format!("failed to parse URL {url_str}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_disabled_after_threshold_failures() {
        let board = DomainHealthBoard::new(3);

        assert!(board.should_attempt("portal.example"));
        board.record_failure("portal.example", "timeout");
        board.record_failure("portal.example", "timeout");
        assert!(board.should_attempt("portal.example"));

        board.record_failure("portal.example", "timeout");
        assert!(!board.should_attempt("portal.example"));
        assert_eq!(board.disabled_domains(), vec!["portal.example".to_string()]);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let board = DomainHealthBoard::new(2);
        board.record_failure("portal.example", "timeout");
        board.record_success("portal.example");
        board.record_failure("portal.example", "timeout");
        assert!(board.should_attempt("portal.example"));
    }

    #[test]
    fn domains_are_tracked_independently() {
        let board = DomainHealthBoard::new(1);
        board.record_failure("down.example", "connection refused");
        assert!(!board.should_attempt("down.example"));
        assert!(board.should_attempt("up.example"));
    }

    #[test]
    fn extract_domain_basics() {
        assert_eq!(
            extract_domain("https://portal.example/events?page=2").expect("parses"),
            "portal.example"
        );
        assert!(extract_domain("not a url").is_err());
    }
}
