//! Shared configuration constants for eventharvest
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default cache freshness window: 24 hours
///
/// A source fetched within this window is served from cache instead of
/// being re-fetched. Event listings rarely change more than once a day.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

/// Default maximum fetch attempts per source (first try + retries)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base backoff delay in milliseconds
///
/// Attempt k waits `base * 2^(k-1)` plus jitter, capped at
/// [`DEFAULT_MAX_BACKOFF_MS`].
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 3_000;

/// Default backoff cap in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 60_000;

/// Default jitter window added on top of each backoff delay
pub const DEFAULT_JITTER_MS: u64 = 1_000;

/// Default health-check probe timeout in seconds
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

/// Default timeout for a single lightweight fetch attempt
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// Default timeout for a single browser page load
pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 30;

/// Politeness delay bounds between lightweight requests, in seconds.
/// The actual delay is drawn uniformly from this range.
pub const DEFAULT_MIN_FETCH_DELAY_SECS: u64 = 3;
pub const DEFAULT_MAX_FETCH_DELAY_SECS: u64 = 10;

/// Default bounded worker count for the dispatcher
pub const DEFAULT_WORKERS: usize = 5;

/// Consecutive failures within one run before a domain is skipped
pub const DEFAULT_DOMAIN_FAILURE_THRESHOLD: u32 = 5;

/// Scroll budget for feed-style pages driven through a browser session
pub const DEFAULT_MAX_SCROLLS: u32 = 10;

/// Pause between scroll steps in milliseconds
pub const DEFAULT_SCROLL_PAUSE_MS: u64 = 2_000;

/// Composite similarity threshold for cross-source dedup, inclusive
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Minimum fraction of active sources that must succeed (or be served
/// from cache) for a run to be reported as an overall success
pub const DEFAULT_MIN_SUCCESS_FRACTION: f64 = 0.5;

/// Default timezone attached to events whose source does not carry one
pub const DEFAULT_TIMEZONE: &str = "Europe/Athens";

/// Default venue country when the source does not carry one
pub const DEFAULT_COUNTRY: &str = "Greece";

/// Title length bounds for a valid event
pub const MIN_TITLE_LEN: usize = 5;
pub const MAX_TITLE_LEN: usize = 200;

/// Maximum slug length derived from an event title
pub const MAX_SLUG_LEN: usize = 100;

/// User-agent pool for randomized session and request fingerprints.
///
/// Updated: 2025-06 to current stable Chrome/Firefox/Safari builds.
/// Chrome releases new stable versions ~every 4 weeks; refresh quarterly
/// to stay within a plausible version window.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

/// Viewport dimension ranges for randomized sessions
pub const VIEWPORT_WIDTH_RANGE: (u32, u32) = (1366, 1920);
pub const VIEWPORT_HEIGHT_RANGE: (u32, u32) = (768, 1080);
