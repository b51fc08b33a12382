//! Fetching: the capability of turning a source into raw page content.
//!
//! Two fetchers implement the same seam: the lightweight HTTP fetcher for
//! static pages and the session fetcher for script-rendered or social
//! pages. Which one a source gets is decided by [`choose_fetcher`], a pure
//! function over the source's method hint and an optional structural probe
//! of a lightweight fetch.

pub mod browser;
pub mod http;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};

use crate::sources::{FetchMethod, Source, SourceKind};

pub use browser::SessionFetcher;
pub use http::HttpFetcher;

/// Raw page content produced by a fetcher and consumed by the normalizer.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub source_id: String,
    pub html: String,
    pub fetched_at: DateTime<Utc>,
    /// URL after redirects, when it differs from the source URL
    pub final_url: Option<String>,
}

impl RawContent {
    #[must_use]
    pub fn new(source_id: impl Into<String>, html: String) -> Self {
        Self {
            source_id: source_id.into(),
            html,
            fetched_at: Utc::now(),
            final_url: None,
        }
    }
}

/// Whether a failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeouts, connection resets, rate limits, transient server errors
    Transient,
    /// Malformed URLs, gone resources, authentication hard-failures
    Terminal,
}

/// A failed fetch attempt, classified for the retry controller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub reason: String,
}

impl FetchError {
    #[must_use]
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn terminal(reason: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Terminal,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }

    /// Classify an HTTP status into a fetch error, or `None` for success.
    ///
    /// 429 and 5xx are transient; 404/410 and the remaining 4xx family are
    /// terminal: a not-found or forbidden source will not recover within
    /// one run.
    #[must_use]
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=399 => None,
            429 => Some(Self::transient(format!("HTTP {status}: rate limited"))),
            500..=599 => Some(Self::transient(format!("HTTP {status}: server error"))),
            404 | 410 => Some(Self::terminal(format!("HTTP {status}: gone"))),
            _ => Some(Self::terminal(format!("HTTP {status}"))),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || (err.is_request() && err.status().is_none()) {
            Self::transient(format!("network error: {err}"))
        } else if err.is_builder() {
            Self::terminal(format!("malformed request: {err}"))
        } else {
            Self::transient(format!("http error: {err}"))
        }
    }
}

/// The capability both fetchers provide.
pub trait Fetch {
    fn fetch(
        &self,
        source: &Source,
    ) -> impl std::future::Future<Output = Result<RawContent, FetchError>> + Send;
}

/// Which fetcher a source resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherChoice {
    Lightweight,
    Session,
}

/// Structural summary of a lightweight fetch, used to resolve `Auto`
/// method hints. Captures whether the static HTML already contains event
/// listing structure or only script-rendered scaffolding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuralProbe {
    /// Listing structure visible without script execution: JSON-LD event
    /// blocks, event/listing-classed containers
    pub listing_markers: usize,
    /// Signs the page is rendered client-side: bare root mounts, noscript
    /// warnings
    pub script_markers: usize,
    /// Visible body text length after parsing
    pub body_text_len: usize,
}

impl StructuralProbe {
    /// Minimum visible text for static HTML to be considered complete.
    const MIN_BODY_TEXT: usize = 200;

    #[must_use]
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let jsonld = Selector::parse(r#"script[type="application/ld+json"]"#)
            .expect("valid selector");
        let containers = Selector::parse(
            r#"[class*="event"], [class*="listing"], [itemtype*="Event"], article"#,
        )
        .expect("valid selector");
        let mounts = Selector::parse("div#app, div#root, div#__next").expect("valid selector");
        let noscript = Selector::parse("noscript").expect("valid selector");
        let body = Selector::parse("body").expect("valid selector");

        let listing_markers = document.select(&jsonld).count() + document.select(&containers).count();
        let script_markers = document.select(&mounts).count() + document.select(&noscript).count();
        let body_text_len = document
            .select(&body)
            .next()
            .map(|b| b.text().map(str::len).sum())
            .unwrap_or(0);

        Self {
            listing_markers,
            script_markers,
            body_text_len,
        }
    }

    /// True when the static HTML already carries enough listing structure
    /// to be worth normalizing without a browser.
    #[must_use]
    pub fn is_structurally_complete(&self) -> bool {
        self.listing_markers > 0 && self.body_text_len >= Self::MIN_BODY_TEXT
    }
}

/// Resolve a source's fetch method hint into a concrete fetcher choice.
///
/// Pure function: social pages always take a session; explicit hints map
/// directly; `Auto` consults the probe and falls back to the session
/// fetcher when the probe is absent or ambiguous.
#[must_use]
pub fn choose_fetcher(
    method: FetchMethod,
    kind: SourceKind,
    probe: Option<&StructuralProbe>,
) -> FetcherChoice {
    if kind == SourceKind::SocialPage {
        return FetcherChoice::Session;
    }
    match method {
        FetchMethod::Lightweight => FetcherChoice::Lightweight,
        FetchMethod::Browser => FetcherChoice::Session,
        FetchMethod::Auto => match probe {
            Some(p) if p.is_structurally_complete() => FetcherChoice::Lightweight,
            _ => FetcherChoice::Session,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_probe() -> StructuralProbe {
        StructuralProbe {
            listing_markers: 3,
            script_markers: 0,
            body_text_len: 4_000,
        }
    }

    fn hollow_probe() -> StructuralProbe {
        StructuralProbe {
            listing_markers: 0,
            script_markers: 2,
            body_text_len: 40,
        }
    }

    #[test]
    fn social_pages_always_use_session() {
        for method in [FetchMethod::Lightweight, FetchMethod::Browser, FetchMethod::Auto] {
            assert_eq!(
                choose_fetcher(method, SourceKind::SocialPage, Some(&complete_probe())),
                FetcherChoice::Session
            );
        }
    }

    #[test]
    fn explicit_hints_map_directly() {
        assert_eq!(
            choose_fetcher(FetchMethod::Lightweight, SourceKind::Website, None),
            FetcherChoice::Lightweight
        );
        assert_eq!(
            choose_fetcher(FetchMethod::Browser, SourceKind::Website, None),
            FetcherChoice::Session
        );
    }

    #[test]
    fn auto_resolves_by_probe() {
        assert_eq!(
            choose_fetcher(FetchMethod::Auto, SourceKind::Website, Some(&complete_probe())),
            FetcherChoice::Lightweight
        );
        assert_eq!(
            choose_fetcher(FetchMethod::Auto, SourceKind::Website, Some(&hollow_probe())),
            FetcherChoice::Session
        );
    }

    #[test]
    fn auto_without_probe_falls_back_to_session() {
        assert_eq!(
            choose_fetcher(FetchMethod::Auto, SourceKind::Website, None),
            FetcherChoice::Session
        );
    }

    #[test]
    fn probe_detects_listing_structure() {
        let html = r#"<html><body>
            <article class="event-card"><h3>Jazz Night</h3></article>
            <article class="event-card"><h3>Wine Tasting</h3></article>
            <p>A long description of upcoming happenings around the island,
            repeated enough to pass the visible-text floor. A long description
            of upcoming happenings around the island, repeated enough to pass
            the visible-text floor. More text to be safe about thresholds.</p>
        </body></html>"#;
        let probe = StructuralProbe::from_html(html);
        assert!(probe.listing_markers >= 2);
        assert!(probe.is_structurally_complete());
    }

    #[test]
    fn probe_detects_script_rendered_shell() {
        let html = r#"<html><body>
            <div id="root"></div>
            <noscript>Enable JavaScript to continue.</noscript>
        </body></html>"#;
        let probe = StructuralProbe::from_html(html);
        assert!(probe.script_markers >= 2);
        assert!(!probe.is_structurally_complete());
    }

    #[test]
    fn status_classification() {
        assert!(FetchError::from_status(200).is_none());
        assert!(FetchError::from_status(301).is_none());
        assert!(FetchError::from_status(429).expect("error").is_transient());
        assert!(FetchError::from_status(503).expect("error").is_transient());
        assert!(!FetchError::from_status(404).expect("error").is_transient());
        assert!(!FetchError::from_status(410).expect("error").is_transient());
        assert!(!FetchError::from_status(403).expect("error").is_transient());
    }
}
