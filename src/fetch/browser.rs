//! Session fetcher for script-rendered and social pages.
//!
//! Drives a browser session to load the page, waits for dynamic content,
//! and paginates feed-like structures by scrolling until the page height
//! stops growing or the scroll budget is exhausted. Social pages get the
//! login flow first; an authentication hard-failure invalidates the
//! session and is terminal for the source after one re-login attempt.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::Page;
use tracing::{debug, warn};
use url::Url;

use crate::config::HarvestConfig;
use crate::session::{SessionError, SessionGuard, SessionManager};
use crate::sources::{Source, SourceKind};

use super::{Fetch, FetchError, RawContent};

/// Fetcher that drives a [`SessionManager`] session per request.
pub struct SessionFetcher {
    manager: Arc<SessionManager>,
    max_scrolls: u32,
    scroll_pause: Duration,
    page_load_timeout: Duration,
}

impl SessionFetcher {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>, config: &HarvestConfig) -> Self {
        Self {
            manager,
            max_scrolls: config.max_scrolls(),
            scroll_pause: config.scroll_pause(),
            page_load_timeout: config.page_load_timeout(),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    async fn fetch_with_session(&self, source: &Source) -> Result<RawContent, FetchError> {
        let mut guard = self.manager.acquire().await.map_err(map_session_error)?;

        if source.kind == SourceKind::SocialPage {
            guard = self.ensure_social_login(guard, source).await?;
        }

        let target = match source.kind {
            SourceKind::SocialPage => events_feed_url(&source.url),
            SourceKind::Website => source.url.clone(),
        };

        let page = guard.new_stealth_page().await.map_err(map_session_error)?;
        let result = self.load_and_snapshot(&page, &target, source).await;
        let _ = page.close().await;
        result
    }

    /// Log in for a social source, retrying once through an invalidated
    /// fresh session before reporting a terminal authentication failure.
    async fn ensure_social_login(
        &self,
        mut guard: SessionGuard,
        source: &Source,
    ) -> Result<SessionGuard, FetchError> {
        let origin = origin_of(&source.url)
            .ok_or_else(|| FetchError::terminal(format!("malformed URL: {}", source.url)))?;

        match self.manager.ensure_logged_in(&mut guard, &origin).await {
            Ok(()) => Ok(guard),
            Err(SessionError::Authentication(reason)) => {
                warn!(source = source.id, reason, "login failed, invalidating and retrying once");
                let identity = Url::parse(&origin)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));
                if let Some(identity) = identity {
                    self.manager.invalidate_identity(&identity).await;
                }

                // Free the pool slot before acquiring the replacement, or a
                // single-session pool would wait on itself
                guard.discard().await;
                let mut fresh = self.manager.acquire().await.map_err(map_session_error)?;

                match self.manager.ensure_logged_in(&mut fresh, &origin).await {
                    Ok(()) => Ok(fresh),
                    Err(SessionError::Authentication(reason)) => {
                        fresh.discard().await;
                        Err(FetchError::terminal(format!(
                            "authentication failed after re-login: {reason}"
                        )))
                    }
                    Err(other) => Err(map_session_error(other)),
                }
            }
            Err(other) => Err(map_session_error(other)),
        }
    }

    async fn load_and_snapshot(
        &self,
        page: &Page,
        url: &str,
        source: &Source,
    ) -> Result<RawContent, FetchError> {
        debug!(source = source.id, url, "session fetch");

        tokio::time::timeout(self.page_load_timeout, async {
            page.goto(url)
                .await
                .map_err(|e| FetchError::transient(format!("navigation failed: {e}")))?;
            let _ = page.wait_for_navigation().await;
            Ok::<(), FetchError>(())
        })
        .await
        .map_err(|_| FetchError::transient(format!("page load timed out: {url}")))??;

        // Let late scripts settle before the first height reading
        tokio::time::sleep(self.scroll_pause).await;

        let scrolls = self.scroll_until_stable(page).await?;
        debug!(source = source.id, scrolls, "feed pagination finished");

        let html = page
            .content()
            .await
            .map_err(|e| FetchError::transient(format!("failed to capture DOM: {e}")))?;

        Ok(RawContent::new(&source.id, html))
    }

    /// Scroll the page until its height stops growing or the budget runs
    /// out. Returns the number of scroll steps taken.
    async fn scroll_until_stable(&self, page: &Page) -> Result<u32, FetchError> {
        let mut last_height = page_height(page).await?;
        let mut scrolls = 0;

        for _ in 0..self.max_scrolls {
            page.evaluate("window.scrollTo(0, document.body.scrollHeight);")
                .await
                .map_err(|e| FetchError::transient(format!("scroll failed: {e}")))?;
            tokio::time::sleep(self.scroll_pause).await;

            let height = page_height(page).await?;
            if height == last_height {
                break;
            }
            last_height = height;
            scrolls += 1;
        }

        Ok(scrolls)
    }
}

impl Fetch for SessionFetcher {
    async fn fetch(&self, source: &Source) -> Result<RawContent, FetchError> {
        self.fetch_with_session(source).await
    }
}

async fn page_height(page: &Page) -> Result<i64, FetchError> {
    page.evaluate("document.body.scrollHeight")
        .await
        .map_err(|e| FetchError::transient(format!("height probe failed: {e}")))?
        .into_value::<i64>()
        .map_err(|e| FetchError::transient(format!("height probe returned non-number: {e}")))
}

fn map_session_error(err: SessionError) -> FetchError {
    match err {
        SessionError::Authentication(reason) => {
            FetchError::terminal(format!("authentication failed: {reason}"))
        }
        SessionError::RuntimeUnavailable(reason) => {
            // Surfaced to the dispatcher as terminal; the dispatcher also
            // checks the manager flag and aborts the whole run
            FetchError::terminal(format!("browser runtime unavailable: {reason}"))
        }
        SessionError::ShutDown => FetchError::terminal("session manager shut down"),
        SessionError::Driver(reason) => FetchError::transient(reason),
    }
}

/// Map a social page URL to its events feed, mirroring the `/events` tab
/// convention of social platforms.
fn events_feed_url(page_url: &str) -> String {
    let trimmed = page_url.trim_end_matches('/');
    if trimmed.contains("/events") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/events")
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_feed_url_appends_tab() {
        assert_eq!(
            events_feed_url("https://social.example/crete-jazz/"),
            "https://social.example/crete-jazz/events"
        );
    }

    #[test]
    fn events_feed_url_is_idempotent() {
        assert_eq!(
            events_feed_url("https://social.example/crete-jazz/events"),
            "https://social.example/crete-jazz/events"
        );
    }

    #[test]
    fn session_errors_classify_for_retry() {
        assert!(map_session_error(SessionError::Driver("page crash".into())).is_transient());
        assert!(!map_session_error(SessionError::Authentication("denied".into())).is_transient());
        assert!(
            !map_session_error(SessionError::RuntimeUnavailable("no chrome".into()))
                .is_transient()
        );
    }
}
