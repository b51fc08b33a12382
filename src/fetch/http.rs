//! Lightweight HTTP fetcher for sources that render server-side.
//!
//! Issues direct requests with browser-like headers, a randomized
//! user-agent, and a jittered politeness delay between requests.

use std::time::Duration;

use rand::Rng;
use rand::prelude::IndexedRandom;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::config::HarvestConfig;
use crate::sources::Source;
use crate::utils::constants::USER_AGENTS;

use super::{Fetch, FetchError, RawContent};

/// Direct-request fetcher backed by a shared connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    min_delay: Duration,
    max_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert("DNT", HeaderValue::from_static("1"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

        let (min_delay, max_delay) = config.fetch_delay_range();
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            min_delay,
            max_delay,
        })
    }

    /// Sleep for a random interval within the configured politeness range.
    async fn politeness_delay(&self) {
        if self.max_delay.is_zero() {
            return;
        }
        let min_ms = self.min_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let wait = Duration::from_millis(rand::rng().random_range(min_ms..=max_ms));
        debug!(?wait, "politeness delay before request");
        tokio::time::sleep(wait).await;
    }

    /// Fetch a URL and return its HTML. Shared by the real fetch path and
    /// the structural probe that resolves `auto` method hints.
    pub async fn fetch_html(&self, url: &str) -> Result<(String, Option<String>), FetchError> {
        self.politeness_delay().await;

        let user_agent = USER_AGENTS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await?;

        if let Some(err) = FetchError::from_status(response.status().as_u16()) {
            return Err(err);
        }

        let final_url = (response.url().as_str() != url).then(|| response.url().to_string());
        let html = response.text().await?;
        Ok((html, final_url))
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<RawContent, FetchError> {
        debug!(source = source.id, url = source.url, "lightweight fetch");
        let (html, final_url) = self.fetch_html(&source.url).await?;
        let mut content = RawContent::new(&source.id, html);
        content.final_url = final_url;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarvestConfig;
    use crate::sources::{FetchMethod, SourceKind};

    fn fetcher() -> HttpFetcher {
        let config = HarvestConfig::builder()
            .fetch_delay_secs(0, 0)
            .build()
            .expect("valid config");
        HttpFetcher::new(&config).expect("client builds")
    }

    fn source(url: &str) -> Source {
        Source {
            id: "s1".into(),
            name: "Site".into(),
            url: url.into(),
            kind: SourceKind::Website,
            region: None,
            category: None,
            active: true,
            method: FetchMethod::Lightweight,
            priority: 0,
            health_check: None,
        }
    }

    #[tokio::test]
    async fn fetch_returns_page_html() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .with_status(200)
            .with_body("<html><body>listings</body></html>")
            .create_async()
            .await;

        let content = fetcher()
            .fetch(&source(&format!("{}/events", server.url())))
            .await
            .expect("fetch succeeds");
        assert!(content.html.contains("listings"));
        assert_eq!(content.source_id, "s1");
    }

    #[tokio::test]
    async fn rate_limit_maps_to_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .with_status(429)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&source(&format!("{}/events", server.url())))
            .await
            .expect_err("429 fails");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn not_found_maps_to_terminal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .with_status(404)
            .create_async()
            .await;

        let err = fetcher()
            .fetch(&source(&format!("{}/events", server.url())))
            .await
            .expect_err("404 fails");
        assert!(!err.is_transient());
    }
}
