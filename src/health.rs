//! Pre-fetch reachability probe.
//!
//! A cheap, short-timeout check run before committing real fetch effort to
//! a source. On failure the dispatcher skips the source for this run; the
//! skip never counts against the retry budget and never touches session
//! state.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::HarvestConfig;
use crate::sources::{Source, SourceKind};

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Issues HEAD probes (with a minimal ranged GET fallback for servers that
/// reject HEAD) against a source before it is scheduled.
pub struct HealthChecker {
    client: Client,
    enabled: bool,
}

impl HealthChecker {
    pub fn new(config: &HarvestConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.health_timeout())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            enabled: config.health_check_enabled(),
        })
    }

    #[cfg(test)]
    fn with_client(client: Client, enabled: bool) -> Self {
        Self { client, enabled }
    }

    /// Probe one source. Websites are probed at their configured URL;
    /// social pages at their origin, since the page path itself often
    /// answers differently to logged-out probes than to a real session.
    pub async fn check(&self, source: &Source) -> HealthStatus {
        let enabled = source.health_check.unwrap_or(self.enabled);
        if !enabled {
            return HealthStatus::Healthy;
        }

        let target = match source.kind {
            SourceKind::Website => source.url.clone(),
            SourceKind::SocialPage => match origin_of(&source.url) {
                Some(origin) => origin,
                None => {
                    return HealthStatus::Unhealthy(format!("malformed URL: {}", source.url));
                }
            },
        };

        match self.probe(&target).await {
            Ok(status) if status < 400 => HealthStatus::Healthy,
            Ok(status) => HealthStatus::Unhealthy(format!("HTTP {status}")),
            Err(reason) => HealthStatus::Unhealthy(reason),
        }
    }

    async fn probe(&self, url: &str) -> Result<u16, String> {
        let head = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| format!("probe failed: {e}"))?;
        let status = head.status().as_u16();

        // Some servers reject HEAD outright; retry with a one-byte GET
        if status == 405 {
            debug!(url, "HEAD rejected, probing with ranged GET");
            let get = self
                .client
                .get(url)
                .header(reqwest::header::RANGE, "bytes=0-0")
                .send()
                .await
                .map_err(|e| format!("probe failed: {e}"))?;
            return Ok(get.status().as_u16());
        }

        Ok(status)
    }
}

/// Scheme + host portion of a URL, used for social-page reachability.
fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::FetchMethod;

    fn website(url: &str) -> Source {
        Source {
            id: "w1".into(),
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

    #[test]
    fn origin_strips_path_and_query() {
        assert_eq!(
            origin_of("https://social.example/pages/crete-events?tab=events"),
            Some("https://social.example".to_string())
        );
        assert_eq!(origin_of("not a url"), None);
    }

    #[tokio::test]
    async fn healthy_on_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/events")
            .with_status(200)
            .create_async()
            .await;

        let checker =
            HealthChecker::with_client(Client::new(), true);
        let status = checker.check(&website(&format!("{}/events", server.url()))).await;
        assert!(status.is_healthy());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unhealthy_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/events")
            .with_status(503)
            .create_async()
            .await;

        let checker = HealthChecker::with_client(Client::new(), true);
        let status = checker.check(&website(&format!("{}/events", server.url()))).await;
        assert_eq!(status, HealthStatus::Unhealthy("HTTP 503".into()));
    }

    #[tokio::test]
    async fn head_rejection_falls_back_to_ranged_get() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/events")
            .with_status(405)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/events")
            .match_header("range", "bytes=0-0")
            .with_status(206)
            .create_async()
            .await;

        let checker = HealthChecker::with_client(Client::new(), true);
        let status = checker.check(&website(&format!("{}/events", server.url()))).await;
        assert!(status.is_healthy());
        get.assert_async().await;
    }

    #[tokio::test]
    async fn per_source_override_disables_probe() {
        // No server at all: a disabled probe must not attempt the network
        let mut source = website("http://127.0.0.1:1/unreachable");
        source.health_check = Some(false);

        let checker = HealthChecker::with_client(Client::new(), true);
        assert!(checker.check(&source).await.is_healthy());
    }
}
