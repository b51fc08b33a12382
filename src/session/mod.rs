//! Browser session lifecycle: creation, stealth configuration, cookie
//! persistence, login, and teardown.
//!
//! Concurrency design: session-per-worker. The manager keeps a bounded
//! pool of sessions, at most one per concurrent worker slot, each with
//! an isolated profile directory. A [`SessionGuard`] is exclusive, so a
//! session is never driven by two operations at once; the persisted
//! cookie store is shared across sessions behind a `Mutex`.

pub mod cookies;
pub mod launch;
pub mod profile;
pub mod stealth;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chromiumoxide::{Browser, Page};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Credential, HarvestConfig};
use cookies::{CookieRecord, CookieStore};
use stealth::StealthProfile;

/// Session acquisition and login failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// No usable browser runtime on this machine; fatal to the run when a
    /// browser is required
    #[error("browser runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    /// Login failed after cookie restore and a fresh credential attempt
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Transient session-level failure (page crash, CDP error)
    #[error("session error: {0}")]
    Driver(String),
    /// The manager is shutting down
    #[error("session manager is shut down")]
    ShutDown,
}

/// A live browser session with its stealth fingerprint and login state.
#[derive(Debug)]
pub struct Session {
    pub id: u64,
    browser: Browser,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
    stealth: StealthProfile,
    created_at: Instant,
    last_used: Instant,
    /// Identity this session is currently logged in as, if any
    logged_in_as: Option<String>,
}

impl Session {
    #[must_use]
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    #[must_use]
    pub fn stealth(&self) -> &StealthProfile {
        &self.stealth
    }

    async fn teardown(mut self) {
        debug!(session = self.id, age = ?self.created_at.elapsed(), "tearing down session");
        if let Err(e) = self.browser.close().await {
            warn!(session = self.id, error = %e, "failed to close browser");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        profile::remove_profile_dir(&self.profile_dir);
    }
}

/// Owns session lifecycle for the whole run.
pub struct SessionManager {
    headless: bool,
    max_sessions: usize,
    page_load_timeout: Duration,
    available: Mutex<VecDeque<Session>>,
    in_use: AtomicUsize,
    next_id: AtomicU64,
    cookie_store: Mutex<CookieStore>,
    social_email: Option<Credential>,
    social_password: Option<Credential>,
    runtime_unavailable: AtomicBool,
    shutdown: AtomicBool,
}

impl SessionManager {
    pub fn new(config: &HarvestConfig) -> anyhow::Result<Arc<Self>> {
        let cookie_store = CookieStore::open(config.cookie_dir())?;
        Ok(Arc::new(Self {
            headless: config.headless(),
            max_sessions: config.max_sessions(),
            page_load_timeout: config.page_load_timeout(),
            available: Mutex::new(VecDeque::new()),
            in_use: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            cookie_store: Mutex::new(cookie_store),
            social_email: config.social_email().cloned(),
            social_password: config.social_password().cloned(),
            runtime_unavailable: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }))
    }

    /// True once a launch attempt has established that no browser runtime
    /// is usable. The dispatcher converts this into a run abort.
    #[must_use]
    pub fn runtime_unavailable(&self) -> bool {
        self.runtime_unavailable.load(Ordering::Relaxed)
    }

    /// Acquire a session, reusing a healthy pooled one or launching a new
    /// one when under the pool bound. Blocks briefly when the pool is at
    /// capacity.
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionGuard, SessionError> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(SessionError::ShutDown);
            }
            if self.runtime_unavailable() {
                return Err(SessionError::RuntimeUnavailable(
                    "previous launch attempt found no usable browser".into(),
                ));
            }

            let mut available = self.available.lock().await;
            if let Some(mut session) = available.pop_front() {
                drop(available);
                // Health check before handing out
                match session.browser.version().await {
                    Ok(_) => {
                        session.last_used = Instant::now();
                        self.in_use.fetch_add(1, Ordering::Relaxed);
                        debug!(session = session.id, "acquired pooled session");
                        return Ok(SessionGuard {
                            session: Some(session),
                            manager: Arc::clone(self),
                        });
                    }
                    Err(e) => {
                        warn!(session = session.id, error = %e, "pooled session failed health check");
                        session.teardown().await;
                        continue;
                    }
                }
            }
            drop(available);

            let total = self.in_use.load(Ordering::Relaxed) + self.available.lock().await.len();
            if total < self.max_sessions {
                let session = self.launch_session().await?;
                self.in_use.fetch_add(1, Ordering::Relaxed);
                debug!(session = session.id, "launched new session");
                return Ok(SessionGuard {
                    session: Some(session),
                    manager: Arc::clone(self),
                });
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn launch_session(&self) -> Result<Session, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stealth = StealthProfile::randomized();

        let profile = profile::SessionProfile::create()
            .map_err(|e| SessionError::Driver(format!("profile creation failed: {e:#}")))?;
        let profile_dir = profile.into_path();

        match launch::launch_session_browser(self.headless, profile_dir.clone(), &stealth).await {
            Ok((browser, handler)) => {
                let now = Instant::now();
                Ok(Session {
                    id,
                    browser,
                    handler,
                    profile_dir,
                    stealth,
                    created_at: now,
                    last_used: now,
                    logged_in_as: None,
                })
            }
            Err(e) => {
                profile::remove_profile_dir(&profile_dir);
                self.runtime_unavailable.store(true, Ordering::Relaxed);
                Err(SessionError::RuntimeUnavailable(format!("{e:#}")))
            }
        }
    }

    /// Wipe the persisted cookie snapshot for an identity, forcing a
    /// fresh login on the next acquisition.
    pub async fn invalidate_identity(&self, identity: &str) {
        let store = self.cookie_store.lock().await;
        if let Err(e) = store.invalidate(identity) {
            warn!(identity, error = %e, "failed to invalidate cookie snapshot");
        }
    }

    /// Tear down every pooled session and refuse further acquisitions.
    pub async fn shutdown(&self) {
        info!("shutting down session manager");
        self.shutdown.store(true, Ordering::Relaxed);
        let mut available = self.available.lock().await;
        while let Some(session) = available.pop_front() {
            session.teardown().await;
        }
    }

    /// Make sure a session is logged in at the social origin, restoring
    /// persisted cookies first and falling back to a credential login.
    pub async fn ensure_logged_in(
        &self,
        guard: &mut SessionGuard,
        origin: &str,
    ) -> Result<(), SessionError> {
        let identity = host_identity(origin)
            .ok_or_else(|| SessionError::Driver(format!("malformed origin: {origin}")))?;

        if guard.session().logged_in_as.as_deref() == Some(identity.as_str()) {
            return Ok(());
        }

        let page = guard.new_stealth_page().await?;
        let result = self.login_on_page(&page, origin, &identity).await;
        let _ = page.close().await;

        if result.is_ok() {
            guard.session_mut().logged_in_as = Some(identity);
        }
        result
    }

    async fn login_on_page(
        &self,
        page: &Page,
        origin: &str,
        identity: &str,
    ) -> Result<(), SessionError> {
        let snapshot = {
            let store = self.cookie_store.lock().await;
            store.load(identity)
        };

        navigate(page, origin, self.page_load_timeout).await?;

        if let Some(records) = snapshot {
            let params: Vec<_> = records.iter().filter_map(|r| r.to_param().ok()).collect();
            if !params.is_empty() {
                if let Err(e) = page.set_cookies(params).await {
                    warn!(identity, error = %e, "failed to restore cookies");
                } else {
                    navigate(page, origin, self.page_load_timeout).await?;
                    if is_logged_in(&page_text(page).await?) {
                        debug!(identity, "restored session from cookie snapshot");
                        return Ok(());
                    }
                    debug!(identity, "cookie snapshot no longer valid");
                }
            }
        }

        // Fresh credential login
        let (email, password) = match (&self.social_email, &self.social_password) {
            (Some(email), Some(password)) => (email, password),
            _ => {
                return Err(SessionError::Authentication(
                    "social credentials not configured".into(),
                ));
            }
        };

        info!(identity, "performing credential login");
        let login_url = format!("{}/login", origin.trim_end_matches('/'));
        navigate(page, &login_url, self.page_load_timeout).await?;

        let email_field = find_first(page, &["input#email", "input[name=email]"]).await?;
        email_field
            .click()
            .await
            .map_err(|e| SessionError::Driver(format!("click failed: {e}")))?;
        email_field
            .type_str(email.expose())
            .await
            .map_err(|e| SessionError::Driver(format!("typing failed: {e}")))?;

        let password_field = find_first(page, &["input#pass", "input[name=pass]", "input[type=password]"]).await?;
        password_field
            .click()
            .await
            .map_err(|e| SessionError::Driver(format!("click failed: {e}")))?;
        password_field
            .type_str(password.expose())
            .await
            .map_err(|e| SessionError::Driver(format!("typing failed: {e}")))?;
        password_field
            .press_key("Enter")
            .await
            .map_err(|e| SessionError::Driver(format!("submit failed: {e}")))?;

        tokio::time::sleep(Duration::from_secs(5)).await;

        if !is_logged_in(&page_text(page).await?) {
            return Err(SessionError::Authentication(format!(
                "login not accepted at {identity}"
            )));
        }

        // Persist the authenticated state for later runs
        match page.get_cookies().await {
            Ok(cookies) => {
                let records: Vec<CookieRecord> = cookies.iter().map(CookieRecord::from).collect();
                let store = self.cookie_store.lock().await;
                if let Err(e) = store.save(identity, &records) {
                    warn!(identity, error = %e, "failed to persist cookie snapshot");
                }
            }
            Err(e) => warn!(identity, error = %e, "failed to read cookies after login"),
        }

        info!(identity, "credential login succeeded");
        Ok(())
    }
}

/// RAII guard over an exclusively held session. Dropping it returns the
/// session to the pool; [`SessionGuard::discard`] tears it down instead.
pub struct SessionGuard {
    session: Option<Session>,
    manager: Arc<SessionManager>,
}

impl SessionGuard {
    #[must_use]
    pub fn session(&self) -> &Session {
        self.session.as_ref().expect("guard holds a session")
    }

    fn session_mut(&mut self) -> &mut Session {
        self.session.as_mut().expect("guard holds a session")
    }

    /// Open a fresh page with this session's stealth profile applied.
    pub async fn new_stealth_page(&self) -> Result<Page, SessionError> {
        let session = self.session();
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionError::Driver(format!("failed to open page: {e}")))?;
        stealth::inject(&page, &session.stealth)
            .await
            .map_err(|e| SessionError::Driver(format!("stealth injection failed: {e:#}")))?;
        Ok(page)
    }

    /// Tear the session down instead of returning it to the pool. Used
    /// when the session is detected as blocked or logged out mid-run.
    pub async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            self.manager.in_use.fetch_sub(1, Ordering::Relaxed);
            session.teardown().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            let manager = Arc::clone(&self.manager);
            manager.in_use.fetch_sub(1, Ordering::Relaxed);
            session.last_used = Instant::now();
            let id = session.id;
            tokio::spawn(async move {
                if manager.shutdown.load(Ordering::Relaxed) {
                    session.teardown().await;
                } else {
                    manager.available.lock().await.push_back(session);
                    debug!(session = id, "released session to pool");
                }
            });
        }
    }
}

async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), SessionError> {
    tokio::time::timeout(timeout, async {
        page.goto(url)
            .await
            .map_err(|e| SessionError::Driver(format!("navigation to {url} failed: {e}")))?;
        let _ = page.wait_for_navigation().await;
        Ok(())
    })
    .await
    .map_err(|_| SessionError::Driver(format!("navigation to {url} timed out")))?
}

async fn page_text(page: &Page) -> Result<String, SessionError> {
    page.content()
        .await
        .map_err(|e| SessionError::Driver(format!("failed to read page content: {e}")))
}

async fn find_first(
    page: &Page,
    selectors: &[&str],
) -> Result<chromiumoxide::element::Element, SessionError> {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await {
            return Ok(element);
        }
    }
    Err(SessionError::Authentication(format!(
        "login form not found (tried {selectors:?})"
    )))
}

/// Detect an authenticated page. Logged-in chrome carries account
/// controls; logged-out pages advertise registration instead.
fn is_logged_in(content: &str) -> bool {
    let lowered = content.to_lowercase();
    let in_markers = ["logout", "log out", "account settings", "profile_icon"];
    let out_markers = ["create new account", "sign up", "forgotten password"];

    let has_in = in_markers.iter().any(|m| lowered.contains(m));
    let has_out = out_markers.iter().any(|m| lowered.contains(m));
    has_in && !has_out
}

fn host_identity(origin: &str) -> Option<String> {
    Url::parse(origin)
        .ok()?
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_detection_markers() {
        assert!(is_logged_in("<a href=\"/logout\">Log out</a>"));
        assert!(!is_logged_in("Create new account or sign up now"));
        // Both families present means a login wall is still showing
        assert!(!is_logged_in("log out ... create new account"));
        assert!(!is_logged_in("<html><body>nothing here</body></html>"));
    }

    #[test]
    fn host_identity_normalizes_www() {
        assert_eq!(
            host_identity("https://www.social.example"),
            Some("social.example".to_string())
        );
        assert_eq!(host_identity("not a url"), None);
    }
}
