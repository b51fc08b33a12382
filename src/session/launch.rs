//! Browser discovery and launch for session creation.
//!
//! Finds a system Chrome/Chromium (environment override, platform paths,
//! `which`), downloading a managed Chromium as a last resort, and launches
//! it with the session's anti-detection flags.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use super::stealth::StealthProfile;

/// Find a Chrome/Chromium executable on the system.
///
/// `CHROMIUM_PATH` overrides all other discovery.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(path = %path.display(), "using browser from CHROMIUM_PATH");
            return Ok(path);
        }
        warn!(path = %path.display(), "CHROMIUM_PATH points to a non-existent file");
    }

    let paths: Vec<&str> = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!(path = %path.display(), "found browser");
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!(path = %path.display(), "found browser via 'which'");
                    return Ok(path);
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download and cache a managed Chromium build, returning its executable.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("downloading managed Chromium browser");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("eventharvest")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("failed to fetch browser")?;

    info!(path = %revision.folder_path.display(), "downloaded Chromium");
    Ok(revision.executable_path)
}

/// Launch a browser for one session: system executable or managed
/// download, session profile directory, stealth CLI flags, and the CDP
/// handler task that drives the connection.
pub async fn launch_session_browser(
    headless: bool,
    profile_dir: PathBuf,
    stealth: &StealthProfile,
) -> Result<(Browser, JoinHandle<()>)> {
    let executable = match find_browser_executable() {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(stealth.viewport_width, stealth.viewport_height)
        .user_data_dir(profile_dir)
        .chrome_executable(executable);

    if headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={}", stealth.user_agent))
        .arg(format!("--lang={}", stealth.accept_language))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-extensions")
        .arg("--disable-software-rasterizer")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-prompt-on-repost")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let message = e.to_string();
                // Chrome emits CDP events chromiumoxide does not model;
                // their deserialization failures are noise, not faults
                let benign = message
                    .contains("data did not match any variant of untagged enum Message")
                    || message.contains("Failed to deserialize WS response");
                if benign {
                    trace!("suppressed benign CDP serialization error: {message}");
                } else {
                    error!("browser handler error: {message}");
                }
            }
        }
        trace!("browser handler task completed");
    });

    Ok((browser, handler_task))
}
