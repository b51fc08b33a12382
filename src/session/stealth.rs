//! Anti-detection configuration applied at session creation.
//!
//! A [`StealthProfile`] is randomized per session: user-agent drawn from a
//! pool, viewport dimensions, hardware concurrency, and a canvas noise
//! seed. The evasion scripts are injected via CDP so they run before any
//! page script on every new document.

use anyhow::Result;
use chromiumoxide::{Page, cdp};
use rand::Rng;
use rand::prelude::IndexedRandom;
use tracing::{debug, warn};

use crate::utils::constants::{USER_AGENTS, VIEWPORT_HEIGHT_RANGE, VIEWPORT_WIDTH_RANGE};

/// Fingerprint surface presented by one session.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
    pub languages: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub hardware_concurrency: u32,
    /// Seed for deterministic per-session canvas noise
    pub session_seed: String,
}

impl StealthProfile {
    /// Draw a randomized profile for a new session.
    #[must_use]
    pub fn randomized() -> Self {
        let mut rng = rand::rng();
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();
        let platform = if user_agent.contains("Macintosh") {
            "MacIntel"
        } else if user_agent.contains("X11") {
            "Linux x86_64"
        } else {
            "Win32"
        };
        let seed: [u8; 16] = rng.random();

        Self {
            user_agent,
            accept_language: "en-US,en;q=0.9".to_string(),
            platform: platform.to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
            viewport_width: rng.random_range(VIEWPORT_WIDTH_RANGE.0..=VIEWPORT_WIDTH_RANGE.1),
            viewport_height: rng.random_range(VIEWPORT_HEIGHT_RANGE.0..=VIEWPORT_HEIGHT_RANGE.1),
            webgl_vendor: "Intel Inc.".to_string(),
            webgl_renderer: "Intel(R) UHD Graphics".to_string(),
            hardware_concurrency: *[4u32, 8, 8, 12, 16].choose(&mut rng).unwrap_or(&8),
            session_seed: hex::encode(seed),
        }
    }
}

// Order matters: the shared config object must exist before any evasion
// script reads it.
const EVASIONS: &[(&str, &str)] = &[
    ("navigator_webdriver", NAVIGATOR_WEBDRIVER_JS),
    ("navigator_languages", NAVIGATOR_LANGUAGES_JS),
    ("navigator_plugins", NAVIGATOR_PLUGINS_JS),
    ("navigator_permissions", NAVIGATOR_PERMISSIONS_JS),
    ("hardware_concurrency", HARDWARE_CONCURRENCY_JS),
    ("chrome_runtime", CHROME_RUNTIME_JS),
    ("webgl_vendor", WEBGL_VENDOR_JS),
    ("canvas_noise", CANVAS_NOISE_JS),
];

const NAVIGATOR_WEBDRIVER_JS: &str = r"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
";

const NAVIGATOR_LANGUAGES_JS: &str = r"
    Object.defineProperty(navigator, 'language', {
        get: () => window.__ehConfig.language
    });
    Object.defineProperty(navigator, 'languages', {
        get: () => window.__ehConfig.languages
    });
";

const NAVIGATOR_PLUGINS_JS: &str = r"
    const mockPlugins = [
        {
            name: 'Chrome PDF Plugin',
            description: 'Portable Document Format',
            filename: 'internal-pdf-viewer',
            mimeTypes: [{ type: 'application/pdf', description: 'Portable Document Format' }]
        },
        {
            name: 'Chrome PDF Viewer',
            description: '',
            filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai',
            mimeTypes: [{ type: 'application/pdf', description: 'Portable Document Format' }]
        },
        {
            name: 'Native Client',
            description: '',
            filename: 'internal-nacl-plugin',
            mimeTypes: []
        }
    ];
    const pluginsProto = Object.getPrototypeOf(navigator.plugins);
    Object.defineProperty(navigator, 'plugins', {
        get: () => {
            const plugins = {};
            mockPlugins.forEach((plugin, i) => {
                plugins[i] = plugin;
                plugins[plugin.name] = plugin;
            });
            Object.setPrototypeOf(plugins, pluginsProto);
            Object.defineProperty(plugins, 'length', { value: mockPlugins.length });
            return plugins;
        }
    });
";

const NAVIGATOR_PERMISSIONS_JS: &str = r"
    const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
    window.navigator.permissions.query = (parameters) =>
        parameters && parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters);
";

const HARDWARE_CONCURRENCY_JS: &str = r"
    Object.defineProperty(navigator, 'hardwareConcurrency', {
        get: () => window.__ehConfig.hardwareConcurrency
    });
";

const CHROME_RUNTIME_JS: &str = r"
    if (!window.chrome) {
        window.chrome = {};
    }
    if (!window.chrome.runtime) {
        window.chrome.runtime = {
            connect: () => ({
                onMessage: { addListener: () => {}, removeListener: () => {} },
                postMessage: () => {}
            })
        };
    }
";

const WEBGL_VENDOR_JS: &str = r"
    const getParameterProxyHandler = {
        apply: function(target, ctx, args) {
            const param = (args && args[0]) || null;
            // UNMASKED_VENDOR_WEBGL
            if (param === 37445) {
                return window.__ehConfig.webglVendor;
            }
            // UNMASKED_RENDERER_WEBGL
            if (param === 37446) {
                return window.__ehConfig.webglRenderer;
            }
            return Reflect.apply(target, ctx, args);
        }
    };
    if (window.WebGLRenderingContext) {
        const getParameter = WebGLRenderingContext.prototype.getParameter;
        WebGLRenderingContext.prototype.getParameter = new Proxy(getParameter, getParameterProxyHandler);
    }
";

// Deterministic per-session noise: XOR the low bit of each pixel with a
// byte drawn from the session seed, so repeated reads within a session
// agree with each other but differ across sessions.
const CANVAS_NOISE_JS: &str = r"
    const seed = window.__ehConfig.sessionSeed || '00';
    const seedBytes = [];
    for (let i = 0; i < seed.length; i += 2) {
        seedBytes.push(parseInt(seed.substr(i, 2), 16) || 0);
    }
    const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
    HTMLCanvasElement.prototype.toDataURL = function(type) {
        if (this.width <= 16 && this.height <= 16) {
            return originalToDataURL.apply(this, arguments);
        }
        const context = this.getContext('2d');
        if (context) {
            const imageData = context.getImageData(0, 0, this.width, this.height);
            for (let i = 0; i < imageData.data.length; i += 4) {
                imageData.data[i] = imageData.data[i] ^ (seedBytes[(i / 4) % seedBytes.length] & 1);
            }
            context.putImageData(imageData, 0, 0);
        }
        return originalToDataURL.apply(this, arguments);
    };
";

/// Inject the stealth configuration and evasion scripts into a page.
///
/// Fails only when no script at all could be injected; individual script
/// failures are logged and tolerated.
pub async fn inject(page: &Page, profile: &StealthProfile) -> Result<()> {
    debug!("injecting stealth scripts");

    // The shared config object must land before any evasion script runs
    let config_js = format!(
        r#"
        window.__ehConfig = {{
            language: "{}",
            languages: {},
            platform: "{}",
            webglVendor: "{}",
            webglRenderer: "{}",
            hardwareConcurrency: {},
            sessionSeed: "{}"
        }};
        "#,
        profile.languages.first().map(String::as_str).unwrap_or("en-US"),
        serde_json::to_string(&profile.languages).unwrap_or_else(|_| "[]".to_string()),
        profile.platform,
        profile.webgl_vendor,
        profile.webgl_renderer,
        profile.hardware_concurrency,
        profile.session_seed,
    );

    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source: config_js,
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await?;

    let mut injected = 0;
    for (name, source) in EVASIONS {
        let result = page
            .execute(
                cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
                    source: (*source).to_string(),
                    include_command_line_api: None,
                    world_name: None,
                    run_immediately: None,
                },
            )
            .await;
        match result {
            Ok(_) => injected += 1,
            Err(e) => warn!(script = name, error = %e, "failed to inject evasion script"),
        }
    }

    if injected == 0 {
        return Err(anyhow::anyhow!("failed to inject any stealth scripts"));
    }

    // User agent override goes last so it reflects the final profile
    page.execute(cdp::browser_protocol::network::SetUserAgentOverrideParams {
        user_agent: profile.user_agent.clone(),
        accept_language: Some(profile.accept_language.clone()),
        platform: Some(profile.platform.clone()),
        user_agent_metadata: None,
    })
    .await?;

    debug!(injected, total = EVASIONS.len(), "stealth injection complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn randomized_profile_stays_within_ranges() {
        for _ in 0..50 {
            let profile = StealthProfile::randomized();
            assert!(USER_AGENTS.contains(&profile.user_agent.as_str()));
            assert!(
                (VIEWPORT_WIDTH_RANGE.0..=VIEWPORT_WIDTH_RANGE.1)
                    .contains(&profile.viewport_width)
            );
            assert!(
                (VIEWPORT_HEIGHT_RANGE.0..=VIEWPORT_HEIGHT_RANGE.1)
                    .contains(&profile.viewport_height)
            );
            assert_eq!(profile.session_seed.len(), 32);
        }
    }

    #[test]
    fn platform_matches_user_agent_family() {
        for _ in 0..50 {
            let profile = StealthProfile::randomized();
            if profile.user_agent.contains("Macintosh") {
                assert_eq!(profile.platform, "MacIntel");
            } else if profile.user_agent.contains("X11") {
                assert_eq!(profile.platform, "Linux x86_64");
            } else {
                assert_eq!(profile.platform, "Win32");
            }
        }
    }
}
