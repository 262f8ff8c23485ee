//! Browser session management
//!
//! Handles launching and controlling the single Chromium instance used for a
//! run. All DOM work goes through CDP via chromiumoxide.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, GetCookiesParams, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::BrowserError;

/// Find Chrome/Chromium executable on the system
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for a browser session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// User data directory
    pub user_data_dir: Option<String>,
    /// Default JavaScript/navigation timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            timeout_secs: 30,
            window_width: 1440,
            window_height: 900,
        }
    }
}

impl BrowserSessionConfig {
    /// Create config with a fresh per-run data directory
    pub fn for_run() -> Self {
        let base = std::env::temp_dir().join("trackfill").join("browser_data");
        let user_data_dir = base
            .join(uuid::Uuid::new_v4().to_string())
            .to_string_lossy()
            .to_string();

        Self {
            user_data_dir: Some(user_data_dir),
            ..Default::default()
        }
    }

    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set window size
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_width = width;
        self.window_height = height;
        self
    }
}

/// A saved browser cookie, the persistable subset of the CDP cookie
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Unix seconds; -1 for session cookies
    pub expires: f64,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
}

/// The browser session for one run: the launched Chromium plus its only page.
///
/// Owned explicitly and passed by reference to the flows; there is no global
/// instance.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    config: BrowserSessionConfig,
    alive: Arc<AtomicBool>,
}

impl BrowserSession {
    /// Reuse an existing live session or launch a new one.
    pub async fn obtain(
        config: BrowserSessionConfig,
        existing: Option<BrowserSession>,
    ) -> Result<Self, BrowserError> {
        if let Some(session) = existing {
            if session.is_alive() {
                debug!("Reusing existing browser session");
                return Ok(session);
            }
            warn!("Existing browser session is dead, launching a new one");
            let _ = session.close().await;
        }
        Self::launch(config).await
    }

    /// Launch a new browser session with the given config
    pub async fn launch(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        info!("Launching browser (headless: {})", config.headless);

        // Check that Chrome is available before attempting launch
        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "Chrome/Chromium not found. Install it or set TRACKFILL_CHROME.".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();

        if config.headless {
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            info!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        if let Some(ref dir) = config.user_data_dir {
            let _ = std::fs::create_dir_all(dir);
            builder = builder.user_data_dir(dir);
        }

        builder = builder
            .arg("--no-default-browser-check")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .arg("--disable-save-password-bubble")
            // No "restore tabs" prompt when reusing a data dir
            .arg("--disable-session-crashed-bubble")
            .arg("--disable-restore-session-state")
            // Required when running as root (e.g., in a container)
            .arg("--no-sandbox")
            .window_size(config.window_width, config.window_height);

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Spawn handler in background; when it ends, Chrome has disconnected
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
            warn!("Chrome disconnected (event handler ended)");
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with a blank tab; take it as our page and close extras
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };

            for extra_page in pages {
                debug!("Closing extra blank tab");
                let _ = extra_page.close().await;
            }

            main_page
        };

        info!("Browser session created");

        Ok(Self {
            browser,
            page,
            config,
            alive,
        })
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Default timeout for JavaScript and navigation waits
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    /// Wait for the current navigation to complete
    pub async fn wait_for_navigation(&self, timeout_secs: u64) -> Result<(), BrowserError> {
        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.page.wait_for_navigation(),
        )
        .await
        .map_err(|_| BrowserError::Timeout("Navigation timeout".into()))?
        .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    /// Execute JavaScript on the page with the default timeout
    pub async fn execute_js(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.execute_js_with_timeout(script, self.config.timeout_secs)
            .await
    }

    /// Execute JavaScript on the page with a custom timeout (in seconds)
    pub async fn execute_js_with_timeout(
        &self,
        script: &str,
        timeout_secs: u64,
    ) -> Result<serde_json::Value, BrowserError> {
        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.page.evaluate(script),
        )
        .await
        .map_err(|_| {
            BrowserError::Timeout(format!(
                "JavaScript execution timed out after {}s",
                timeout_secs
            ))
        })?
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    /// Get current URL
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("No URL".into()))
    }

    /// Click on an element by selector
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Click an element and type text into it
    pub async fn type_text(&self, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Press a key (e.g. "Enter", "Escape") on an element
    pub async fn press_key(&self, selector: &str, key: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;

        element
            .press_key(key)
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(())
    }

    /// Read all cookies visible to the current page
    pub async fn get_cookies(&self) -> Result<Vec<SavedCookie>, BrowserError> {
        let resp = self
            .page
            .execute(GetCookiesParams::default())
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;

        let cookies = resp
            .result
            .cookies
            .iter()
            .map(|c| SavedCookie {
                name: c.name.clone(),
                value: c.value.clone(),
                domain: c.domain.clone(),
                path: c.path.clone(),
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
                same_site: c.same_site.as_ref().map(|s| {
                    match s {
                        CookieSameSite::Strict => "Strict",
                        CookieSameSite::Lax => "Lax",
                        CookieSameSite::None => "None",
                    }
                    .to_string()
                }),
            })
            .collect();

        Ok(cookies)
    }

    /// Install saved cookies into the browser
    pub async fn set_cookies(&self, cookies: &[SavedCookie]) -> Result<(), BrowserError> {
        let mut params = Vec::with_capacity(cookies.len());
        for c in cookies {
            let mut builder = CookieParam::builder()
                .name(c.name.clone())
                .value(c.value.clone())
                .domain(c.domain.clone())
                .path(c.path.clone())
                .secure(c.secure)
                .http_only(c.http_only);

            // -1 marks a session cookie; CDP treats an absent expiry the same
            if c.expires >= 0.0 {
                builder = builder.expires(TimeSinceEpoch::new(c.expires));
            }
            if let Some(ref same_site) = c.same_site {
                let mapped = match same_site.as_str() {
                    "Strict" => Some(CookieSameSite::Strict),
                    "Lax" => Some(CookieSameSite::Lax),
                    "None" => Some(CookieSameSite::None),
                    _ => None,
                };
                if let Some(mapped) = mapped {
                    builder = builder.same_site(mapped);
                }
            }

            params.push(builder.build().map_err(BrowserError::JavaScriptError)?);
        }

        debug!("Installing {} saved cookies", params.len());
        self.page
            .execute(SetCookiesParams::new(params))
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;

        Ok(())
    }

    /// Capture the current origin's localStorage as key/value pairs
    pub async fn get_local_storage(&self) -> Result<Vec<(String, String)>, BrowserError> {
        let result = self
            .execute_js("JSON.stringify(Object.entries(window.localStorage))")
            .await?;

        let Some(raw) = result.as_str() else {
            return Ok(Vec::new());
        };

        serde_json::from_str(raw)
            .map_err(|e| BrowserError::JavaScriptError(format!("localStorage decode: {}", e)))
    }

    /// Seed localStorage entries on the current origin
    pub async fn set_local_storage(&self, entries: &[(String, String)]) -> Result<(), BrowserError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut script = String::from("(function() {\n");
        for (key, value) in entries {
            // serde_json produces valid JS string literals
            script.push_str(&format!(
                "    window.localStorage.setItem({}, {});\n",
                serde_json::to_string(key).unwrap_or_default(),
                serde_json::to_string(value).unwrap_or_default(),
            ));
        }
        script.push_str("    return true;\n})()");

        self.execute_js(&script).await?;
        Ok(())
    }

    /// Capture a full-page screenshot into the state directory.
    ///
    /// Returns the path of the written file.
    pub async fn capture_screenshot(&self, label: &str) -> Result<PathBuf, BrowserError> {
        let dir = crate::state_dir()
            .map(|p| p.join("screenshots"))
            .ok_or_else(|| BrowserError::IoError(std::io::Error::other("no state directory")))?;
        std::fs::create_dir_all(&dir)?;

        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!("{}-{}.png", stamp, label));

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();

        self.page
            .save_screenshot(params, &path)
            .await
            .map_err(|e| BrowserError::JavaScriptError(format!("screenshot failed: {}", e)))?;

        info!("Screenshot saved to {}", path.display());
        Ok(path)
    }

    /// Close the browser session
    pub async fn close(mut self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::Relaxed);

        let _ = self.page.close().await;

        // Graceful close first, then make sure the child process is gone
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;

        info!("Browser session closed");
        Ok(())
    }
}
