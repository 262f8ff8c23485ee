//! Trackfill
//!
//! A single-operator CLI that fills and submits issue-tracker tickets through
//! a real Chromium browser: restores or persists login session state across
//! runs and populates the multi-field creation form from templates and cached
//! dropdown option lists.

pub mod browser;
pub mod flow;
pub mod prompt;
pub mod store;
pub mod template;

use std::path::PathBuf;
use tracing::{error, info, warn};

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Identity e-mail entered on the login page
    pub account_email: String,
    /// Tracker base URL
    pub base_url: String,
    /// Dashboard URL reached after successful authentication
    pub dashboard_url: String,

    /// Path to Chrome/Chromium executable (auto-detected when unset)
    #[serde(default)]
    pub chrome_path: Option<String>,
    /// Run the browser headless
    #[serde(default)]
    pub headless: bool,

    /// Window width
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    /// Window height
    #[serde(default = "default_window_height")]
    pub window_height: u32,

    /// Per-element wait when locating form fields, in seconds
    #[serde(default = "default_element_wait")]
    pub element_wait_secs: u64,
    /// How long to wait for the out-of-band login confirmation, in seconds
    #[serde(default = "default_login_wait")]
    pub login_wait_secs: u64,
}

fn default_window_width() -> u32 {
    1440
}
fn default_window_height() -> u32 {
    900
}
fn default_element_wait() -> u64 {
    4
}
fn default_login_wait() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            account_email: "operator@corp.example".to_string(),
            base_url: "https://tracker.corp.example".to_string(),
            dashboard_url: "https://tracker.corp.example/dashboard".to_string(),
            chrome_path: None,
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            element_wait_secs: default_element_wait(),
            login_wait_secs: default_login_wait(),
        }
    }
}

/// Get the state directory (config, session state, caches, screenshots)
pub fn state_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("trackfill"))
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    state_dir().map(|p| p.join("logs"))
}

impl AppConfig {
    /// Get config file path
    fn config_path() -> Option<PathBuf> {
        state_dir().map(|p| p.join("config.json"))
    }

    /// Load config from file, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env_overrides();
        config
    }

    fn load_file() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(content) => match serde_json::from_str(&content) {
                        Ok(config) => {
                            info!("Loaded config from {:?}", path);
                            return config;
                        }
                        Err(e) => {
                            warn!("Failed to parse config file: {}", e);
                        }
                    },
                    Err(e) => {
                        warn!("Failed to read config file: {}", e);
                    }
                }
            }
        }
        Self::default()
    }

    /// Apply `TRACKFILL_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(email) = std::env::var("TRACKFILL_EMAIL") {
            if !email.is_empty() {
                self.account_email = email;
            }
        }
        if let Ok(base) = std::env::var("TRACKFILL_BASE_URL") {
            if !base.is_empty() {
                self.base_url = base;
            }
        }
        if let Ok(dashboard) = std::env::var("TRACKFILL_DASHBOARD_URL") {
            if !dashboard.is_empty() {
                self.dashboard_url = dashboard;
            }
        }
        if let Ok(chrome) = std::env::var("TRACKFILL_CHROME") {
            if !chrome.is_empty() {
                self.chrome_path = Some(chrome);
            }
        }
        if let Ok(headless) = std::env::var("TRACKFILL_HEADLESS") {
            self.headless = matches!(headless.as_str(), "1" | "true" | "yes");
        }
    }

    /// Save config to file
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }

            match serde_json::to_string_pretty(self) {
                Ok(content) => {
                    if let Err(e) = std::fs::write(&path, content) {
                        error!("Failed to save config: {}", e);
                    } else {
                        info!("Config saved to {:?}", path);
                    }
                }
                Err(e) => {
                    error!("Failed to serialize config: {}", e);
                }
            }
        }
    }
}

/// Initialize logging (console layer plus daily-rolling file layer)
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "trackfill.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert!(!config.headless);
        assert_eq!(config.element_wait_secs, 4);
        assert_eq!(config.login_wait_secs, 60);
        assert!(config.chrome_path.is_none());
    }

    #[test]
    fn test_config_parses_with_missing_optional_fields() {
        let json = r#"{
            "accountEmail": "a@b.example",
            "baseUrl": "https://t.example",
            "dashboardUrl": "https://t.example/dashboard"
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.account_email, "a@b.example");
        assert_eq!(config.window_width, 1440);
        assert_eq!(config.login_wait_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("TRACKFILL_EMAIL", "override@corp.example");
        std::env::set_var("TRACKFILL_HEADLESS", "true");

        let mut config = AppConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.account_email, "override@corp.example");
        assert!(config.headless);

        std::env::remove_var("TRACKFILL_EMAIL");
        std::env::remove_var("TRACKFILL_HEADLESS");
    }
}
