//! Login session persistence
//!
//! Cookies and origin storage captured after a successful login, tagged with
//! the account identity they belong to. A state file written for a different
//! account or base URL is never reused.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::browser::BrowserError;
use crate::browser::SavedCookie;

/// Serialized browser session: cookies/storage plus reuse metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub cookies: Vec<SavedCookie>,
    #[serde(default)]
    pub local_storage: Vec<(String, String)>,
    pub saved_at: DateTime<Utc>,
    pub account_email: String,
    pub base_url: String,
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

impl SessionState {
    pub fn new(
        cookies: Vec<SavedCookie>,
        local_storage: Vec<(String, String)>,
        account_email: String,
        base_url: String,
        dashboard_url: Option<String>,
    ) -> Self {
        Self {
            cookies,
            local_storage,
            saved_at: Utc::now(),
            account_email,
            base_url,
            dashboard_url,
        }
    }

    /// Whether this state was saved for the given identity.
    ///
    /// A mismatch means the file belongs to another account or instance and
    /// must be discarded outright. Expiry is deliberately NOT checked here:
    /// an old state is still offered for restore and simply falls through to
    /// a fresh login when the application rejects its cookies.
    pub fn matches_identity(&self, account_email: &str, base_url: &str) -> bool {
        self.account_email == account_email && self.base_url == base_url
    }
}

/// File-backed store for the login session
pub struct SessionStore {
    path: PathBuf,
    account_email: String,
    base_url: String,
}

impl SessionStore {
    /// Store bound to an explicit file path and identity
    pub fn new(path: PathBuf, account_email: String, base_url: String) -> Self {
        Self {
            path,
            account_email,
            base_url,
        }
    }

    /// Store at the default location in the state directory
    pub fn at_default_location(account_email: String, base_url: String) -> Option<Self> {
        crate::state_dir()
            .map(|dir| Self::new(dir.join("session_state.json"), account_email, base_url))
    }

    /// Load the saved session, if one exists and is usable.
    ///
    /// Missing file, unreadable file, parse error, and identity mismatch all
    /// yield `None`; each case only warrants a log line.
    pub fn load(&self) -> Option<SessionState> {
        if !self.path.exists() {
            info!("No saved session at {:?}", self.path);
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read session file: {}", e);
                return None;
            }
        };

        let state: SessionState = match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to parse session file: {}", e);
                return None;
            }
        };

        if !state.matches_identity(&self.account_email, &self.base_url) {
            warn!(
                "Saved session belongs to {} on {}, not {} on {} - discarding",
                state.account_email, state.base_url, self.account_email, self.base_url
            );
            return None;
        }

        info!(
            "Loaded session saved at {} ({} cookies)",
            state.saved_at,
            state.cookies.len()
        );
        Some(state)
    }

    /// Overwrite the session file, creating parent directories as needed.
    ///
    /// Write failures are logged and swallowed; the run proceeds without a
    /// persisted session.
    pub fn save(&self, state: &SessionState) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create session directory: {}", e);
                return;
            }
        }

        match serde_json::to_string_pretty(state) {
            Ok(content) => {
                if let Err(e) = std::fs::write(&self.path, content) {
                    warn!("Failed to save session: {}", e);
                } else {
                    info!("Session saved to {:?}", self.path);
                }
            }
            Err(e) => {
                warn!("Failed to serialize session: {}", e);
            }
        }
    }

    pub fn account_email(&self) -> &str {
        &self.account_email
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// Session capture lives here rather than on BrowserSession so the store owns
// the shape of what gets persisted.
impl SessionState {
    /// Capture the live browser's cookies and storage into a new state
    pub async fn capture(
        session: &crate::browser::BrowserSession,
        account_email: &str,
        base_url: &str,
        dashboard_url: Option<String>,
    ) -> Result<Self, BrowserError> {
        let cookies = session.get_cookies().await?;
        let local_storage = session.get_local_storage().await.unwrap_or_default();

        Ok(Self::new(
            cookies,
            local_storage,
            account_email.to_string(),
            base_url.to_string(),
            dashboard_url,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cookie() -> SavedCookie {
        SavedCookie {
            name: "tracker_session".to_string(),
            value: "abc123".to_string(),
            domain: ".tracker.corp.example".to_string(),
            path: "/".to_string(),
            expires: 4_102_444_800.0,
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }
    }

    fn sample_state(email: &str, base_url: &str) -> SessionState {
        SessionState::new(
            vec![sample_cookie()],
            vec![("theme".to_string(), "dark".to_string())],
            email.to_string(),
            base_url.to_string(),
            Some(format!("{}/dashboard", base_url)),
        )
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(
            dir.path().join("session_state.json"),
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );

        let state = sample_state("op@corp.example", "https://tracker.corp.example");
        store.save(&state);

        let loaded = store.load().expect("state should load back");
        assert_eq!(loaded.account_email, state.account_email);
        assert_eq!(loaded.base_url, state.base_url);
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "tracker_session");
        assert_eq!(loaded.local_storage, state.local_storage);
        assert_eq!(loaded.dashboard_url, state.dashboard_url);
    }

    #[test]
    fn test_identity_mismatch_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_state.json");

        let writer = SessionStore::new(
            path.clone(),
            "someone.else@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );
        writer.save(&sample_state(
            "someone.else@corp.example",
            "https://tracker.corp.example",
        ));

        let reader = SessionStore::new(
            path,
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );
        assert!(reader.load().is_none());
    }

    #[test]
    fn test_base_url_mismatch_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_state.json");

        let writer = SessionStore::new(
            path.clone(),
            "op@corp.example".to_string(),
            "https://staging.tracker.corp.example".to_string(),
        );
        writer.save(&sample_state(
            "op@corp.example",
            "https://staging.tracker.corp.example",
        ));

        let reader = SessionStore::new(
            path,
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );
        assert!(reader.load().is_none());
    }

    #[test]
    fn test_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(
            dir.path().join("does_not_exist.json"),
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );
        assert!(store.load().is_none());
    }

    #[test]
    fn test_corrupt_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session_state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SessionStore::new(
            path,
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );
        assert!(store.load().is_none());
    }

    #[test]
    fn test_expired_state_is_still_returned() {
        // Staleness is the web application's call, not ours: an old state
        // with matching identity loads fine and fails downstream instead.
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(
            dir.path().join("session_state.json"),
            "op@corp.example".to_string(),
            "https://tracker.corp.example".to_string(),
        );

        let mut state = sample_state("op@corp.example", "https://tracker.corp.example");
        state.saved_at = Utc::now() - chrono::Duration::days(365);
        state.cookies[0].expires = 0.0;
        store.save(&state);

        assert!(store.load().is_some());
    }
}
