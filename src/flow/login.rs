//! Session establishment
//!
//! Decides whether the browser is already authenticated, restores a saved
//! session when one is usable, and otherwise performs one interactive login
//! cycle. The actual confirmation (fingerprint on the operator's phone)
//! happens outside the browser; all this flow can do is wait for the page to
//! land on the dashboard.

use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use crate::browser::{first_visible, poll_until, BrowserError, BrowserSession, Candidates};
use crate::store::{SessionState, SessionStore};
use crate::AppConfig;

/// Tracker login page selectors
mod selectors {
    /// Elements only present once the operator is signed in
    pub const AUTHENTICATED_MARKERS: &[&str] = &[
        "[data-testid='global-create-button']",
        "nav[aria-label='Primary'] [aria-label='Your profile']",
        "#dashboard-root",
    ];

    /// Identity e-mail entry on the login page
    pub const IDENTITY_INPUTS: &[&str] = &[
        "input[type='email']",
        "#identifier",
        "input[name='identifier']",
        "input[name='email']",
    ];

    /// Button submitting the identity form
    pub const IDENTITY_SUBMITS: &[&str] = &[
        "#identifier-next",
        "button[data-testid='login-submit']",
        "button[type='submit']",
    ];
}

/// How often the page URL is re-read while waiting for the out-of-band
/// confirmation
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Login flow states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Unauthenticated,
    AwaitingOutOfBandAuth,
    Authenticated,
    Failed,
}

/// Session establishment flow over one browser session
pub struct LoginFlow<'a> {
    session: &'a BrowserSession,
    store: &'a SessionStore,
    config: &'a AppConfig,
}

impl<'a> LoginFlow<'a> {
    pub fn new(session: &'a BrowserSession, store: &'a SessionStore, config: &'a AppConfig) -> Self {
        Self {
            session,
            store,
            config,
        }
    }

    /// Drive the state machine to a terminal state.
    ///
    /// Returns `true` when the browser ends up authenticated. At most one
    /// interactive login cycle is attempted per run; on failure the operator
    /// retries manually.
    pub async fn ensure_authenticated(&self) -> Result<bool, BrowserError> {
        match self.drive().await {
            Ok(authenticated) => Ok(authenticated),
            Err(e) => {
                let _ = self.session.capture_screenshot("login-error").await;
                Err(e)
            }
        }
    }

    async fn drive(&self) -> Result<bool, BrowserError> {
        let mut state = LoginState::Unauthenticated;

        loop {
            state = match state {
                LoginState::Unauthenticated => {
                    self.session.navigate(&self.config.dashboard_url).await?;

                    if self.probe_authenticated_marker().await {
                        info!("Already authenticated");
                        LoginState::Authenticated
                    } else if self.try_restore_saved_session().await? {
                        info!("Restored saved session");
                        LoginState::Authenticated
                    } else if self.submit_identity().await? {
                        LoginState::AwaitingOutOfBandAuth
                    } else {
                        warn!("Could not find the identity entry field");
                        LoginState::Failed
                    }
                }

                LoginState::AwaitingOutOfBandAuth => {
                    info!(
                        "Waiting up to {}s for out-of-band confirmation (check your device)",
                        self.config.login_wait_secs
                    );

                    let dashboard_url = self.config.dashboard_url.clone();
                    let session = self.session;
                    let confirmed = poll_until(
                        LOGIN_POLL_INTERVAL,
                        Duration::from_secs(self.config.login_wait_secs),
                        || {
                            let dashboard_url = dashboard_url.clone();
                            async move {
                                match session.current_url().await {
                                    Ok(current) => on_dashboard(&current, &dashboard_url),
                                    Err(_) => false,
                                }
                            }
                        },
                    )
                    .await;

                    if confirmed {
                        LoginState::Authenticated
                    } else {
                        LoginState::Failed
                    }
                }

                LoginState::Authenticated => {
                    self.persist_session().await;
                    return Ok(true);
                }

                LoginState::Failed => {
                    warn!("Login failed; retry manually");
                    let _ = self.session.capture_screenshot("login-failed").await;
                    return Ok(false);
                }
            };
        }
    }

    /// Probe for a UI element that only exists when signed in
    async fn probe_authenticated_marker(&self) -> bool {
        let candidates = Candidates::new("authenticated marker", selectors::AUTHENTICATED_MARKERS);
        first_visible(
            self.session,
            candidates,
            Duration::from_secs(self.config.element_wait_secs),
        )
        .await
        .is_some()
    }

    /// Install a saved session, re-navigate and re-probe.
    ///
    /// Returns `false` when no usable state exists or the restored cookies
    /// no longer log us in (expired state falls through to a fresh login).
    async fn try_restore_saved_session(&self) -> Result<bool, BrowserError> {
        let Some(saved) = self.store.load() else {
            return Ok(false);
        };

        // Cookies need no origin, but localStorage does
        self.session.navigate(&self.config.base_url).await?;
        self.session.set_cookies(&saved.cookies).await?;
        if let Err(e) = self.session.set_local_storage(&saved.local_storage).await {
            warn!("Could not seed local storage: {}", e);
        }

        self.session.navigate(&self.config.dashboard_url).await?;
        Ok(self.probe_authenticated_marker().await)
    }

    /// Fill the identity field and submit, starting the out-of-band step.
    ///
    /// Returns `false` when the login form cannot be found at all.
    async fn submit_identity(&self) -> Result<bool, BrowserError> {
        let wait = Duration::from_secs(self.config.element_wait_secs);

        let input = Candidates::new("identity field", selectors::IDENTITY_INPUTS);
        let Some(input_selector) = first_visible(self.session, input, wait).await else {
            return Ok(false);
        };

        info!("Entering identity: {}", self.config.account_email);
        self.session
            .type_text(&input_selector, &self.config.account_email)
            .await?;

        let submit = Candidates::new("identity submit", selectors::IDENTITY_SUBMITS);
        match first_visible(self.session, submit, wait).await {
            Some(submit_selector) => self.session.click(&submit_selector).await?,
            // Some login pages submit on Enter only
            None => self.session.press_key(&input_selector, "Enter").await?,
        }

        Ok(true)
    }

    /// Capture and save the freshly authenticated session
    async fn persist_session(&self) {
        let dashboard_url = self.session.current_url().await.ok();

        match SessionState::capture(
            self.session,
            self.store.account_email(),
            self.store.base_url(),
            dashboard_url,
        )
        .await
        {
            Ok(state) => self.store.save(&state),
            Err(e) => warn!("Could not capture session for reuse: {}", e),
        }
    }
}

/// Whether `current` is on the authenticated dashboard host
fn on_dashboard(current: &str, dashboard: &str) -> bool {
    let (Ok(current), Ok(dashboard)) = (Url::parse(current), Url::parse(dashboard)) else {
        return false;
    };

    current.host_str() == dashboard.host_str() && current.path().starts_with(dashboard.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_dashboard_matches_host_and_path() {
        assert!(on_dashboard(
            "https://tracker.corp.example/dashboard",
            "https://tracker.corp.example/dashboard"
        ));
        assert!(on_dashboard(
            "https://tracker.corp.example/dashboard/boards/12",
            "https://tracker.corp.example/dashboard"
        ));
    }

    #[test]
    fn test_on_dashboard_rejects_login_host() {
        assert!(!on_dashboard(
            "https://auth.corp.example/verify",
            "https://tracker.corp.example/dashboard"
        ));
    }

    #[test]
    fn test_on_dashboard_rejects_other_paths() {
        assert!(!on_dashboard(
            "https://tracker.corp.example/login",
            "https://tracker.corp.example/dashboard"
        ));
    }

    #[test]
    fn test_on_dashboard_rejects_garbage() {
        assert!(!on_dashboard("about:blank", "https://tracker.corp.example/dashboard"));
        assert!(!on_dashboard("not a url", "https://tracker.corp.example/dashboard"));
    }
}
