//! Element lookup with selector fallback chains
//!
//! Every field on the tracker form is located the same way: try an ordered
//! list of candidate selectors, each with a bounded wait, and stop at the
//! first one that is actually visible. Fields whose candidates all miss are
//! skipped by the caller.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{BrowserError, BrowserSession};

/// How often a candidate selector is re-probed while its wait runs down
const PROBE_INTERVAL_MS: u64 = 250;

/// An ordered list of candidate selectors for one logical element
#[derive(Debug, Clone, Copy)]
pub struct Candidates<'a> {
    /// Logical name used in log lines ("work type dropdown", ...)
    pub name: &'a str,
    /// Selectors in preference order
    pub selectors: &'a [&'a str],
}

impl<'a> Candidates<'a> {
    pub const fn new(name: &'a str, selectors: &'a [&'a str]) -> Self {
        Self { name, selectors }
    }
}

/// Return the first candidate selector that matches a visible element.
///
/// Each candidate gets `per_candidate` of wall-clock time before the next
/// one is tried; the whole chain short-circuits on the first visible match.
/// `None` means every candidate missed, which callers treat as "skip this
/// optional step".
pub async fn first_visible(
    session: &BrowserSession,
    candidates: Candidates<'_>,
    per_candidate: Duration,
) -> Option<String> {
    for selector in candidates.selectors {
        let found = poll_until(Duration::from_millis(PROBE_INTERVAL_MS), per_candidate, || {
            let session = session;
            let selector = *selector;
            async move { is_visible(session, selector).await }
        })
        .await;

        if found {
            debug!("Located {} via selector: {}", candidates.name, selector);
            return Some(selector.to_string());
        }
    }

    warn!(
        "Could not locate {} (tried {} selectors)",
        candidates.name,
        candidates.selectors.len()
    );
    None
}

/// Check whether a selector matches an element that is currently visible
async fn is_visible(session: &BrowserSession, selector: &str) -> bool {
    let script = format!(
        r#"
        (function() {{
            const el = document.querySelector({});
            return !!(el && el.offsetParent !== null && el.offsetWidth > 0);
        }})()
        "#,
        serde_json::to_string(selector).unwrap_or_default()
    );

    match session.execute_js_with_timeout(&script, 5).await {
        Ok(value) => value.as_bool().unwrap_or(false),
        Err(BrowserError::Timeout(_)) => false,
        Err(e) => {
            debug!("Visibility probe failed for {}: {}", selector, e);
            false
        }
    }
}

/// Poll `probe` at a fixed interval until it returns true or the deadline
/// passes. The probe always runs at least once.
pub async fn poll_until<F, Fut>(interval: Duration, deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if probe().await {
            return true;
        }
        if start.elapsed() + interval >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_until_immediate_success() {
        let result = poll_until(
            Duration::from_millis(10),
            Duration::from_millis(50),
            || async { true },
        )
        .await;
        assert!(result);
    }

    #[tokio::test]
    async fn test_poll_until_eventual_success() {
        let mut calls = 0;
        let result = poll_until(Duration::from_millis(5), Duration::from_millis(200), || {
            calls += 1;
            let done = calls >= 3;
            async move { done }
        })
        .await;
        assert!(result);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let start = Instant::now();
        let result = poll_until(
            Duration::from_millis(10),
            Duration::from_millis(60),
            || async { false },
        )
        .await;
        assert!(!result);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
