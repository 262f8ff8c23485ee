//! Browser automation module
//!
//! Handles launching and controlling the Chromium instance the flows drive.

mod errors;
mod locate;
mod session;

pub use errors::BrowserError;
pub use locate::{first_visible, poll_until, Candidates};
pub use session::{BrowserSession, BrowserSessionConfig, SavedCookie};
