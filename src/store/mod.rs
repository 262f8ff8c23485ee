//! Persisted state: the login session and the dropdown option cache
//!
//! Both are plain JSON files in the state directory. Reads fail soft (a bad
//! or missing file is a cache miss), writes are logged but never fatal.

mod options;
mod session_state;

pub use options::OptionCacheStore;
pub use session_state::{SessionState, SessionStore};
