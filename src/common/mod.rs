//! Common utilities shared by the library and the CLI

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use error::{Error, HttpError, Result};

/// Source of the current time, replaceable in tests
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall-clock [`Clock`]
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Shorten a secret for display, keeping a recognizable prefix
pub fn truncate_secret(secret: &str, keep: usize) -> String {
    if secret.chars().count() <= keep {
        return secret.to_string();
    }
    let prefix: String = secret.chars().take(keep).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_secret() {
        assert_eq!(truncate_secret("abc", 20), "abc");
        assert_eq!(truncate_secret("eyJhbGciOiJIUzI1NiJ9.payload", 5), "eyJhb...");
    }
}
