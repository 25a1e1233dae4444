//! Error types for the API harness
//!
//! Errors fall into a handful of kinds that decide how a scenario reacts:
//! configuration and authentication problems fail the scenario, HTTP errors
//! carry the normalized response, and filesystem problems during report
//! handling are only ever logged.

use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A non-2xx response or transport failure, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    pub status: u16,
    pub body: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub message: String,
}

impl HttpError {
    /// Build the error used when no response was received at all
    pub fn network(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: 500,
            body: serde_json::json!({ "message": message }),
            headers: BTreeMap::new(),
            message,
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Environment \"{0}\" not found in configuration")]
    EnvironmentNotFound(String),

    // === Authentication Errors ===
    #[error(
        "Authentication failed{}: {}",
        .status.map(|s| format!(" with status {s}")).unwrap_or_default(),
        .message
    )]
    Auth {
        status: Option<u16>,
        body: serde_json::Value,
        message: String,
    },

    #[error("Credentials not set. Call set_credentials() first")]
    CredentialsNotSet,

    // === HTTP Errors ===
    #[error("Request failed with status {}: {}", .0.status, .0.message)]
    Http(HttpError),

    // === Report Errors ===
    #[error("Filesystem error at '{path}': {source}")]
    Filesystem {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Test run not initialized. Call initialize_test_run() first")]
    RunNotInitialized,

    #[error("Failed to render report: {0}")]
    Template(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(status: Option<u16>, body: serde_json::Value, message: impl Into<String>) -> Self {
        Self::Auth {
            status,
            body,
            message: message.into(),
        }
    }

    /// Create a filesystem error for the given path
    pub fn filesystem(path: impl AsRef<std::path::Path>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create an assertion error
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::TestAssertion(message.into())
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(http) => Some(http.status),
            Error::Auth { status, .. } => *status,
            _ => None,
        }
    }

    /// True when the server rejected our credentials (HTTP 401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Http(http) if http.status == 401)
    }

    /// Stable code for logs and scenario error records
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::ConfigParse(_) | Error::EnvironmentNotFound(_) => {
                "CONFIG_ERROR"
            }
            Error::Auth { .. } | Error::CredentialsNotSet => "AUTH_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Filesystem { .. } | Error::Io(_) => "FILESYSTEM_ERROR",
            Error::RunNotInitialized => "RUN_NOT_INITIALIZED",
            Error::Template(_) => "TEMPLATE_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::TestAssertion(_) => "ASSERTION_FAILED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Error::Http(e)
    }
}

impl From<askama::Error> for Error {
    fn from(e: askama::Error) -> Self {
        Error::Template(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_only_for_http_401() {
        let err = Error::Http(HttpError {
            status: 401,
            body: serde_json::json!({}),
            headers: BTreeMap::new(),
            message: "Unauthorized".to_string(),
        });
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));

        let auth = Error::auth(Some(401), serde_json::Value::Null, "bad credentials");
        assert!(!auth.is_unauthorized());
        assert_eq!(auth.kind(), "AUTH_ERROR");
    }

    #[test]
    fn test_network_error_is_normalized_to_500() {
        let err = HttpError::network("connection refused");
        assert_eq!(err.status, 500);
        assert_eq!(err.body["message"], "connection refused");
    }

    #[test]
    fn test_auth_display_includes_status() {
        let err = Error::auth(Some(403), serde_json::Value::Null, "forbidden");
        assert_eq!(err.to_string(), "Authentication failed with status 403: forbidden");

        let err = Error::auth(None, serde_json::Value::Null, "timed out");
        assert_eq!(err.to_string(), "Authentication failed: timed out");
    }
}
