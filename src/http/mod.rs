//! HTTP boundary
//!
//! Everything above this module talks to the network through [`Transport`].
//! [`ApiClient`] is the reqwest-backed implementation; tests use
//! [`mock::ScriptedTransport`].

pub mod client;
pub mod mock;
pub mod response;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::Result;

pub use client::ApiClient;
pub use response::ApiResponse;

/// HTTP methods the harness issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = crate::common::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            other => Err(crate::common::Error::Internal(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// A single outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Absolute URL, or a path resolved against the client's base URL
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            query: Vec::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Merge headers; later values win
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value.into());
        }
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Case-insensitive header lookup
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Something that can execute an [`ApiRequest`]
///
/// Implementations return `Error::Http` for non-2xx statuses and for
/// transport failures (normalized to status 500).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::new(Method::Post, "/token")
            .header("Authorization", "Bearer a")
            .headers([("Authorization", "Bearer b"), ("X-Client-ID", "harness")])
            .json(serde_json::json!({ "email": "qa@example.com" }))
            .query("page", "2")
            .timeout(Duration::from_secs(1));

        assert_eq!(request.header_value("authorization"), Some("Bearer b"));
        assert_eq!(request.header_value("x-client-id"), Some("harness"));
        assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(request.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("patch".parse::<Method>().unwrap(), Method::Patch);
        assert!("TRACE".parse::<Method>().is_err());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
