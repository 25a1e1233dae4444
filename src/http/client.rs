//! reqwest-backed HTTP client

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiRequest, ApiResponse, Method, Transport};
use crate::common::{Error, HttpError, Result};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// HTTP client bound to a base URL with a set of default headers
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    default_headers: BTreeMap<String, String>,
}

impl ApiClient {
    /// Build a client
    ///
    /// `allow_insecure_tls` disables certificate verification; only use it
    /// against internal test environments.
    pub fn new(base_url: impl Into<String>, timeout: Duration, allow_insecure_tls: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(allow_insecure_tls)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        if allow_insecure_tls {
            tracing::warn!("TLS certificate verification is disabled");
        }

        let mut default_headers = BTreeMap::new();
        default_headers.insert("content-type".to_string(), "application/json".to_string());

        Ok(Self {
            http,
            base_url: base_url.into(),
            timeout,
            default_headers,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `Authorization: Bearer <token>` on every request
    pub fn set_auth_header(&mut self, token: &str) {
        self.default_headers
            .insert("authorization".to_string(), format!("Bearer {}", token));
    }

    pub fn remove_auth_header(&mut self) {
        self.default_headers.remove("authorization");
    }

    /// Add or replace default headers
    pub fn set_headers<I, K, V>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.default_headers
                .insert(name.as_ref().to_ascii_lowercase(), value.into());
        }
    }

    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    /// Resolve a request URL against the base URL
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        if url.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    /// Defaults overlaid with the request's own headers (case-insensitive)
    fn merged_headers(&self, request: &ApiRequest) -> BTreeMap<String, String> {
        let mut headers = self.default_headers.clone();
        for (name, value) in &request.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        headers
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::Get, url)).await
    }

    pub async fn post(&self, url: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::Post, url).json(body)).await
    }

    pub async fn put(&self, url: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::Put, url).json(body)).await
    }

    pub async fn delete(&self, url: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::Delete, url)).await
    }

    pub async fn patch(&self, url: &str, body: Value) -> Result<ApiResponse> {
        self.send(ApiRequest::new(Method::Patch, url).json(body)).await
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Patch => reqwest::Method::PATCH,
    }
}

/// Parse a body as JSON, falling back to a string (or null when empty)
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Transport for ApiClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.resolve(&request.url);
        let timeout = request.timeout.unwrap_or(self.timeout);
        tracing::debug!(method = %request.method, %url, "HTTP request");

        let mut builder = self
            .http
            .request(reqwest_method(request.method), &url)
            .timeout(timeout);
        for (name, value) in self.merged_headers(&request) {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(%url, "HTTP transport failure: {}", e);
            HttpError::network(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HttpError::network(e.to_string()))?;

        tracing::debug!(status, %url, "HTTP response");
        ApiResponse::new(status, parse_body(&bytes), headers).error_for_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new("https://api.example.com/v1/", DEFAULT_TIMEOUT, false).unwrap()
    }

    #[test]
    fn test_resolve_urls() {
        let client = client();
        assert_eq!(client.resolve("/users"), "https://api.example.com/v1/users");
        assert_eq!(client.resolve("users"), "https://api.example.com/v1/users");
        assert_eq!(client.resolve(""), "https://api.example.com/v1/");
        assert_eq!(client.resolve("http://other/x"), "http://other/x");
    }

    #[test]
    fn test_auth_header_management() {
        let mut client = client();
        assert_eq!(
            client.default_headers().get("content-type").map(String::as_str),
            Some("application/json")
        );

        client.set_auth_header("abc");
        assert_eq!(
            client.default_headers().get("authorization").map(String::as_str),
            Some("Bearer abc")
        );

        client.set_headers([("X-Client-ID", "harness")]);
        assert!(client.default_headers().contains_key("x-client-id"));

        client.remove_auth_header();
        assert!(!client.default_headers().contains_key("authorization"));
    }

    #[test]
    fn test_request_headers_override_defaults() {
        let mut client = client();
        client.set_auth_header("default");
        let request = ApiRequest::new(Method::Get, "/x").header("Authorization", "Bearer override");
        let merged = client.merged_headers(&request);
        assert_eq!(merged.get("authorization").map(String::as_str), Some("Bearer override"));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"a":1}"#)["a"], 1);
        assert_eq!(parse_body(b"plain-token"), Value::String("plain-token".into()));
    }

    #[tokio::test]
    async fn test_connection_failure_is_normalized() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(500), false).unwrap();
        let err = client.get("/").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.kind(), "HTTP_ERROR");
    }
}
