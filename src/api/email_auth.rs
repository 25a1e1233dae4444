//! E-mail JWT authentication
//!
//! Two-step flow: POST `{email}` to the auth URL to receive a JWT, then call
//! `base_url + endpoint_path` with it as a bearer token. The endpoint path
//! can be changed so one service covers several endpoints.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::common::config::EnvironmentConfig;
use crate::common::{Error, Result};
use crate::http::{ApiRequest, ApiResponse, Method, Transport};

/// Endpoint used when the environment does not name one
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/params";

const DEFAULT_BASE_URL: &str = "https://localhost:3000";

pub struct EmailAuthService {
    transport: Arc<dyn Transport>,
    base_url: String,
    auth_url: Option<String>,
    email: Option<String>,
    endpoint_path: String,
    token: Option<String>,
}

impl std::fmt::Debug for EmailAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailAuthService")
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field("email", &self.email)
            .field("endpoint_path", &self.endpoint_path)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Pull the JWT out of an auth response body
///
/// Accepts `{token}`, `{access_token}` or a bare string body.
fn extract_token(body: &Value) -> Option<String> {
    body.get("token")
        .or_else(|| body.get("access_token"))
        .unwrap_or(body)
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl EmailAuthService {
    pub fn new(transport: Arc<dyn Transport>, config: &EnvironmentConfig) -> Self {
        let service = Self {
            transport,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            auth_url: config.auth_url.clone().filter(|u| !u.is_empty()),
            email: config.email.clone().filter(|e| !e.is_empty()),
            endpoint_path: config
                .endpoint_path
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT_PATH.to_string()),
            token: None,
        };
        tracing::info!(
            base_url = %service.base_url,
            auth_url = service.auth_url.as_deref().unwrap_or("<unset>"),
            endpoint_path = %service.endpoint_path,
            "E-mail auth service initialized"
        );
        service
    }

    pub fn set_endpoint_path(&mut self, path: impl Into<String>) {
        self.endpoint_path = path.into();
        tracing::info!("Endpoint path updated to: {}", self.endpoint_path);
    }

    pub fn endpoint_path(&self) -> &str {
        &self.endpoint_path
    }

    /// POST `{email}` to the auth URL and cache the returned JWT
    ///
    /// Falls back to the configured e-mail. Only 200 and 201 count as success.
    pub async fn authenticate(&mut self, email: Option<&str>) -> Result<String> {
        let email = email
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| self.email.clone())
            .ok_or_else(|| {
                Error::Config("Email not provided and not configured in environment".to_string())
            })?;
        let auth_url = self
            .auth_url
            .clone()
            .ok_or_else(|| Error::Config("Auth URL not configured".to_string()))?;

        tracing::info!("Authenticating with e-mail: {}", email);
        let request = ApiRequest::new(Method::Post, auth_url)
            .header("Content-Type", "application/json")
            .json(json!({ "email": email }));

        let response = self.transport.send(request).await.map_err(|e| {
            tracing::error!("E-mail authentication error: {}", e);
            match e {
                Error::Http(http) => Error::auth(Some(http.status), http.body, http.message),
                other => other,
            }
        })?;

        if !matches!(response.status, 200 | 201) {
            return Err(Error::auth(
                Some(response.status),
                response.body,
                format!("Authentication failed with status {}", response.status),
            ));
        }

        let token = extract_token(&response.body).ok_or_else(|| {
            Error::auth(
                Some(response.status),
                response.body.clone(),
                "Response did not contain a token",
            )
        })?;
        tracing::info!("E-mail authentication successful, JWT received");
        self.token = Some(token.clone());
        Ok(token)
    }

    /// GET `base_url + path` with the given (or cached) JWT
    pub async fn get_endpoint(&self, token: Option<&str>, path: Option<&str>) -> Result<ApiResponse> {
        let token = token
            .or(self.token.as_deref())
            .ok_or_else(|| Error::auth(None, Value::Null, "Token not available. Authenticate first"))?;
        let path = path.unwrap_or(&self.endpoint_path);
        if path.is_empty() {
            return Err(Error::Config("Endpoint path not configured".to_string()));
        }

        let url = format!("{}{}", self.base_url, path);
        tracing::info!("Making GET request to: {}", url);

        let request = ApiRequest::new(Method::Get, url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json");
        match self.transport.send(request).await {
            Ok(response) => {
                tracing::info!(status = response.status, "API request successful");
                Ok(response)
            }
            Err(e) => {
                tracing::error!("API request failed: {}", e);
                Err(e)
            }
        }
    }

    /// Authenticate, then call the current endpoint
    pub async fn fetch_data(&mut self, email: Option<&str>) -> Result<ApiResponse> {
        let token = self.authenticate(email).await?;
        self.get_endpoint(Some(&token), None).await
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::ScriptedTransport;

    fn config() -> EnvironmentConfig {
        EnvironmentConfig {
            base_url: Some("https://api.example.com".to_string()),
            auth_url: Some("https://auth.example.com/jwt".to_string()),
            email: Some("qa@example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_token_shapes() {
        assert_eq!(extract_token(&json!({ "token": "a" })).as_deref(), Some("a"));
        assert_eq!(extract_token(&json!({ "access_token": "b" })).as_deref(), Some("b"));
        assert_eq!(extract_token(&json!("c")).as_deref(), Some("c"));
        assert_eq!(extract_token(&json!({ "other": 1 })), None);
        assert_eq!(extract_token(&json!("")), None);
    }

    #[tokio::test]
    async fn test_authenticate_uses_configured_email() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(201, json!({ "token": "jwt" }));
        let mut service = EmailAuthService::new(transport.clone(), &config());

        assert_eq!(service.authenticate(None).await.unwrap(), "jwt");
        assert_eq!(service.token(), Some("jwt"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://auth.example.com/jwt");
        assert_eq!(sent.body.as_ref().unwrap()["email"], "qa@example.com");
    }

    #[tokio::test]
    async fn test_non_200_201_success_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(202, json!({ "token": "jwt" }));
        let mut service = EmailAuthService::new(transport, &config());

        let err = service.authenticate(Some("x@example.com")).await.unwrap_err();
        assert_eq!(err.kind(), "AUTH_ERROR");
        assert_eq!(err.status(), Some(202));
        assert!(service.token().is_none());
    }

    #[tokio::test]
    async fn test_missing_email_is_config_error() {
        let mut cfg = config();
        cfg.email = None;
        let mut service = EmailAuthService::new(Arc::new(ScriptedTransport::new()), &cfg);
        let err = service.authenticate(None).await.unwrap_err();
        assert_eq!(err.kind(), "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_fetch_data_calls_current_endpoint() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, json!({ "access_token": "jwt" }))
            .push_json(200, json!({ "data": [{ "paramName": "a" }] }));
        let mut service = EmailAuthService::new(transport.clone(), &config());
        service.set_endpoint_path("/api/education");

        let response = service.fetch_data(None).await.unwrap();
        assert_eq!(response.records().len(), 1);

        let sent = &transport.requests()[1];
        assert_eq!(sent.url, "https://api.example.com/api/education");
        assert_eq!(sent.header_value("authorization"), Some("Bearer jwt"));
    }

    #[tokio::test]
    async fn test_get_endpoint_without_token() {
        let mut service = EmailAuthService::new(Arc::new(ScriptedTransport::new()), &config());
        assert!(service.get_endpoint(None, None).await.is_err());

        service.set_token("manual");
        service.clear_token();
        assert!(service.token().is_none());
    }
}
