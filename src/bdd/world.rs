//! Per-scenario state for the cucumber runner

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::runner::SuiteContext;
use api_harness::api::{EmailAuthService, RequestService};
use api_harness::auth::{AuthHandler, TokenCache};
use api_harness::common::config::EnvironmentConfig;
use api_harness::common::{Error, Result};
use api_harness::http::ApiResponse;

#[derive(Debug, Default, cucumber::World)]
pub struct ApiWorld {
    pub scenario_name: String,
    pub environment: String,
    pub config: Option<EnvironmentConfig>,
    pub requests: Option<RequestService>,
    pub email_auth: Option<EmailAuthService>,
    pub tokens: Option<Arc<TokenCache>>,
    pub test_data: HashMap<String, Value>,
    pub last_response: Option<ApiResponse>,
    /// `[KIND] message` of the most recent failure
    pub last_error: Option<String>,
}

impl ApiWorld {
    /// Wire the services for one scenario from the shared suite context
    pub fn bootstrap(&mut self, ctx: &SuiteContext, scenario: &str) {
        self.scenario_name = scenario.to_string();
        self.environment = ctx.environment.clone();
        self.config = Some(ctx.config.clone());
        self.email_auth = Some(EmailAuthService::new(ctx.transport.clone(), &ctx.config));
        self.tokens = ctx.tokens.clone();
        self.requests = ctx.tokens.as_ref().map(|tokens| {
            RequestService::new(ctx.transport.clone(), AuthHandler::new(tokens.clone()))
        });
        tracing::debug!(scenario, environment = %self.environment, "World initialized");
    }

    pub fn config(&self) -> Result<&EnvironmentConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| Error::Config("World has no configuration".to_string()))
    }

    /// Set the configured default user on the request service
    pub fn setup_auth(&mut self) -> Result<()> {
        let credentials = self
            .config()?
            .credentials
            .clone()
            .ok_or(Error::CredentialsNotSet)?;
        let requests = self.requests.as_mut().ok_or_else(|| {
            Error::Config("auth_url, client_id and client_secret must be configured".to_string())
        })?;
        requests
            .auth_mut()
            .set_credentials(credentials.username, credentials.password);
        Ok(())
    }

    pub fn store_test_data(&mut self, key: impl Into<String>, value: Value) {
        self.test_data.insert(key.into(), value);
    }

    pub fn test_data(&self, key: &str) -> Option<&Value> {
        self.test_data.get(key)
    }

    /// Keep a response for later assertions
    ///
    /// HTTP errors are responses too: the status steps assert on them, so
    /// only transport-level failures are returned.
    pub fn remember(&mut self, result: Result<ApiResponse>) -> Result<()> {
        match result {
            Ok(response) => {
                self.last_response = Some(response);
                Ok(())
            }
            Err(Error::Http(http)) => {
                tracing::debug!(status = http.status, "Keeping error response");
                self.last_response = Some(ApiResponse::new(http.status, http.body, http.headers));
                Ok(())
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Record the error of a failed step and hand the result back
    pub fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }

    pub fn record_error(&mut self, error: &Error) {
        tracing::error!("[{}] {}", error.kind(), error);
        self.last_error = Some(format!("[{}] {}", error.kind(), error));
    }

    pub fn response(&self) -> Result<&ApiResponse> {
        self.last_response
            .as_ref()
            .ok_or_else(|| Error::assertion("No response has been received yet"))
    }

    /// Drop per-scenario state: auth, test data and the shared token cache
    pub async fn cleanup(&mut self) {
        if let Some(requests) = self.requests.as_mut() {
            requests.auth_mut().clear_auth().await;
        }
        if let Some(service) = self.email_auth.as_mut() {
            service.clear_token();
        }
        if let Some(tokens) = &self.tokens {
            tokens.clear_all().await;
        }
        self.test_data.clear();
        self.last_response = None;
        tracing::debug!(scenario = %self.scenario_name, "World cleaned up");
    }

    pub fn scenario_info(&self) -> String {
        format!("{} [{}]", self.scenario_name, self.environment)
    }
}
