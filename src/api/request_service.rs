//! Authenticated request orchestration

use std::sync::Arc;

use serde_json::Value;

use crate::auth::AuthHandler;
use crate::common::Result;
use crate::http::{ApiRequest, ApiResponse, Method, Transport};

/// Query parameters as name/value pairs
pub type Query<'a> = &'a [(&'a str, &'a str)];

/// Sends requests with the current user's auth headers attached
pub struct RequestService {
    transport: Arc<dyn Transport>,
    auth: AuthHandler,
}

impl std::fmt::Debug for RequestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestService")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

fn build(method: Method, endpoint: &str, body: Option<Value>, query: Query<'_>) -> ApiRequest {
    let mut request = ApiRequest::new(method, endpoint);
    request.body = body;
    for (name, value) in query {
        request = request.query(*name, *value);
    }
    request
}

impl RequestService {
    pub fn new(transport: Arc<dyn Transport>, auth: AuthHandler) -> Self {
        Self { transport, auth }
    }

    pub fn auth(&self) -> &AuthHandler {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut AuthHandler {
        &mut self.auth
    }

    /// Send an authenticated request
    pub async fn request(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        query: Query<'_>,
    ) -> Result<ApiResponse> {
        let headers = self.auth.build_request_headers(None).await?;
        let request = build(method, endpoint, body, query).headers(headers);
        self.transport.send(request).await
    }

    pub async fn get(&mut self, endpoint: &str, query: Query<'_>) -> Result<ApiResponse> {
        self.request(Method::Get, endpoint, None, query).await
    }

    pub async fn post(&mut self, endpoint: &str, body: Value, query: Query<'_>) -> Result<ApiResponse> {
        self.request(Method::Post, endpoint, Some(body), query).await
    }

    pub async fn put(&mut self, endpoint: &str, body: Value, query: Query<'_>) -> Result<ApiResponse> {
        self.request(Method::Put, endpoint, Some(body), query).await
    }

    pub async fn delete(&mut self, endpoint: &str, query: Query<'_>) -> Result<ApiResponse> {
        self.request(Method::Delete, endpoint, None, query).await
    }

    pub async fn patch(&mut self, endpoint: &str, body: Value, query: Query<'_>) -> Result<ApiResponse> {
        self.request(Method::Patch, endpoint, Some(body), query).await
    }

    /// GET without auth headers
    pub async fn public_get(&self, endpoint: &str, query: Query<'_>) -> Result<ApiResponse> {
        self.transport
            .send(build(Method::Get, endpoint, None, query))
            .await
    }

    /// POST without auth headers
    pub async fn public_post(&self, endpoint: &str, body: Value, query: Query<'_>) -> Result<ApiResponse> {
        self.transport
            .send(build(Method::Post, endpoint, Some(body), query))
            .await
    }

    /// Send an authenticated request; on 401 refresh the token and retry once
    pub async fn request_with_retry(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        query: Query<'_>,
    ) -> Result<ApiResponse> {
        match self.request(method, endpoint, body.clone(), query).await {
            Err(e) if e.is_unauthorized() => {
                tracing::warn!(%method, endpoint, "Got 401, refreshing token and retrying once");
                self.auth.refresh_token().await?;
                self.request(method, endpoint, body, query).await
            }
            other => other,
        }
    }
}
