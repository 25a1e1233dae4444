//! Credential holder that turns a user into request headers

use std::collections::BTreeMap;
use std::sync::Arc;

use super::TokenCache;
use crate::common::config::Credentials;
use crate::common::{Error, Result};

/// Holds the active user and builds authenticated headers for it
#[derive(Debug)]
pub struct AuthHandler {
    tokens: Arc<TokenCache>,
    client_id: String,
    credentials: Option<Credentials>,
    current_token: Option<String>,
}

impl AuthHandler {
    pub fn new(tokens: Arc<TokenCache>) -> Self {
        let client_id = tokens.client_id().to_string();
        Self {
            tokens,
            client_id,
            credentials: None,
            current_token: None,
        }
    }

    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or(Error::CredentialsNotSet)
    }

    /// Token for the current user, from the cache when still usable
    pub async fn bearer_token(&mut self) -> Result<String> {
        let creds = self.require_credentials()?;
        let token = self.tokens.get_token(&creds.username, &creds.password).await?;
        self.current_token = Some(token.clone());
        Ok(token)
    }

    pub async fn auth_headers(&mut self) -> Result<BTreeMap<String, String>> {
        let token = self.bearer_token().await?;
        Ok(BTreeMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", token),
        )]))
    }

    /// Headers sent with every authenticated request
    pub fn additional_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("X-Client-ID".to_string(), self.client_id.clone()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ])
    }

    /// Defaults, then auth, then `extra`; later entries win
    pub async fn build_request_headers(
        &mut self,
        extra: Option<&BTreeMap<String, String>>,
    ) -> Result<BTreeMap<String, String>> {
        let mut headers = self.additional_headers();
        headers.extend(self.auth_headers().await?);
        if let Some(extra) = extra {
            headers.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(headers)
    }

    pub async fn is_token_expired(&self) -> bool {
        match &self.credentials {
            Some(creds) => self.tokens.is_expired(&creds.username, &creds.password).await,
            None => true,
        }
    }

    /// Invalidate the cached token and authenticate again
    pub async fn refresh_token(&mut self) -> Result<String> {
        let creds = self.require_credentials()?;
        self.tokens.invalidate(&creds.username, &creds.password).await;
        self.bearer_token().await
    }

    /// Forget the user and every cached token
    pub async fn clear_auth(&mut self) {
        self.credentials = None;
        self.current_token = None;
        self.tokens.clear_all().await;
    }

    /// Last token handed out, without fetching
    pub fn current_token(&self) -> Option<&str> {
        self.current_token.as_deref()
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }
}
