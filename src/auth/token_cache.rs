//! Bearer token cache
//!
//! Tokens are cached per `(username, password)` for the lifetime of the
//! process. A token counts as usable only while more than the refresh
//! threshold remains before it expires.
//!
//! Each key has its own async mutex held across fetch-or-refresh, so
//! concurrent callers for the same credentials share one authentication
//! request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::common::{system_clock, Clock, Error, Result};
use crate::http::{ApiRequest, Method, Transport};

/// Refresh this long before expiry
pub const DEFAULT_REFRESH_THRESHOLD_MS: i64 = 30_000;

/// A cached token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: i64,
}

type Slot = Arc<Mutex<Option<TokenEntry>>>;

/// In-memory token cache backed by the `<auth_url>/token` endpoint
pub struct TokenCache {
    transport: Arc<dyn Transport>,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_threshold: Duration,
    clock: Clock,
    slots: Mutex<HashMap<String, Slot>>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_threshold", &self.refresh_threshold)
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            token_url: format!("{}/token", auth_url.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_threshold: Duration::milliseconds(DEFAULT_REFRESH_THRESHOLD_MS),
            clock: system_clock(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Cache key for a credential pair
    pub fn cache_key(username: &str, password: &str) -> String {
        format!("{}:{}", username, password)
    }

    async fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().clone()
    }

    async fn existing_slot(&self, key: &str) -> Option<Slot> {
        self.slots.lock().await.get(key).cloned()
    }

    fn usable(&self, entry: &TokenEntry) -> bool {
        entry.expires_at - (self.clock)() > self.refresh_threshold
    }

    /// Return a usable cached token, or authenticate and cache a new one
    pub async fn get_token(&self, username: &str, password: &str) -> Result<String> {
        let key = Self::cache_key(username, password);
        let slot = self.slot(&key).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref().filter(|e| self.usable(e)) {
            tracing::debug!(username, "Using cached token");
            return Ok(cached.token.clone());
        }

        let fresh = self.fetch_token(username, password).await?;
        let token = fresh.token.clone();
        *entry = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self, username: &str, password: &str) -> Result<TokenEntry> {
        tracing::info!(username, url = %self.token_url, "Fetching bearer token");

        let request = ApiRequest::new(Method::Post, &self.token_url)
            .header("Content-Type", "application/json")
            .json(json!({
                "clientId": self.client_id,
                "clientSecret": self.client_secret,
                "username": username,
                "password": password,
            }));

        let response = self.transport.send(request).await.map_err(|e| match e {
            Error::Http(http) => Error::auth(
                Some(http.status),
                http.body,
                format!("Token fetch failed with status {}", http.status),
            ),
            other => Error::auth(None, Value::Null, format!("Failed to fetch token: {}", other)),
        })?;

        let parsed: TokenResponse = serde_json::from_value(response.body.clone()).map_err(|e| {
            Error::auth(
                Some(response.status),
                response.body.clone(),
                format!("Unexpected token response: {}", e),
            )
        })?;
        let token = parsed.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            Error::auth(
                Some(response.status),
                response.body.clone(),
                "Token response did not contain access_token",
            )
        })?;

        let issued_at = (self.clock)();
        let expires_at = Some(parsed.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                Error::auth(
                    Some(response.status),
                    response.body.clone(),
                    format!("Invalid expires_in: {}", parsed.expires_in),
                )
            })?;

        Ok(TokenEntry {
            token,
            issued_at,
            expires_at,
        })
    }

    /// True iff an entry exists for `key` with more than the threshold left
    pub async fn is_valid(&self, key: &str) -> bool {
        let Some(slot) = self.existing_slot(key).await else {
            return false;
        };
        let entry = slot.lock().await;
        entry.as_ref().is_some_and(|e| self.usable(e))
    }

    /// True when there is no entry or it is past its expiry
    pub async fn is_expired(&self, username: &str, password: &str) -> bool {
        match self.expiry(username, password).await {
            Some(expires_at) => (self.clock)() > expires_at,
            None => true,
        }
    }

    pub async fn expiry(&self, username: &str, password: &str) -> Option<DateTime<Utc>> {
        let slot = self
            .existing_slot(&Self::cache_key(username, password))
            .await?;
        let entry = slot.lock().await;
        entry.as_ref().map(|e| e.expires_at)
    }

    /// Drop the entry so the next `get_token` authenticates again
    pub async fn invalidate(&self, username: &str, password: &str) {
        let key = Self::cache_key(username, password);
        if self.slots.lock().await.remove(&key).is_some() {
            tracing::debug!(username, "Token invalidated");
        }
    }

    pub async fn clear_all(&self) {
        self.slots.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::ScriptedTransport;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    fn token_reply(token: &str, expires_in: i64) -> Value {
        json!({ "access_token": token, "token_type": "Bearer", "expires_in": expires_in })
    }

    /// Clock whose time can be moved forward by the test
    fn manual_clock() -> (Clock, Arc<StdMutex<DateTime<Utc>>>) {
        let now = Arc::new(StdMutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    fn cache(transport: Arc<ScriptedTransport>, clock: Clock) -> TokenCache {
        TokenCache::new(transport, "https://auth.example.com/", "harness", "s3cret").with_clock(clock)
    }

    #[tokio::test]
    async fn test_fetch_sends_client_credentials() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, token_reply("abc", 3600));
        let (clock, _) = manual_clock();
        let tokens = cache(transport.clone(), clock);

        assert_eq!(tokens.get_token("qa", "pw").await.unwrap(), "abc");

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "https://auth.example.com/token");
        let body = sent.body.as_ref().unwrap();
        assert_eq!(body["clientId"], "harness");
        assert_eq!(body["clientSecret"], "s3cret");
        assert_eq!(body["username"], "qa");
        assert_eq!(body["password"], "pw");
    }

    #[tokio::test]
    async fn test_refresh_threshold_boundary() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, token_reply("first", 60))
            .push_json(200, token_reply("second", 60));
        let (clock, now) = manual_clock();
        let tokens = cache(transport.clone(), clock);

        tokens.get_token("qa", "pw").await.unwrap();
        let key = TokenCache::cache_key("qa", "pw");
        assert!(tokens.is_valid(&key).await);

        // 31s remaining: still usable
        *now.lock().unwrap() += Duration::seconds(29);
        assert!(tokens.is_valid(&key).await);

        // Exactly 30s remaining: stale
        *now.lock().unwrap() += Duration::seconds(1);
        assert!(!tokens.is_valid(&key).await);
        assert!(!tokens.is_expired("qa", "pw").await);

        assert_eq!(tokens.get_token("qa", "pw").await.unwrap(), "second");
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_expiry_and_is_expired() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, token_reply("abc", 10));
        let (clock, now) = manual_clock();
        let tokens = cache(transport, clock);

        assert!(tokens.is_expired("qa", "pw").await);
        assert_eq!(tokens.expiry("qa", "pw").await, None);

        tokens.get_token("qa", "pw").await.unwrap();
        let start = *now.lock().unwrap();
        assert_eq!(tokens.expiry("qa", "pw").await, Some(start + Duration::seconds(10)));

        *now.lock().unwrap() += Duration::seconds(11);
        assert!(tokens.is_expired("qa", "pw").await);
    }

    #[tokio::test]
    async fn test_auth_failure_carries_status_and_body() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(401, json!({ "error": "invalid_grant" }));
        let (clock, _) = manual_clock();
        let tokens = cache(transport, clock);

        match tokens.get_token("qa", "wrong").await.unwrap_err() {
            Error::Auth { status, body, .. } => {
                assert_eq!(status, Some(401));
                assert_eq!(body["error"], "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!tokens.is_valid(&TokenCache::cache_key("qa", "wrong")).await);
    }

    #[tokio::test]
    async fn test_network_failure_and_missing_token_are_auth_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_error("connection refused")
            .push_json(200, json!({ "token_type": "Bearer", "expires_in": 60 }));
        let (clock, _) = manual_clock();
        let tokens = cache(transport, clock);

        let err = tokens.get_token("qa", "pw").await.unwrap_err();
        assert_eq!(err.kind(), "AUTH_ERROR");
        assert_eq!(err.status(), Some(500));

        let err = tokens.get_token("qa", "pw").await.unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_auth_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, token_reply("huge", 1_000_000_000_000_000))
            .push_json(200, token_reply("negative", -5));
        let (clock, _) = manual_clock();
        let tokens = cache(transport, clock);

        for _ in 0..2 {
            match tokens.get_token("qa", "pw").await.unwrap_err() {
                Error::Auth { status, message, .. } => {
                    assert_eq!(status, Some(200));
                    assert!(message.contains("Invalid expires_in"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(!tokens.is_valid(&TokenCache::cache_key("qa", "pw")).await);
    }

    #[tokio::test]
    async fn test_clear_all_forgets_every_pair() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, token_reply("a", 3600))
            .push_json(200, token_reply("b", 3600));
        let (clock, _) = manual_clock();
        let tokens = cache(transport, clock);

        tokens.get_token("u1", "p").await.unwrap();
        tokens.get_token("u2", "p").await.unwrap();
        tokens.clear_all().await;

        assert!(!tokens.is_valid("u1:p").await);
        assert!(!tokens.is_valid("u2:p").await);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let tokens = TokenCache::new(Arc::new(ScriptedTransport::new()), "https://a", "id", "topsecret");
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("https://a/token"));
    }
}
