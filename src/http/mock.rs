//! Scripted transport for tests
//!
//! Replies are queued ahead of time and handed out in order. Every request
//! is recorded so tests can assert on what was sent.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiRequest, ApiResponse, Transport};
use crate::common::{Error, HttpError, Result};

enum Reply {
    Response(ApiResponse),
    Failure(String),
}

/// A [`Transport`] that replays queued responses
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: ApiResponse) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Reply::Response(response));
        self
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(ApiResponse::json(status, body))
    }

    /// Queue a transport-level failure (no response received)
    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Reply::Failure(message.into()));
        self
    }

    /// Requests sent so far, oldest first
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Replies not yet consumed
    pub fn pending(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match reply {
            Some(Reply::Response(response)) => response.error_for_status(),
            Some(Reply::Failure(message)) => Err(HttpError::network(message).into()),
            None => Err(Error::Internal(format!(
                "No scripted reply for {} {}",
                request.method, request.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_replies_in_order_and_records_requests() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({ "n": 1 }))
            .push_json(404, json!({ "error": "missing" }))
            .push_error("connection reset");

        let first = transport.send(ApiRequest::new(Method::Get, "/a")).await.unwrap();
        assert_eq!(first.body["n"], 1);

        let second = transport.send(ApiRequest::new(Method::Get, "/b")).await.unwrap_err();
        assert_eq!(second.status(), Some(404));

        let third = transport.send(ApiRequest::new(Method::Get, "/c")).await.unwrap_err();
        assert_eq!(third.status(), Some(500));

        let unscripted = transport.send(ApiRequest::new(Method::Get, "/d")).await.unwrap_err();
        assert!(matches!(unscripted, Error::Internal(_)));

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["/a", "/b", "/c", "/d"]);
        assert_eq!(transport.pending(), 0);
    }
}
