//! Normalized API responses

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::common::{HttpError, Result};

/// Status, body and headers of a completed request
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    pub headers: BTreeMap<String, String>,
    pub received_at: DateTime<Utc>,
}

impl ApiResponse {
    pub fn new<I, K, V>(status: u16, body: Value, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            body,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            received_at: Utc::now(),
        }
    }

    /// Response with a JSON body and no headers
    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, body, std::iter::empty::<(&str, String)>())
    }

    /// Turn a non-2xx response into `Error::Http`
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpError {
            message: format!("Request failed with status code {}", self.status),
            status: self.status,
            body: self.body,
            headers: self.headers,
        }
        .into())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Top-level field of an object body
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_object().and_then(|obj| obj.get(name))
    }

    /// Check the status and, optionally, exact top-level field values
    pub fn validate(&self, expected_status: u16, expected_fields: Option<&Map<String, Value>>) -> bool {
        if self.status != expected_status {
            return false;
        }
        expected_fields
            .into_iter()
            .flatten()
            .all(|(key, expected)| self.field(key) == Some(expected))
    }

    /// Records carried by a successful response
    ///
    /// An array body is the record list; otherwise a `data` array inside an
    /// object; otherwise the object itself is a single record.
    pub fn records(&self) -> Vec<&Value> {
        if !self.is_success() {
            return Vec::new();
        }
        match &self.body {
            Value::Array(items) => items.iter().collect(),
            Value::Object(obj) => match obj.get("data") {
                Some(Value::Array(items)) => items.iter().collect(),
                _ => vec![&self.body],
            },
            _ => Vec::new(),
        }
    }

    pub fn has_data(&self) -> bool {
        !self.records().is_empty()
    }
}

impl fmt::Display for ApiResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = serde_json::json!({
            "status": self.status,
            "data": self.body,
            "timestamp": self.received_at.to_rfc3339(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{} {}", self.status, self.body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use serde_json::json;

    #[test]
    fn test_status_classes() {
        assert!(ApiResponse::json(204, Value::Null).is_success());
        assert!(ApiResponse::json(404, Value::Null).is_client_error());
        assert!(ApiResponse::json(503, Value::Null).is_server_error());
        assert!(!ApiResponse::json(302, Value::Null).is_success());
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let response = ApiResponse::new(200, Value::Null, [("Content-Type", "application/json")]);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_validate_fields() {
        let response = ApiResponse::json(200, json!({ "id": 7, "name": "Physics" }));
        let expected = json!({ "id": 7 });
        assert!(response.validate(200, expected.as_object()));
        assert!(response.validate(200, None));
        assert!(!response.validate(201, None));

        let wrong = json!({ "id": "7" });
        assert!(!response.validate(200, wrong.as_object()));
    }

    #[test]
    fn test_records_shapes() {
        let list = ApiResponse::json(200, json!([{ "id": 1 }, { "id": 2 }]));
        assert_eq!(list.records().len(), 2);

        let wrapped = ApiResponse::json(200, json!({ "data": [{ "id": 1 }] }));
        assert_eq!(wrapped.records(), vec![&json!({ "id": 1 })]);

        let single = ApiResponse::json(200, json!({ "id": 1 }));
        assert_eq!(single.records().len(), 1);

        let empty = ApiResponse::json(200, json!([]));
        assert!(!empty.has_data());

        let failed = ApiResponse::json(500, json!([{ "id": 1 }]));
        assert!(!failed.has_data());
    }

    #[test]
    fn test_error_for_status() {
        let ok = ApiResponse::json(201, json!({})).error_for_status();
        assert!(ok.is_ok());

        let err = ApiResponse::new(401, json!({ "error": "expired" }), [("WWW-Authenticate", "Bearer")])
            .error_for_status()
            .unwrap_err();
        match err {
            Error::Http(http) => {
                assert_eq!(http.status, 401);
                assert_eq!(http.body["error"], "expired");
                assert_eq!(http.headers.get("www-authenticate").map(String::as_str), Some("Bearer"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
