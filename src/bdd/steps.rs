//! Step definitions for the API feature files

use cucumber::{given, then, when};
use serde_json::Value;

use super::world::ApiWorld;
use api_harness::common::{Error, Result};
use api_harness::http::Method;

/// Unwrap a step result, recording the error on the world before failing
fn check<T>(world: &mut ApiWorld, result: Result<T>) -> T {
    match world.track(result) {
        Ok(value) => value,
        Err(e) => panic!("[{}] {}", e.kind(), e),
    }
}

fn not_ready(service: &str) -> Error {
    Error::Config(format!("{service} is not available in this environment"))
}

/// A literal path, or the `endpoints.<name>` entry of the configuration
fn endpoint_path(world: &ApiWorld, name: &str) -> Result<String> {
    if name.starts_with('/') {
        return Ok(name.to_string());
    }
    world
        .config()?
        .value(&format!("endpoints.{name}"))
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| Error::Config(format!("Endpoint '{name}' is not configured")))
}

/// Test data parsed as JSON when possible, else kept as a string
fn data_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[given(regex = r"^an email JWT token is generated$")]
pub async fn email_token_generated(world: &mut ApiWorld) {
    let result = match world.email_auth.as_mut() {
        Some(service) => service.authenticate(None).await,
        None => Err(not_ready("E-mail authentication")),
    };
    let token = check(world, result);
    world.store_test_data("jwt", Value::String(token));
}

#[given(regex = r"^I am authenticated as the configured user$")]
pub async fn authenticated_as_configured_user(world: &mut ApiWorld) {
    let setup = world.setup_auth();
    check(world, setup);
    let result = match world.requests.as_mut() {
        Some(requests) => requests.auth_mut().bearer_token().await,
        None => Err(not_ready("Token authentication")),
    };
    check(world, result);
}

#[given(regex = r#"^the test data "([^"]*)" is "([^"]*)"$"#)]
pub async fn test_data_is(world: &mut ApiWorld, key: String, value: String) {
    world.store_test_data(key, data_value(&value));
}

#[when(regex = r#"^I request the "([^"]*)" endpoint with the token$"#)]
pub async fn request_endpoint_with_token(world: &mut ApiWorld, name: String) {
    let path = endpoint_path(world, &name);
    let path = check(world, path);
    let token = world
        .test_data("jwt")
        .and_then(Value::as_str)
        .map(str::to_string);
    let result = match world.email_auth.as_ref() {
        Some(service) => service.get_endpoint(token.as_deref(), Some(&path)).await,
        None => Err(not_ready("E-mail authentication")),
    };
    let result = world.remember(result);
    check(world, result);
}

#[when(regex = r#"^I send an authenticated (GET|POST|PUT|DELETE|PATCH) request to "([^"]*)"$"#)]
pub async fn send_authenticated_request(world: &mut ApiWorld, method: String, endpoint: String) {
    send(world, &method, &endpoint, None).await;
}

#[when(regex = r#"^I send an authenticated (POST|PUT|PATCH) request to "([^"]*)" with the test data$"#)]
pub async fn send_authenticated_request_with_data(
    world: &mut ApiWorld,
    method: String,
    endpoint: String,
) {
    let body = Value::Object(world.test_data.clone().into_iter().collect());
    send(world, &method, &endpoint, Some(body)).await;
}

async fn send(world: &mut ApiWorld, method: &str, endpoint: &str, body: Option<Value>) {
    let method = check(world, method.parse::<Method>());
    let path = endpoint_path(world, endpoint);
    let path = check(world, path);
    let result = match world.requests.as_mut() {
        Some(requests) => requests.request_with_retry(method, &path, body, &[]).await,
        None => Err(not_ready("Token authentication")),
    };
    let result = world.remember(result);
    check(world, result);
}

#[then(regex = r"^the response status should be (\d+)$")]
pub async fn response_status_should_be(world: &mut ApiWorld, expected: u16) {
    let status = world.response().map(|r| r.status);
    let status = check(world, status);
    if status != expected {
        let failure = Err(Error::assertion(format!(
            "expected status {expected}, got {status}"
        )));
        check::<()>(world, failure);
    }
}

#[then(regex = r"^the response payload is logged$")]
pub async fn response_payload_logged(world: &mut ApiWorld) {
    let response = world.response().map(ToString::to_string);
    let text = check(world, response);
    tracing::info!("Response payload:\n{}", text);
}

#[then(regex = r#"^the response field "([^"]*)" should equal (-?\d+)$"#)]
pub async fn response_field_equals_number(world: &mut ApiWorld, field: String, expected: i64) {
    assert_field(world, &field, Value::from(expected));
}

#[then(regex = r#"^the response field "([^"]*)" should equal "([^"]*)"$"#)]
pub async fn response_field_equals_text(world: &mut ApiWorld, field: String, expected: String) {
    assert_field(world, &field, Value::String(expected));
}

fn assert_field(world: &mut ApiWorld, field: &str, expected: Value) {
    let actual = world.response().map(|r| r.field(field).cloned());
    let actual = check(world, actual);
    if actual.as_ref() != Some(&expected) {
        let failure = Err(Error::assertion(format!(
            "expected field '{field}' to equal {expected}, got {}",
            actual.map_or_else(|| "nothing".to_string(), |v| v.to_string())
        )));
        check::<()>(world, failure);
    }
}

#[then(regex = r"^the response should contain records$")]
pub async fn response_contains_records(world: &mut ApiWorld) {
    let count = world.response().map(|r| r.records().len());
    let count = check(world, count);
    if count == 0 {
        check::<()>(world, Err(Error::assertion("response contains no records")));
    }
    tracing::info!("Response contains {} record(s)", count);
}
