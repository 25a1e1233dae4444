//! Request services used by the step definitions

mod email_auth;
mod request_service;

pub use email_auth::{EmailAuthService, DEFAULT_ENDPOINT_PATH};
pub use request_service::{Query, RequestService};
