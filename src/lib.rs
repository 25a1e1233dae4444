//! api-harness - BDD-driven API test harness
//!
//! This library provides the HTTP client boundary, bearer-token caching,
//! request services and the per-run report pipeline used by the
//! `api-harness` binary.

pub mod api;
pub mod auth;
pub mod common;
pub mod http;
pub mod report;

// Re-export commonly used types for tests
pub use common::{Error, Result};
