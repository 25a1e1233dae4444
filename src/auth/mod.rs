//! Bearer token authentication
//!
//! [`TokenCache`] owns the tokens; [`AuthHandler`] binds one user to the
//! cache and produces request headers.

mod handler;
mod token_cache;

pub use handler::AuthHandler;
pub use token_cache::{TokenCache, TokenEntry, DEFAULT_REFRESH_THRESHOLD_MS};
