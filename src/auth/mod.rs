//! Authentication module
//!
//! Supports: API Key, Basic, Bearer, OAuth2 (client credentials, refresh token)
//!
//! The `Authenticator` contributes [`RequestOptions`](crate::request::RequestOptions)
//! to every outgoing request and caches tokens for the OAuth2 flows.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{
    AuthConfig, CachedToken, Location, OAuth2Config, OAuth2Grant, DEFAULT_ACCESS_TOKEN_NAME,
    DEFAULT_EXPIRES_IN_NAME,
};

#[cfg(test)]
mod tests;
