//! Auth configuration types
//!
//! These types represent the runtime auth configuration after template
//! interpolation has been applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default name of the access token in a token response
pub const DEFAULT_ACCESS_TOKEN_NAME: &str = "access_token";

/// Default name of the lifetime (seconds) in a token response
pub const DEFAULT_EXPIRES_IN_NAME: &str = "expires_in";

/// Tokens are refreshed this long before they expire
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Where a credential is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// HTTP header
    #[default]
    Header,
    /// Query parameter
    Query,
}

/// Authentication configuration (after template interpolation)
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthConfig {
    /// No authentication required
    #[default]
    None,

    /// Static key in a header or query parameter
    ApiKey {
        /// Where to place the key
        location: Location,
        /// Header or query parameter name
        field_name: String,
        /// Prefix before the value (e.g. "Token ")
        prefix: Option<String>,
        /// The key
        value: String,
    },

    /// HTTP Basic authentication
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },

    /// Static bearer token
    Bearer {
        /// The token
        token: String,
    },

    /// Bearer token obtained from an OAuth2 token endpoint
    OAuth2(OAuth2Config),
}

impl AuthConfig {
    /// Whether this config needs a token fetched over the network
    pub fn needs_token(&self) -> bool {
        matches!(self, Self::OAuth2(_))
    }
}

/// OAuth2 grant used to obtain access tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuth2Grant {
    /// `grant_type=client_credentials`
    ClientCredentials,
    /// `grant_type=refresh_token`; the endpoint may rotate the token
    RefreshToken(String),
}

/// OAuth2 token endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Config {
    /// Token endpoint URL
    pub token_url: String,
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Grant type
    pub grant: OAuth2Grant,
    /// Requested scopes, space-joined into `scope`
    pub scopes: Vec<String>,
    /// Extra form fields for the token request
    pub extra_body: BTreeMap<String, String>,
    /// Dotted path of the access token in the response
    pub access_token_name: String,
    /// Dotted path of the token lifetime in the response
    pub expires_in_name: String,
}

impl OAuth2Config {
    fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        grant: OAuth2Grant,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant,
            scopes: Vec::new(),
            extra_body: BTreeMap::new(),
            access_token_name: DEFAULT_ACCESS_TOKEN_NAME.to_string(),
            expires_in_name: DEFAULT_EXPIRES_IN_NAME.to_string(),
        }
    }

    /// Client credentials grant
    pub fn client_credentials(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::new(token_url, client_id, client_secret, OAuth2Grant::ClientCredentials)
    }

    /// Refresh token grant
    pub fn refresh_token(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self::new(
            token_url,
            client_id,
            client_secret,
            OAuth2Grant::RefreshToken(refresh_token.into()),
        )
    }

    /// Request scopes
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Add an extra form field to the token request
    #[must_use]
    pub fn with_body_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_body.insert(key.into(), value.into());
        self
    }

    /// Read the token and its lifetime from non-standard response fields
    #[must_use]
    pub fn with_token_fields(
        mut self,
        access_token_name: impl Into<String>,
        expires_in_name: impl Into<String>,
    ) -> Self {
        self.access_token_name = access_token_name.into();
        self.expires_in_name = expires_in_name.into();
        self
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        Self::new(token, Some(Utc::now() + chrono::Duration::seconds(seconds)))
    }

    /// Whether the token is expired or about to expire
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) >= expires_at
        })
    }
}
