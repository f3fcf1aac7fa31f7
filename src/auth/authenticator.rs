//! Authenticator implementation
//!
//! Turns an [`AuthConfig`] into request options and manages token refresh.

use super::types::{AuthConfig, CachedToken, Location, OAuth2Config, OAuth2Grant};
use crate::error::{Error, Result};
use crate::request::RequestOptions;
use crate::template::get_nested_value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Token cache of an OAuth2 authenticator
#[derive(Debug, Default)]
struct TokenState {
    access: Option<CachedToken>,
    /// Latest refresh token when the endpoint rotated it
    rotated_refresh: Option<String>,
}

/// Authenticator contributes credentials to outgoing requests
///
/// Clones share one token cache, so a token is fetched once for all
/// retrievers of a source.
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: AuthConfig,
    tokens: Arc<Mutex<TokenState>>,
    http_client: Client,
}

impl Authenticator {
    /// Create a new authenticator with the given config
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Create an authenticator with a custom HTTP client
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            tokens: Arc::new(Mutex::new(TokenState::default())),
            http_client,
        }
    }

    /// Authenticator that adds nothing
    pub fn none() -> Self {
        Self::new(AuthConfig::None)
    }

    /// Get the current auth config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Request options carrying the credentials
    pub async fn request_options(&self) -> Result<RequestOptions> {
        let options = RequestOptions::new();
        Ok(match &self.config {
            AuthConfig::None => options,
            AuthConfig::ApiKey {
                location,
                field_name,
                prefix,
                value,
            } => {
                let value = format!("{}{value}", prefix.as_deref().unwrap_or(""));
                match location {
                    Location::Header => options.with_header(field_name, value),
                    Location::Query => options.with_param(field_name, value),
                }
            }
            AuthConfig::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                options.with_header("Authorization", format!("Basic {encoded}"))
            }
            AuthConfig::Bearer { token } => {
                options.with_header("Authorization", format!("Bearer {token}"))
            }
            AuthConfig::OAuth2(oauth) => {
                let token = self.access_token(oauth).await?;
                options.with_header("Authorization", format!("Bearer {token}"))
            }
        })
    }

    /// Refresh token currently in use, if the grant has one
    pub async fn refresh_token(&self) -> Option<String> {
        let AuthConfig::OAuth2(OAuth2Config {
            grant: OAuth2Grant::RefreshToken(initial),
            ..
        }) = &self.config
        else {
            return None;
        };
        let tokens = self.tokens.lock().await;
        Some(tokens.rotated_refresh.clone().unwrap_or_else(|| initial.clone()))
    }

    /// Drop the cached access token
    pub async fn clear_cache(&self) {
        self.tokens.lock().await.access = None;
    }

    /// A valid access token; concurrent callers wait for a single fetch
    async fn access_token(&self, oauth: &OAuth2Config) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.access.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let body = self.token_request(oauth, &tokens).await?;
        let token = parse_token_response(oauth, &body)?;

        if matches!(oauth.grant, OAuth2Grant::RefreshToken(_)) {
            if let Some(rotated) = body.get("refresh_token").and_then(Value::as_str) {
                info!(token_url = %oauth.token_url, "Refresh token rotated");
                tokens.rotated_refresh = Some(rotated.to_string());
            }
        }

        let access = token.token.clone();
        tokens.access = Some(token);
        Ok(access)
    }

    async fn token_request(&self, oauth: &OAuth2Config, tokens: &TokenState) -> Result<Value> {
        let mut form = vec![
            ("client_id".to_string(), oauth.client_id.clone()),
            ("client_secret".to_string(), oauth.client_secret.clone()),
        ];
        match &oauth.grant {
            OAuth2Grant::ClientCredentials => {
                form.push(("grant_type".to_string(), "client_credentials".to_string()));
            }
            OAuth2Grant::RefreshToken(initial) => {
                let refresh = tokens.rotated_refresh.as_ref().unwrap_or(initial);
                form.push(("grant_type".to_string(), "refresh_token".to_string()));
                form.push(("refresh_token".to_string(), refresh.clone()));
            }
        }
        if !oauth.scopes.is_empty() {
            form.push(("scope".to_string(), oauth.scopes.join(" ")));
        }
        form.extend(oauth.extra_body.iter().map(|(k, v)| (k.clone(), v.clone())));

        debug!(token_url = %oauth.token_url, "Requesting OAuth2 token");

        let response = self
            .http_client
            .post(&oauth.token_url)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::none()
    }
}

/// Read the access token and its lifetime from a token response
///
/// The lifetime may be a number or a numeric string; a missing lifetime
/// means the token never expires.
fn parse_token_response(oauth: &OAuth2Config, body: &Value) -> Result<CachedToken> {
    let lookup = |name: &str| {
        let path: Vec<&str> = name.split('.').collect();
        get_nested_value(body, &path)
    };

    let token = lookup(&oauth.access_token_name)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::auth(format!(
                "Token response has no '{}' field",
                oauth.access_token_name
            ))
        })?
        .to_string();

    let expires_in = lookup(&oauth.expires_in_name).and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    Ok(match expires_in {
        Some(seconds) => CachedToken::expires_in(token, seconds),
        None => CachedToken::new(token, None),
    })
}
