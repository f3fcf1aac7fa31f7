use super::*;
use base64::Engine;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_url(server: &MockServer) -> String {
    format!("{}/oauth/token", server.uri())
}

fn client_credentials(server: &MockServer) -> Authenticator {
    Authenticator::new(AuthConfig::OAuth2(
        OAuth2Config::client_credentials(token_url(server), "my-client", "my-secret")
            .with_scopes(vec!["read".to_string(), "write".to_string()]),
    ))
}

async fn authorization(auth: &Authenticator) -> Option<String> {
    auth.request_options()
        .await
        .unwrap()
        .headers
        .get("Authorization")
        .cloned()
}

async fn mount_token(server: &MockServer, body: serde_json::Value, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ============================================================================
// Static credentials
// ============================================================================

#[tokio::test]
async fn test_none_adds_nothing() {
    let options = Authenticator::none().request_options().await.unwrap();
    assert!(options.is_empty());
}

#[tokio::test]
async fn test_api_key_locations() {
    let header = Authenticator::new(AuthConfig::ApiKey {
        location: Location::Header,
        field_name: "Authorization".to_string(),
        prefix: Some("Token ".to_string()),
        value: "k1".to_string(),
    });
    assert_eq!(authorization(&header).await.as_deref(), Some("Token k1"));

    let query = Authenticator::new(AuthConfig::ApiKey {
        location: Location::Query,
        field_name: "apikey".to_string(),
        prefix: None,
        value: "k2".to_string(),
    });
    let options = query.request_options().await.unwrap();
    assert_eq!(options.params.get("apikey").map(String::as_str), Some("k2"));
    assert!(options.headers.is_empty());
}

#[tokio::test]
async fn test_basic_and_bearer() {
    let basic = Authenticator::new(AuthConfig::Basic {
        username: "user".to_string(),
        password: "pass".to_string(),
    });
    let encoded = base64::engine::general_purpose::STANDARD.encode("user:pass");
    assert_eq!(authorization(&basic).await, Some(format!("Basic {encoded}")));

    let bearer = Authenticator::new(AuthConfig::Bearer {
        token: "abc".to_string(),
    });
    assert_eq!(authorization(&bearer).await.as_deref(), Some("Bearer abc"));
    assert!(!bearer.config().needs_token());
    assert_eq!(bearer.refresh_token().await, None);
}

// ============================================================================
// OAuth2
// ============================================================================

#[tokio::test]
async fn test_client_credentials_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=my-client"))
        .and(body_string_contains("client_secret=my-secret"))
        .and(body_string_contains("scope=read+write"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "cc-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let auth = client_credentials(&server);
    assert!(auth.config().needs_token());
    assert_eq!(authorization(&auth).await.as_deref(), Some("Bearer cc-token"));
}

#[tokio::test]
async fn test_token_cached_across_clones() {
    let server = MockServer::start().await;
    mount_token(&server, json!({"access_token": "t", "expires_in": 3600}), 1).await;

    let auth = client_credentials(&server);
    let clone = auth.clone();
    authorization(&auth).await;
    authorization(&clone).await;
    authorization(&auth).await;
}

#[tokio::test]
async fn test_expired_token_refetched() {
    let server = MockServer::start().await;
    // Lifetime inside the expiry margin
    mount_token(&server, json!({"access_token": "t", "expires_in": 5}), 2).await;

    let auth = client_credentials(&server);
    authorization(&auth).await;
    authorization(&auth).await;
}

#[tokio::test]
async fn test_clear_cache() {
    let server = MockServer::start().await;
    mount_token(&server, json!({"access_token": "t", "expires_in": 3600}), 2).await;

    let auth = client_credentials(&server);
    authorization(&auth).await;
    auth.clear_cache().await;
    authorization(&auth).await;
}

#[tokio::test]
async fn test_refresh_token_rotation() {
    let server = MockServer::start().await;
    Mock::given(body_string_contains("refresh_token=initial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "first",
            "refresh_token": "rotated",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(body_string_contains("refresh_token=rotated"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "second",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = Authenticator::new(AuthConfig::OAuth2(OAuth2Config::refresh_token(
        token_url(&server),
        "client",
        "secret",
        "initial",
    )));
    assert_eq!(auth.refresh_token().await.as_deref(), Some("initial"));

    assert_eq!(authorization(&auth).await.as_deref(), Some("Bearer first"));
    assert_eq!(auth.refresh_token().await.as_deref(), Some("rotated"));

    auth.clear_cache().await;
    assert_eq!(authorization(&auth).await.as_deref(), Some("Bearer second"));
    assert_eq!(auth.refresh_token().await.as_deref(), Some("rotated"));
}

#[tokio::test]
async fn test_custom_token_fields_and_body() {
    let server = MockServer::start().await;
    Mock::given(body_string_contains("audience=api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "token": "nested" },
            "ttl": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let oauth = OAuth2Config::client_credentials(token_url(&server), "c", "s")
        .with_token_fields("data.token", "ttl")
        .with_body_param("audience", "api");
    let auth = Authenticator::new(AuthConfig::OAuth2(oauth));

    assert_eq!(authorization(&auth).await.as_deref(), Some("Bearer nested"));
    authorization(&auth).await;
}

#[tokio::test]
async fn test_missing_access_token_field() {
    let server = MockServer::start().await;
    mount_token(&server, json!({"token": "wrong-name"}), 1).await;

    let err = client_credentials(&server)
        .request_options()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("access_token"));
}

#[tokio::test]
async fn test_token_endpoint_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})))
        .mount(&server)
        .await;

    let err = client_credentials(&server)
        .request_options()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("401"));
    assert!(err.to_string().contains("invalid_client"));
}

#[test]
fn test_cached_token_expiry() {
    assert!(!CachedToken::expires_in("t".to_string(), 3600).is_expired());
    assert!(CachedToken::expires_in("t".to_string(), 10).is_expired());
    assert!(CachedToken::expires_in("t".to_string(), -100).is_expired());
    assert!(!CachedToken::new("t".to_string(), None).is_expired());
}
