//! Requester abstraction
//!
//! Retrievers talk to the network through the [`Requester`] trait so that
//! transport can be swapped (tests use in-memory requesters).

use super::client::{join_url, HttpClient};
use crate::error::{Error, Result};
use crate::request::RequestOptions;
use crate::types::Method;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A fully built request
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Base URL of the API
    pub url_base: String,
    /// Path relative to the base, or an absolute URL
    pub path: String,
    /// Query, headers and body
    pub options: RequestOptions,
}

impl HttpRequest {
    /// Create a request
    pub fn new(method: Method, url_base: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            url_base: url_base.into(),
            path: path.into(),
            options: RequestOptions::default(),
        }
    }

    /// Attach options
    #[must_use]
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolved URL (a path override from the options wins)
    pub fn url(&self) -> String {
        let path = self.options.path.as_deref().unwrap_or(&self.path);
        let base = (!self.url_base.is_empty()).then_some(self.url_base.as_str());
        join_url(base, path)
    }
}

/// A response whose body has been read into memory
///
/// Extractors and paginators both inspect the same response by reference.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a 200 response with a body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a 200 response from a JSON value
    pub fn from_json(value: &Value) -> Self {
        Self::new(value.to_string())
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
        self
    }

    /// Parse the body as JSON
    ///
    /// An empty body parses as `null`.
    pub fn json(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::decode(format!("response is not valid JSON: {e}")))
    }

    /// Body as UTF-8 text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Headers as JSON for template interpolation
    ///
    /// Header names are lower-cased. A `Link` header is additionally exposed
    /// as `link.<rel>.url`.
    pub fn headers_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.headers {
            if let Ok(v) = value.to_str() {
                map.insert(name.as_str().to_string(), Value::String(v.to_string()));
            }
        }
        if let Some(link) = self.header("link") {
            let rels: serde_json::Map<String, Value> = parse_link_header(link)
                .into_iter()
                .map(|(rel, url)| (rel, serde_json::json!({ "url": url })))
                .collect();
            map.insert("link".to_string(), Value::Object(rels));
        }
        Value::Object(map)
    }
}

/// Parse an RFC 5988 `Link` header into `rel -> url`
pub fn parse_link_header(header: &str) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();

    // Link header format: <url>; rel="next", <url>; rel="prev"
    for part in header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.trim().split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(stripped) = segment.strip_prefix("rel=") {
                rel = Some(stripped.trim_matches('"').trim_matches('\''));
            }
        }

        if let (Some(u), Some(r)) = (url, rel) {
            for r in r.split_whitespace() {
                links.insert(r.to_string(), u.to_string());
            }
        }
    }

    links
}

/// Sends requests on behalf of a retriever
#[async_trait]
pub trait Requester: std::fmt::Debug + Send + Sync {
    /// Send a request and read the full response
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Requester`] backed by [`HttpClient`]
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: Arc<HttpClient>,
}

impl HttpRequester {
    /// Wrap a client
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }

    /// Underlying client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        debug!(method = ?request.method, url = %request.url(), "Sending request");
        self.client.execute(request).await
    }
}
