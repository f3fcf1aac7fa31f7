//! Buffered HTTP execution with retries and throttling
//!
//! Timeouts, connection failures and retryable statuses are retried on a
//! [`RetryPolicy`]; a 429 waits for its `Retry-After` instead.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::requester::{HttpRequest, HttpResponse};
use crate::error::{Error, Result};
use crate::template::value_to_string;
use crate::types::BackoffType;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffType,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffType::Exponential,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Same delay before every retry
    pub fn constant(delay: Duration) -> Self {
        Self {
            backoff: BackoffType::Constant,
            base_delay: delay,
            max_delay: delay,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffType, base: Duration, max: Duration) -> Self {
        self.backoff = backoff;
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Delay before retry number `retry` (zero-based)
    pub fn delay(&self, retry: u32) -> Duration {
        let delay = match self.backoff {
            BackoffType::Constant => self.base_delay,
            BackoffType::Linear => self.base_delay.saturating_mul(retry.saturating_add(1)),
            BackoffType::Exponential => self.base_delay.saturating_mul(2u32.saturating_pow(retry)),
        };
        delay.min(self.max_delay)
    }
}

/// Settings shared by every request of one client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Resolves requests that carry no base URL of their own
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// No throttling when unset
    pub rate_limit: Option<RateLimiterConfig>,
    pub default_headers: BTreeMap<String, String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: None,
            default_headers: BTreeMap::new(),
            user_agent: format!("solidafy-lowcode/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Header sent with every request; request headers override it
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }
}

/// What to do after one attempt
#[derive(Debug)]
enum Attempt {
    /// Final response
    Done(HttpResponse),
    /// Sleep and try again; `error` is reported if retries run out
    Retry { delay: Duration, error: Error },
    /// Give up
    Fail(Error),
}

/// Shared HTTP client; one per source
pub struct HttpClient {
    inner: Client,
    config: HttpClientConfig,
    throttle: Option<RateLimiter>,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let inner = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        let throttle = config.rate_limit.as_ref().map(RateLimiter::new);
        Ok(Self {
            inner,
            config,
            throttle,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub fn has_rate_limiter(&self) -> bool {
        self.throttle.is_some()
    }

    /// Send a request, retrying transient failures, and buffer the body
    ///
    /// A request without a `url_base` is resolved against the configured
    /// base URL.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = if request.url_base.is_empty() {
            join_url(self.config.base_url.as_deref(), request.url().as_str())
        } else {
            request.url()
        };
        let max_retries = self.config.retry.max_retries;
        let mut attempt = 0;

        loop {
            if let Some(throttle) = &self.throttle {
                throttle.wait().await;
            }

            match self.attempt(request, &url, attempt).await {
                Attempt::Done(response) => {
                    debug!(
                        method = ?request.method,
                        url = %url,
                        status = response.status,
                        "Request succeeded"
                    );
                    return Ok(response);
                }
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry { error, .. } if attempt >= max_retries => return Err(error),
                Attempt::Retry { delay, error } => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, request: &HttpRequest, url: &str, attempt: u32) -> Attempt {
        let builder = self.build(request, url);
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Attempt::Retry {
                    delay: self.config.retry.delay(attempt),
                    error: Error::Timeout {
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    },
                }
            }
            Err(e) if e.is_connect() => {
                return Attempt::Retry {
                    delay: self.config.retry.delay(attempt),
                    error: Error::Http(e),
                }
            }
            Err(e) => return Attempt::Fail(Error::Http(e)),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = extract_retry_after(&response);
            return Attempt::Retry {
                delay: Duration::from_secs(retry_after),
                error: Error::RateLimited {
                    retry_after_seconds: retry_after,
                },
            };
        }
        if is_retryable_status(status) {
            return Attempt::Retry {
                delay: self.config.retry.delay(attempt),
                error: Error::http_status(status.as_u16(), ""),
            };
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Fail(Error::http_status(status.as_u16(), body));
        }

        let headers = response.headers().clone();
        match response.bytes().await {
            Ok(body) => Attempt::Done(HttpResponse {
                status: status.as_u16(),
                headers,
                body,
            }),
            Err(e) => Attempt::Fail(Error::Http(e)),
        }
    }

    fn build(&self, request: &HttpRequest, url: &str) -> RequestBuilder {
        let options = &request.options;
        let mut req = self.inner.request(request.method.into(), url);

        for (key, value) in self.config.default_headers.iter().chain(&options.headers) {
            req = req.header(key.as_str(), value.as_str());
        }

        if !options.params.is_empty() {
            req = req.query(&options.params);
        }

        if !options.body_json.is_empty() {
            req = req.json(&Value::Object(options.body_json.clone()));
        } else if !options.body_data.is_empty() {
            let fields: Vec<(&str, String)> = options
                .body_data
                .iter()
                .map(|(k, v)| (k.as_str(), value_to_string(v)))
                .collect();
            req = req.form(&fields);
        }

        req
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("retry", &self.config.retry)
            .field("throttled", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolve `path` against `base`; absolute URLs pass through
pub fn join_url(base: Option<&str>, path: &str) -> String {
    let absolute = path.starts_with("http://") || path.starts_with("https://");
    match base {
        _ if absolute => path.to_string(),
        None => path.to_string(),
        Some(base) if path.is_empty() => base.to_string(),
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
    }
}

/// Statuses worth another attempt; 52x are CDN-side origin failures
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504 | 520..=524)
}

/// Seconds from `Retry-After`, one minute when absent or unparsable
fn extract_retry_after(response: &Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(60)
}
