//! HTTP client module
//!
//! Provides HTTP client with retry, rate limiting, and backoff strategies,
//! plus the [`Requester`] seam used by retrievers.
//!
//! # Features
//!
//! - **Automatic Retries**: Configurable retry logic with backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Backoff Strategies**: Constant, linear, and exponential backoff
//! - **Buffered Responses**: [`HttpResponse`] holds the body so extractor and
//!   paginator can both read it

mod client;
mod rate_limit;
mod requester;

pub use client::{join_url, HttpClient, HttpClientConfig, RetryPolicy};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use requester::{parse_link_header, HttpRequest, HttpRequester, HttpResponse, Requester};
