//! Pagination strategy implementations
//!
//! Each strategy computes the next page token from a completed page. The
//! computation never mutates the strategy; the paginator commits a token
//! through [`PaginationStrategy::advance`].

use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::template::{evaluate_condition, render, render_to_value, TemplateContext};
use crate::types::NextPageToken;
use serde_json::Value;
use std::fmt::Debug;

/// Everything a strategy may look at when computing the next token
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    /// Response of the page just read
    pub response: &'a HttpResponse,
    /// Number of records extracted from that page
    pub last_page_size: usize,
    /// Last record of that page
    pub last_record: Option<&'a Value>,
    /// Token used to request that page
    pub last_page_token: Option<&'a NextPageToken>,
}

/// Computes next page tokens
pub trait PaginationStrategy: Debug + Send + Sync {
    /// Token for the first request, if one should be injected
    fn initial_token(&self) -> Option<NextPageToken>;

    /// Token for the page following the one described by `page`
    ///
    /// `None` means there are no further pages. Calling this twice with the
    /// same input yields the same output.
    fn next_page_token(&self, page: &PageContext<'_>) -> Result<Option<NextPageToken>>;

    /// Commit a token returned by [`next_page_token`](Self::next_page_token)
    fn advance(&mut self, token: &NextPageToken);

    /// Return to the initial position
    fn reset(&mut self);

    /// Configured page size
    fn page_size(&self) -> Option<i64>;

    /// Clone into a box
    fn clone_box(&self) -> Box<dyn PaginationStrategy>;
}

impl Clone for Box<dyn PaginationStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Resolve a page size that is either an integer or a template
///
/// Templates are rendered against `ctx` (normally just `config`). Anything
/// that does not evaluate to a positive integer is a configuration error.
pub fn resolve_page_size(value: &Value, ctx: &TemplateContext) -> Result<i64> {
    let size = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => render(s, ctx)?.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        Error::invalid_value("page_size", format!("{value} does not evaluate to an integer"))
    })?;

    validate_page_size(size)
}

fn validate_page_size(size: i64) -> Result<i64> {
    if size <= 0 {
        return Err(Error::invalid_value(
            "page_size",
            format!("must be positive, got {size}"),
        ));
    }
    Ok(size)
}

/// Short or empty page
fn is_last_page(last_page_size: usize, page_size: Option<i64>) -> bool {
    last_page_size == 0 || page_size.is_some_and(|ps| (last_page_size as i64) < ps)
}

// ============================================================================
// Offset Increment
// ============================================================================

/// Offset-based pagination (`?offset=100&limit=50`)
///
/// The offset advances by the configured page size. Without a page size it
/// advances by the number of records on the page and only an empty page
/// stops.
#[derive(Debug, Clone)]
pub struct OffsetIncrement {
    page_size: Option<i64>,
    inject_on_first_request: bool,
    offset: i64,
}

impl OffsetIncrement {
    /// Create an offset strategy
    pub fn new(page_size: Option<i64>, inject_on_first_request: bool) -> Result<Self> {
        let page_size = page_size.map(validate_page_size).transpose()?;
        Ok(Self {
            page_size,
            inject_on_first_request,
            offset: 0,
        })
    }

    /// Current committed offset
    pub fn offset(&self) -> i64 {
        self.offset
    }
}

impl PaginationStrategy for OffsetIncrement {
    fn initial_token(&self) -> Option<NextPageToken> {
        self.inject_on_first_request
            .then_some(NextPageToken::Int(self.offset))
    }

    fn next_page_token(&self, page: &PageContext<'_>) -> Result<Option<NextPageToken>> {
        if is_last_page(page.last_page_size, self.page_size) {
            return Ok(None);
        }
        let step = self.page_size.unwrap_or(page.last_page_size as i64);
        Ok(Some(NextPageToken::Int(self.offset + step)))
    }

    fn advance(&mut self, token: &NextPageToken) {
        if let Some(offset) = token.as_i64() {
            self.offset = offset;
        }
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    fn page_size(&self) -> Option<i64> {
        self.page_size
    }

    fn clone_box(&self) -> Box<dyn PaginationStrategy> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Page Increment
// ============================================================================

/// Page number pagination (`?page=2&per_page=50`)
#[derive(Debug, Clone)]
pub struct PageIncrement {
    page_size: Option<i64>,
    start_from_page: i64,
    inject_on_first_request: bool,
    page: i64,
}

impl PageIncrement {
    /// Create a page strategy
    pub fn new(
        page_size: Option<i64>,
        start_from_page: i64,
        inject_on_first_request: bool,
    ) -> Result<Self> {
        let page_size = page_size.map(validate_page_size).transpose()?;
        Ok(Self {
            page_size,
            start_from_page,
            inject_on_first_request,
            page: start_from_page,
        })
    }

    /// Current committed page
    pub fn page(&self) -> i64 {
        self.page
    }
}

impl PaginationStrategy for PageIncrement {
    fn initial_token(&self) -> Option<NextPageToken> {
        self.inject_on_first_request
            .then_some(NextPageToken::Int(self.page))
    }

    fn next_page_token(&self, page: &PageContext<'_>) -> Result<Option<NextPageToken>> {
        if is_last_page(page.last_page_size, self.page_size) {
            return Ok(None);
        }
        Ok(Some(NextPageToken::Int(self.page + 1)))
    }

    fn advance(&mut self, token: &NextPageToken) {
        if let Some(page) = token.as_i64() {
            self.page = page;
        }
    }

    fn reset(&mut self) {
        self.page = self.start_from_page;
    }

    fn page_size(&self) -> Option<i64> {
        self.page_size
    }

    fn clone_box(&self) -> Box<dyn PaginationStrategy> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Record Field Increment
// ============================================================================

/// Resume-by-content pagination (`?since_id=123`, `?after=2024-01-01T00:00:00Z`)
///
/// The token is a field of the last record on the page, addressed by a dot
/// path. Stops on a short or empty page, or when the last record lacks the
/// field.
#[derive(Debug, Clone)]
pub struct RecordFieldIncrement {
    field_path: String,
    page_size: Option<i64>,
}

impl RecordFieldIncrement {
    /// Create a record field strategy
    pub fn new(field_path: impl Into<String>, page_size: Option<i64>) -> Result<Self> {
        let field_path = field_path.into();
        if field_path.trim().is_empty() {
            return Err(Error::missing_field("field_path"));
        }
        let page_size = page_size.map(validate_page_size).transpose()?;
        Ok(Self {
            field_path,
            page_size,
        })
    }
}

impl PaginationStrategy for RecordFieldIncrement {
    fn initial_token(&self) -> Option<NextPageToken> {
        None
    }

    fn next_page_token(&self, page: &PageContext<'_>) -> Result<Option<NextPageToken>> {
        if is_last_page(page.last_page_size, self.page_size) {
            return Ok(None);
        }
        let Some(record) = page.last_record else {
            return Ok(None);
        };
        let parts: Vec<&str> = self.field_path.split('.').collect();
        Ok(crate::template::get_nested_value(record, &parts).and_then(NextPageToken::from_value))
    }

    fn advance(&mut self, _token: &NextPageToken) {}

    fn reset(&mut self) {}

    fn page_size(&self) -> Option<i64> {
        self.page_size
    }

    fn clone_box(&self) -> Box<dyn PaginationStrategy> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor pagination driven by an interpolated expression
///
/// `cursor_value` is evaluated against `config`, `response`, `headers`,
/// `last_record`, `last_page_size` and `next_page_token` (the token of the
/// page just read). `headers.link.next.url` exposes RFC 5988 links. A truthy
/// `stop_condition` or an empty cursor value ends pagination.
#[derive(Debug, Clone)]
pub struct CursorPagination {
    cursor_value: String,
    stop_condition: Option<String>,
    page_size: Option<i64>,
    config: Value,
}

impl CursorPagination {
    /// Create a cursor strategy
    pub fn new(cursor_value: impl Into<String>, config: Value) -> Result<Self> {
        let cursor_value = cursor_value.into();
        if cursor_value.trim().is_empty() {
            return Err(Error::missing_field("cursor_value"));
        }
        Ok(Self {
            cursor_value,
            stop_condition: None,
            page_size: None,
            config,
        })
    }

    /// Set the stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: impl Into<String>) -> Self {
        self.stop_condition = Some(condition.into());
        self
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: i64) -> Result<Self> {
        self.page_size = Some(validate_page_size(page_size)?);
        Ok(self)
    }

    fn context(&self, page: &PageContext<'_>) -> TemplateContext {
        TemplateContext::with_config(self.config.clone())
            .with_root("response", page.response.json().unwrap_or(Value::Null))
            .with_root("headers", page.response.headers_value())
            .with_root(
                "last_record",
                page.last_record.cloned().unwrap_or(Value::Null),
            )
            .with_root("last_page_size", Value::from(page.last_page_size))
            .with_next_page_token(
                page.last_page_token
                    .map_or(Value::Null, NextPageToken::to_value),
            )
    }
}

impl PaginationStrategy for CursorPagination {
    fn initial_token(&self) -> Option<NextPageToken> {
        None
    }

    fn next_page_token(&self, page: &PageContext<'_>) -> Result<Option<NextPageToken>> {
        let ctx = self.context(page);

        if let Some(condition) = &self.stop_condition {
            if evaluate_condition(condition, &ctx)? {
                return Ok(None);
            }
        }

        Ok(NextPageToken::from_value(&render_to_value(
            &self.cursor_value,
            &ctx,
        )))
    }

    fn advance(&mut self, _token: &NextPageToken) {}

    fn reset(&mut self) {}

    fn page_size(&self) -> Option<i64> {
        self.page_size
    }

    fn clone_box(&self) -> Box<dyn PaginationStrategy> {
        Box::new(self.clone())
    }
}
