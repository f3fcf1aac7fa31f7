//! Paginators: strategy plus token injection

use super::strategies::{PageContext, PaginationStrategy};
use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::request::{RequestOption, RequestOptions};
use crate::template::TemplateContext;
use crate::types::NextPageToken;
use serde_json::Value;
use std::fmt::Debug;

/// Where the page token (or page size) goes on the next request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTokenOption {
    /// A query parameter, header or body field
    Request(RequestOption),
    /// The request path (the token is a URL or path)
    Path,
}

/// Decides whether to fetch another page and how to request it
///
/// A paginator holds the token for the next request. Computing a token is
/// pure; only [`advance`](Paginator::advance) and [`reset`](Paginator::reset)
/// change state.
pub trait Paginator: Debug + Send + Sync {
    /// Token for the page following the response just read
    fn next_page_token(
        &self,
        response: &HttpResponse,
        last_page_size: usize,
        last_record: Option<&Value>,
    ) -> Result<Option<NextPageToken>>;

    /// Commit the token for the next request
    fn advance(&mut self, token: NextPageToken);

    /// Current token
    fn current_token(&self) -> Option<&NextPageToken>;

    /// Path override for the next request
    fn path(&self) -> Option<String>;

    /// Options carrying the token and page size
    fn request_options(&self, ctx: &TemplateContext) -> Result<RequestOptions>;

    /// Return to the first page
    fn reset(&mut self);

    /// Clone into a box
    fn clone_box(&self) -> Box<dyn Paginator>;
}

impl Clone for Box<dyn Paginator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

// ============================================================================
// Default Paginator
// ============================================================================

/// Strategy-driven paginator
#[derive(Debug, Clone)]
pub struct DefaultPaginator {
    strategy: Box<dyn PaginationStrategy>,
    page_token_option: PageTokenOption,
    page_size_option: Option<RequestOption>,
    url_base: String,
    token: Option<NextPageToken>,
}

impl DefaultPaginator {
    /// Create a paginator
    ///
    /// Injecting the page size into the path, or configuring a page size
    /// option for a strategy without a page size, are configuration errors.
    pub fn new(
        strategy: Box<dyn PaginationStrategy>,
        page_token_option: PageTokenOption,
        page_size_option: Option<PageTokenOption>,
        url_base: impl Into<String>,
    ) -> Result<Self> {
        let page_size_option = match page_size_option {
            None => None,
            Some(PageTokenOption::Path) => {
                return Err(Error::invalid_value(
                    "page_size_option",
                    "page size cannot be injected into the path",
                ))
            }
            Some(PageTokenOption::Request(option)) => {
                if strategy.page_size().is_none() {
                    return Err(Error::invalid_value(
                        "page_size_option",
                        "page size option requires the pagination strategy to have a page_size",
                    ));
                }
                Some(option)
            }
        };

        let token = strategy.initial_token();
        Ok(Self {
            strategy,
            page_token_option,
            page_size_option,
            url_base: url_base.into(),
            token,
        })
    }

    /// The underlying strategy
    pub fn strategy(&self) -> &dyn PaginationStrategy {
        self.strategy.as_ref()
    }
}

/// Value injected for a token
fn token_value(token: &NextPageToken) -> Value {
    match token {
        NextPageToken::Map(_) => Value::String(token.to_request_string()),
        other => other.to_value(),
    }
}

impl Paginator for DefaultPaginator {
    fn next_page_token(
        &self,
        response: &HttpResponse,
        last_page_size: usize,
        last_record: Option<&Value>,
    ) -> Result<Option<NextPageToken>> {
        self.strategy.next_page_token(&PageContext {
            response,
            last_page_size,
            last_record,
            last_page_token: self.token.as_ref(),
        })
    }

    fn advance(&mut self, token: NextPageToken) {
        self.strategy.advance(&token);
        self.token = Some(token);
    }

    fn current_token(&self) -> Option<&NextPageToken> {
        self.token.as_ref()
    }

    fn path(&self) -> Option<String> {
        match (&self.page_token_option, &self.token) {
            (PageTokenOption::Path, Some(token)) => {
                let value = token.to_request_string();
                let base = self.url_base.trim_end_matches('/');
                let stripped = match value.strip_prefix(base) {
                    Some(rest) if !base.is_empty() => rest.to_string(),
                    _ => value,
                };
                Some(stripped)
            }
            _ => None,
        }
    }

    fn request_options(&self, ctx: &TemplateContext) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();

        if let (PageTokenOption::Request(option), Some(token)) =
            (&self.page_token_option, &self.token)
        {
            options.merge(option.to_options(&token_value(token), ctx)?)?;
        }

        if let (Some(option), Some(size)) = (&self.page_size_option, self.strategy.page_size()) {
            options.merge(option.to_options(&Value::from(size), ctx)?)?;
        }

        Ok(options)
    }

    fn reset(&mut self) {
        self.strategy.reset();
        self.token = self.strategy.initial_token();
    }

    fn clone_box(&self) -> Box<dyn Paginator> {
        Box::new(self.clone())
    }
}

// ============================================================================
// No Pagination
// ============================================================================

/// Single-page streams
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPagination;

impl Paginator for NoPagination {
    fn next_page_token(
        &self,
        _response: &HttpResponse,
        _last_page_size: usize,
        _last_record: Option<&Value>,
    ) -> Result<Option<NextPageToken>> {
        Ok(None)
    }

    fn advance(&mut self, _token: NextPageToken) {}

    fn current_token(&self) -> Option<&NextPageToken> {
        None
    }

    fn path(&self) -> Option<String> {
        None
    }

    fn request_options(&self, _ctx: &TemplateContext) -> Result<RequestOptions> {
        Ok(RequestOptions::new())
    }

    fn reset(&mut self) {}

    fn clone_box(&self) -> Box<dyn Paginator> {
        Box::new(*self)
    }
}
