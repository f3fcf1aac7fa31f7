//! Pagination module
//!
//! Supports: Offset, Page Number, Record Field (resume by id/timestamp),
//! Cursor (response body, headers or Link header)
//!
//! # Overview
//!
//! A [`PaginationStrategy`] computes the next page token from a completed
//! page. A [`Paginator`] wraps a strategy, holds the token for the next
//! request and injects it into exactly one place: a query parameter, a
//! header, a body field or the request path.
//!
//! Strategies stop on a short or empty page. Offset strategies advance by
//! the configured page size, never by the observed record count.

mod paginator;
mod strategies;

pub use paginator::{DefaultPaginator, NoPagination, PageTokenOption, Paginator};
pub use strategies::{
    resolve_page_size, CursorPagination, OffsetIncrement, PageContext, PageIncrement,
    PaginationStrategy, RecordFieldIncrement,
};

#[cfg(test)]
mod tests;
