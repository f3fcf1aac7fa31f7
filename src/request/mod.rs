//! Request options
//!
//! Describes where a value is injected into an outgoing request (query
//! parameter, header, form body or JSON body) and how options coming from
//! different components are merged.
//!
//! # Overview
//!
//! Several components contribute to the same request: the static
//! request-options provider, the paginator (page token and page size), the
//! authenticator and the datetime router. Each produces a
//! [`RequestOptions`]; the retriever merges them. Two components writing the
//! same key is a configuration error.

mod options;
mod provider;

pub use options::{RequestOption, RequestOptionType, RequestOptions};
pub use provider::InterpolatedRequestOptionsProvider;

#[cfg(test)]
mod tests;
