//! Record extraction
//!
//! Supports: JSON and JSON Lines decoding, field-path extraction with `*`
//! wildcards and JSONPath, positional combination of extractors, and record
//! filtering.
//!
//! # Overview
//!
//! A [`Decoder`] turns a buffered response into one or more JSON documents.
//! A [`RecordExtractor`] pulls the records out of those documents. The
//! [`RecordSelector`] applies an optional filter condition and tags each
//! surviving record with its stream.
//!
//! Extractors never fail on missing or empty data: an absent field, a `null`
//! or an empty body yields zero records. Only a body that cannot be decoded
//! is an error.

mod decoders;
mod extractors;
mod selector;

pub use decoders::{Decoder, JsonDecoder, JsonlDecoder};
pub use extractors::{CombinedExtractor, DpathExtractor, KeyValueExtractor, RecordExtractor};
pub use selector::{RecordFilter, RecordSelector};
