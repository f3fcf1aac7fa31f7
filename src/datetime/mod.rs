//! Datetime parsing and formatting
//!
//! Supports the epoch directives `%s`, `%s_as_float` and `%ms` on top of
//! regular strftime patterns, plus duration parsing for slicing steps and
//! lookback windows.

mod parser;

pub use parser::{format, min_datetime, now_utc, parse, parse_duration, parse_flexible};
