//! Response decoders

use crate::error::{Error, Result};
use crate::http::HttpResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// Turns a response body into JSON documents
pub trait Decoder: Debug + Send + Sync {
    /// Decode the body
    ///
    /// An empty body yields no documents.
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>>;
}

/// Body is a single JSON document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>> {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_slice(&response.body)
            .map_err(|e| Error::decode(format!("Failed to parse JSON: {e}")))?;
        Ok(vec![value])
    }
}

/// Body holds one JSON document per line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonlDecoder;

impl Decoder for JsonlDecoder {
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Value>> {
        let body = std::str::from_utf8(&response.body)
            .map_err(|e| Error::decode(format!("JSONL body is not UTF-8: {e}")))?;

        let mut documents = Vec::new();
        for (line_num, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| {
                Error::decode(format!("Failed to parse JSONL at line {}: {e}", line_num + 1))
            })?;
            documents.push(value);
        }

        Ok(documents)
    }
}
