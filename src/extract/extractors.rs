//! Record extractor implementations

use super::decoders::{Decoder, JsonDecoder};
use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::template::{render, value_to_string, TemplateContext};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// Pulls records out of a response
pub trait RecordExtractor: Debug + Send + Sync {
    /// Extract the records, in response order
    fn extract_records(&self, response: &HttpResponse) -> Result<Vec<Value>>;
}

// ============================================================================
// Dpath Extractor
// ============================================================================

/// Extracts records found at a field path
///
/// The path is a list of segments. A `*` segment matches every element of an
/// array or every value of an object. A single segment starting with `$` is
/// evaluated as a JSONPath expression. An empty path selects the whole
/// document.
#[derive(Debug, Clone)]
pub struct DpathExtractor {
    field_path: Vec<String>,
    decoder: Arc<dyn Decoder>,
}

impl DpathExtractor {
    /// Create an extractor with a literal field path and the JSON decoder
    pub fn new<S: Into<String>>(field_path: impl IntoIterator<Item = S>) -> Self {
        Self {
            field_path: field_path.into_iter().map(Into::into).collect(),
            decoder: Arc::new(JsonDecoder),
        }
    }

    /// Create an extractor whose path segments are templates
    ///
    /// Segments are rendered once against the given context.
    pub fn interpolated(field_path: &[String], ctx: &TemplateContext) -> Result<Self> {
        let rendered = field_path
            .iter()
            .map(|segment| render(segment, ctx))
            .collect::<Result<Vec<_>>>()?;

        if rendered.iter().any(|s| s.is_empty()) {
            return Err(Error::config("field_path segments cannot be empty"));
        }

        Ok(Self::new(rendered))
    }

    /// Use a different decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// The rendered field path
    pub fn field_path(&self) -> &[String] {
        &self.field_path
    }

    fn extract_from(&self, document: &Value) -> Result<Vec<Value>> {
        if self.field_path.is_empty() {
            return Ok(flatten_extracted(document.clone()));
        }

        if self.field_path.len() == 1 && self.field_path[0].starts_with('$') {
            return extract_with_jsonpath(document, &self.field_path[0]);
        }

        if self.field_path.iter().any(|s| s == "*") {
            let mut matches = Vec::new();
            collect_glob(document, &self.field_path, &mut matches);
            return Ok(matches.into_iter().flat_map(flatten_extracted).collect());
        }

        let mut current = document;
        for segment in &self.field_path {
            current = match current {
                Value::Object(map) => match map.get(segment) {
                    Some(v) => v,
                    None => return Ok(Vec::new()),
                },
                Value::Array(arr) => match segment.parse::<usize>().ok().and_then(|i| arr.get(i)) {
                    Some(v) => v,
                    None => return Ok(Vec::new()),
                },
                _ => return Ok(Vec::new()),
            };
        }

        Ok(flatten_extracted(current.clone()))
    }
}

impl RecordExtractor for DpathExtractor {
    fn extract_records(&self, response: &HttpResponse) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        for document in self.decoder.decode(response)? {
            records.extend(self.extract_from(&document)?);
        }
        Ok(records)
    }
}

/// Arrays yield their items, `null` and empty objects yield nothing
fn flatten_extracted(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        Value::Object(ref map) if map.is_empty() => Vec::new(),
        other => vec![other],
    }
}

/// Collect every value matching a path that may contain `*` segments
fn collect_glob(value: &Value, path: &[String], out: &mut Vec<Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(value.clone());
        return;
    };

    if head == "*" {
        match value {
            Value::Array(items) => items.iter().for_each(|v| collect_glob(v, rest, out)),
            Value::Object(map) => map.values().for_each(|v| collect_glob(v, rest, out)),
            _ => {}
        }
        return;
    }

    let next = match value {
        Value::Object(map) => map.get(head),
        Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    };
    if let Some(next) = next {
        collect_glob(next, rest, out);
    }
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path).map_err(|e| Error::JsonPath {
        message: format!("Invalid JSONPath: {e}"),
    })?;

    match jp.find(value) {
        // A single match that is itself an array is treated as the record list
        Value::Array(mut found) if found.len() == 1 && found[0].is_array() => {
            Ok(flatten_extracted(found.remove(0)))
        }
        Value::Array(found) => Ok(found.into_iter().filter(|v| !v.is_null()).collect()),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

// ============================================================================
// Combined Extractor
// ============================================================================

/// Merges the output of several extractors position by position
///
/// Record *i* is the union of record *i* of every extractor (later
/// extractors win on key conflicts). The output has as many records as the
/// shortest input.
#[derive(Debug, Clone)]
pub struct CombinedExtractor {
    extractors: Vec<Arc<dyn RecordExtractor>>,
}

impl CombinedExtractor {
    /// Create a combined extractor
    pub fn new(extractors: Vec<Arc<dyn RecordExtractor>>) -> Result<Self> {
        if extractors.is_empty() {
            return Err(Error::config(
                "CombinedExtractor requires at least one extractor",
            ));
        }
        Ok(Self { extractors })
    }
}

impl RecordExtractor for CombinedExtractor {
    fn extract_records(&self, response: &HttpResponse) -> Result<Vec<Value>> {
        let outputs = self
            .extractors
            .iter()
            .map(|e| e.extract_records(response))
            .collect::<Result<Vec<_>>>()?;

        let len = outputs.iter().map(Vec::len).min().unwrap_or(0);
        let mut records = Vec::with_capacity(len);

        for i in 0..len {
            let mut merged = Map::new();
            for output in &outputs {
                match &output[i] {
                    Value::Object(map) => {
                        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    other => {
                        return Err(Error::RecordExtraction {
                            path: format!("[{i}]"),
                            message: format!("cannot merge non-object record: {other}"),
                        })
                    }
                }
            }
            records.push(Value::Object(merged));
        }

        Ok(records)
    }
}

// ============================================================================
// Key Value Extractor
// ============================================================================

/// Builds records by zipping a list of keys with each list of values
///
/// For a columnar payload such as
/// `{"columns": ["id", "name"], "rows": [[1, "a"], [2, "b"]]}` the keys
/// extractor yields `id`, `name` and the values extractor yields one array
/// per row. Each row becomes `{"id": 1, "name": "a"}`; keys and values are
/// paired positionally and the shorter side bounds the pairing.
#[derive(Debug, Clone)]
pub struct KeyValueExtractor {
    keys_extractor: Arc<dyn RecordExtractor>,
    values_extractor: Arc<dyn RecordExtractor>,
}

impl KeyValueExtractor {
    /// Create a key/value extractor
    pub fn new(
        keys_extractor: Arc<dyn RecordExtractor>,
        values_extractor: Arc<dyn RecordExtractor>,
    ) -> Self {
        Self {
            keys_extractor,
            values_extractor,
        }
    }
}

impl RecordExtractor for KeyValueExtractor {
    fn extract_records(&self, response: &HttpResponse) -> Result<Vec<Value>> {
        let keys: Vec<String> = self
            .keys_extractor
            .extract_records(response)?
            .iter()
            .map(value_to_string)
            .collect();

        let values = self.values_extractor.extract_records(response)?;

        Ok(values
            .into_iter()
            .map(|row| {
                let items = match row {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                Value::Object(keys.iter().cloned().zip(items).collect())
            })
            .collect())
    }
}
