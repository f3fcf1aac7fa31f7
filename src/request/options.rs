//! Request option types and merging

use crate::error::{Error, Result};
use crate::template::{render, value_to_string, TemplateContext};
use crate::types::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a request option is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOptionType {
    /// Query string parameter
    RequestParameter,
    /// HTTP header
    Header,
    /// Form-encoded body field
    BodyData,
    /// JSON body field
    BodyJson,
}

impl RequestOptionType {
    fn label(self) -> &'static str {
        match self {
            Self::RequestParameter => "request_parameter",
            Self::Header => "header",
            Self::BodyData => "body_data",
            Self::BodyJson => "body_json",
        }
    }
}

/// A single injection point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOption {
    /// Field name; may contain `{{ }}` templates
    pub field_name: String,
    /// Injection location
    pub inject_into: RequestOptionType,
}

impl RequestOption {
    /// Create a request option
    pub fn new(field_name: impl Into<String>, inject_into: RequestOptionType) -> Result<Self> {
        let field_name = field_name.into();
        if field_name.trim().is_empty() {
            return Err(Error::config(format!(
                "request option injected into {} requires a field_name",
                inject_into.label()
            )));
        }
        Ok(Self {
            field_name,
            inject_into,
        })
    }

    /// Query parameter option
    pub fn param(field_name: impl Into<String>) -> Result<Self> {
        Self::new(field_name, RequestOptionType::RequestParameter)
    }

    /// Header option
    pub fn header(field_name: impl Into<String>) -> Result<Self> {
        Self::new(field_name, RequestOptionType::Header)
    }

    /// Build the options that carry `value` at this injection point
    pub fn to_options(&self, value: &Value, ctx: &TemplateContext) -> Result<RequestOptions> {
        let key = render(&self.field_name, ctx)?;
        let mut options = RequestOptions::default();
        match self.inject_into {
            RequestOptionType::RequestParameter => {
                options.params.insert(key, value_to_string(value));
            }
            RequestOptionType::Header => {
                options.headers.insert(key, value_to_string(value));
            }
            RequestOptionType::BodyData => {
                options.body_data.insert(key, Value::String(value_to_string(value)));
            }
            RequestOptionType::BodyJson => {
                options.body_json.insert(key, value.clone());
            }
        }
        Ok(options)
    }
}

/// Options contributed to a single request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Query string parameters
    pub params: BTreeMap<String, String>,
    /// Headers
    pub headers: BTreeMap<String, String>,
    /// Form-encoded body fields
    pub body_data: JsonObject,
    /// JSON body fields
    pub body_json: JsonObject,
    /// Path override (absolute path or full URL)
    pub path: Option<String>,
}

impl RequestOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been set
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.headers.is_empty()
            && self.body_data.is_empty()
            && self.body_json.is_empty()
            && self.path.is_none()
    }

    /// Add a query parameter
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set the path override
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Merge another set of options into this one
    ///
    /// A key present on both sides, two path overrides, or a request ending
    /// up with both a form body and a JSON body are configuration errors.
    pub fn merge(&mut self, other: RequestOptions) -> Result<()> {
        merge_map(&mut self.params, other.params, "request parameter")?;
        merge_map(&mut self.headers, other.headers, "header")?;
        merge_object(&mut self.body_data, other.body_data, "body data")?;
        merge_object(&mut self.body_json, other.body_json, "body json")?;

        match (&self.path, other.path) {
            (Some(_), Some(p)) => {
                return Err(Error::config(format!(
                    "path is set by more than one component (second value: {p})"
                )))
            }
            (None, Some(p)) => self.path = Some(p),
            _ => {}
        }

        if !self.body_data.is_empty() && !self.body_json.is_empty() {
            return Err(Error::config(
                "request cannot have both body data and body json",
            ));
        }

        Ok(())
    }

    /// Merge several option sets, in order
    pub fn merge_all(parts: impl IntoIterator<Item = RequestOptions>) -> Result<Self> {
        let mut merged = Self::default();
        for part in parts {
            merged.merge(part)?;
        }
        Ok(merged)
    }
}

fn merge_map(
    into: &mut BTreeMap<String, String>,
    from: BTreeMap<String, String>,
    what: &str,
) -> Result<()> {
    for (k, v) in from {
        if into.contains_key(&k) {
            return Err(Error::config(format!(
                "{what} '{k}' is set by more than one component"
            )));
        }
        into.insert(k, v);
    }
    Ok(())
}

fn merge_object(into: &mut JsonObject, from: JsonObject, what: &str) -> Result<()> {
    for (k, v) in from {
        if into.contains_key(&k) {
            return Err(Error::config(format!(
                "{what} '{k}' is set by more than one component"
            )));
        }
        into.insert(k, v);
    }
    Ok(())
}
