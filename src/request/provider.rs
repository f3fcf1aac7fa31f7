//! Interpolated request options provider

use super::options::RequestOptions;
use crate::error::{Error, Result};
use crate::template::{render_lenient, TemplateContext};
use serde_json::Value;
use std::collections::BTreeMap;

/// Static, templated request options for a stream
///
/// Templates are rendered against `config`, `stream_slice`,
/// `next_page_token` and `stream_state`. Parameters and headers that render
/// to an empty string are omitted.
#[derive(Debug, Clone, Default)]
pub struct InterpolatedRequestOptionsProvider {
    request_parameters: BTreeMap<String, String>,
    request_headers: BTreeMap<String, String>,
    request_body_data: BTreeMap<String, String>,
    request_body_json: Option<Value>,
}

impl InterpolatedRequestOptionsProvider {
    /// Create a provider
    ///
    /// Setting both body data and body json is a configuration error, as is
    /// a JSON body that is not an object.
    pub fn new(
        request_parameters: BTreeMap<String, String>,
        request_headers: BTreeMap<String, String>,
        request_body_data: BTreeMap<String, String>,
        request_body_json: Option<Value>,
    ) -> Result<Self> {
        let has_json = request_body_json
            .as_ref()
            .is_some_and(|v| v.as_object().is_some_and(|o| !o.is_empty()));

        if let Some(json) = &request_body_json {
            if !json.is_object() {
                return Err(Error::config("request_body_json must be an object"));
            }
        }

        if !request_body_data.is_empty() && has_json {
            return Err(Error::config(
                "request_body_data and request_body_json cannot both be set",
            ));
        }

        Ok(Self {
            request_parameters,
            request_headers,
            request_body_data,
            request_body_json,
        })
    }

    /// Provider with query parameters only
    pub fn with_params(params: BTreeMap<String, String>) -> Self {
        Self {
            request_parameters: params,
            ..Self::default()
        }
    }

    /// Render the options for a request
    pub fn request_options(&self, ctx: &TemplateContext) -> Result<RequestOptions> {
        let mut options = RequestOptions::default();

        for (k, v) in &self.request_parameters {
            let rendered = render_lenient(v, ctx);
            if !rendered.is_empty() {
                options.params.insert(render_lenient(k, ctx), rendered);
            }
        }

        for (k, v) in &self.request_headers {
            let rendered = render_lenient(v, ctx);
            if !rendered.is_empty() {
                options.headers.insert(render_lenient(k, ctx), rendered);
            }
        }

        for (k, v) in &self.request_body_data {
            options
                .body_data
                .insert(render_lenient(k, ctx), Value::String(render_lenient(v, ctx)));
        }

        if let Some(json) = &self.request_body_json {
            if let Value::Object(map) = render_json_lenient(json, ctx) {
                options.body_json = map;
            }
        }

        Ok(options)
    }
}

fn render_json_lenient(value: &Value, ctx: &TemplateContext) -> Value {
    match value {
        Value::String(s) => Value::String(render_lenient(s, ctx)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (render_lenient(k, ctx), render_json_lenient(v, ctx)))
                .collect(),
        ),
        Value::Array(arr) => {
            Value::Array(arr.iter().map(|v| render_json_lenient(v, ctx)).collect())
        }
        other => other.clone(),
    }
}
