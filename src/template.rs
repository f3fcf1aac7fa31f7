//! Template interpolation for declarative components
//!
//! Handles `{{ variable }}` interpolation in manifests and component
//! configuration. Supports nested access like `{{ config.api_key }}`,
//! `{{ stream_slice.start_time }}` and array indexing
//! (`{{ response.data.0.id }}`).
//!
//! A [`TemplateContext`] is an immutable set of named roots. Components build
//! a fresh context per evaluation; nothing is shared or mutated.

use crate::error::{Error, Result};
use crate::types::StreamSlice;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Regex for matching template variables: {{ variable.path }}
static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_\-]+)*)\s*\}\}").unwrap()
});

/// Regex for a whole-string expression: {{ anything }}
static EXPRESSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\{\{\s*(.*?)\s*\}\}\s*$").unwrap());

/// Context for template interpolation
///
/// Well-known roots are `config`, `parameters`, `stream_slice`,
/// `stream_partition`, `stream_interval`, `stream_state`, `next_page_token`,
/// `response`, `headers`, `last_record`, `last_page_size`, `record` and
/// `vars`. A path whose first segment is not a known root is looked up in
/// `config`.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    roots: Map<String, Value>,
}

impl TemplateContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with config values
    pub fn with_config(config: Value) -> Self {
        Self::new().with_root("config", config)
    }

    /// Set a named root
    #[must_use]
    pub fn with_root(mut self, name: impl Into<String>, value: Value) -> Self {
        self.roots.insert(name.into(), value);
        self
    }

    /// Set `parameters`
    #[must_use]
    pub fn with_parameters(self, parameters: Value) -> Self {
        self.with_root("parameters", parameters)
    }

    /// Set `stream_slice`, `stream_partition` and `stream_interval`
    #[must_use]
    pub fn with_stream_slice(self, slice: &StreamSlice) -> Self {
        self.with_root("stream_slice", slice.to_template_value())
            .with_root("stream_partition", Value::Object(slice.partition().clone()))
            .with_root(
                "stream_interval",
                Value::Object(slice.cursor_slice().clone()),
            )
    }

    /// Set `stream_state`
    #[must_use]
    pub fn with_stream_state(self, state: Value) -> Self {
        self.with_root("stream_state", state)
    }

    /// Set `next_page_token`
    #[must_use]
    pub fn with_next_page_token(self, token: Value) -> Self {
        self.with_root("next_page_token", token)
    }

    /// Set `record`
    #[must_use]
    pub fn with_record(self, record: Value) -> Self {
        self.with_root("record", record)
    }

    /// Get a root value by name
    pub fn root(&self, name: &str) -> Option<&Value> {
        self.roots.get(name)
    }

    /// Get a value by path (e.g., "config.api_key")
    pub fn get(&self, path: &str) -> Option<&Value> {
        let parts: Vec<&str> = path.split('.').collect();
        let first = *parts.first()?;

        match self.roots.get(first) {
            Some(root) => get_nested_value(root, &parts[1..]),
            // Bare paths resolve against config
            None => get_nested_value(self.roots.get("config")?, &parts),
        }
    }
}

/// Get a nested value from a JSON value by path
///
/// Numeric segments index into arrays.
pub fn get_nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for part in path {
        current = match current {
            Value::Object(map) => map.get(*part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a template string with the given context
///
/// Undefined variables are an error.
pub fn render(template: &str, ctx: &TemplateContext) -> Result<String> {
    let mut result = template.to_string();
    let mut errors = Vec::new();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        let full_match = &cap[0];
        let var_path = &cap[1];

        match ctx.get(var_path) {
            Some(value) => {
                result = result.replace(full_match, &value_to_string(value));
            }
            None => errors.push(var_path.to_string()),
        }
    }

    if errors.is_empty() {
        Ok(result)
    } else {
        Err(Error::undefined_var(errors.join(", ")))
    }
}

/// Render a template, leaving undefined variables as-is
pub fn render_optional(template: &str, ctx: &TemplateContext) -> String {
    let mut result = template.to_string();

    for cap in TEMPLATE_REGEX.captures_iter(template) {
        if let Some(value) = ctx.get(&cap[1]) {
            result = result.replace(&cap[0], &value_to_string(value));
        }
    }

    result
}

/// Render a template, substituting undefined variables with empty strings
pub fn render_lenient(template: &str, ctx: &TemplateContext) -> String {
    TEMPLATE_REGEX
        .replace_all(template, |cap: &regex::Captures<'_>| {
            ctx.get(&cap[1]).map(value_to_string).unwrap_or_default()
        })
        .into_owned()
}

/// Evaluate a template to a JSON value
///
/// A template consisting of exactly one placeholder yields the referenced
/// value with its type preserved (`Null` when undefined). Anything else is
/// rendered leniently to a string.
pub fn render_to_value(template: &str, ctx: &TemplateContext) -> Value {
    if let Some(cap) = TEMPLATE_REGEX.captures(template.trim()) {
        if cap[0].len() == template.trim().len() {
            return ctx.get(&cap[1]).cloned().unwrap_or(Value::Null);
        }
    }
    Value::String(render_lenient(template, ctx))
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    TEMPLATE_REGEX.is_match(s)
}

/// Extract all variable names from a template
pub fn extract_variables(template: &str) -> Vec<String> {
    TEMPLATE_REGEX
        .captures_iter(template)
        .map(|cap| cap[1].to_string())
        .collect()
}

/// Convert a JSON value to a string for template substitution
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For complex types, use JSON serialization
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Render all string values in a JSON object/value
pub fn render_value(value: &Value, ctx: &TemplateContext) -> Result<Value> {
    match value {
        Value::String(s) => {
            if has_templates(s) {
                Ok(Value::String(render(s, ctx)?))
            } else {
                Ok(value.clone())
            }
        }
        Value::Object(map) => {
            let mut new_map = Map::new();
            for (k, v) in map {
                let new_key = if has_templates(k) {
                    render(k, ctx)?
                } else {
                    k.clone()
                };
                new_map.insert(new_key, render_value(v, ctx)?);
            }
            Ok(Value::Object(new_map))
        }
        Value::Array(arr) => {
            let new_arr: Result<Vec<Value>> = arr.iter().map(|v| render_value(v, ctx)).collect();
            Ok(Value::Array(new_arr?))
        }
        _ => Ok(value.clone()),
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Truthiness of a JSON value
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy. The strings
/// `"false"` and `"none"` (any case) are falsy too.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let lowered = s.trim().to_ascii_lowercase();
            !(lowered.is_empty() || lowered == "false" || lowered == "none")
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Evaluate a boolean condition such as `{{ not response.has_more }}` or
/// `{{ record.status == 'active' }}`
///
/// Supported forms: a single operand (truthiness), `not <operand>`,
/// `<a> == <b>`, `<a> != <b>`. Operands are paths, quoted strings,
/// numbers, `true`, `false`, `null`/`None`.
pub fn evaluate_condition(condition: &str, ctx: &TemplateContext) -> Result<bool> {
    let expr = match EXPRESSION_REGEX.captures(condition) {
        Some(cap) => cap[1].to_string(),
        None => condition.trim().to_string(),
    };

    if expr.is_empty() {
        return Err(Error::template("empty condition"));
    }

    if let Some(rest) = expr.strip_prefix("not ") {
        return Ok(!is_truthy(&evaluate_operand(rest, ctx)?));
    }

    if let Some((lhs, rhs)) = expr.split_once("!=") {
        return Ok(evaluate_operand(lhs, ctx)? != evaluate_operand(rhs, ctx)?);
    }

    if let Some((lhs, rhs)) = expr.split_once("==") {
        return Ok(evaluate_operand(lhs, ctx)? == evaluate_operand(rhs, ctx)?);
    }

    Ok(is_truthy(&evaluate_operand(&expr, ctx)?))
}

fn evaluate_operand(operand: &str, ctx: &TemplateContext) -> Result<Value> {
    let operand = operand.trim();
    if operand.is_empty() {
        return Err(Error::template("missing operand in condition"));
    }

    let quoted = (operand.starts_with('\'') && operand.ends_with('\''))
        || (operand.starts_with('"') && operand.ends_with('"'));
    if quoted && operand.len() >= 2 {
        return Ok(Value::String(operand[1..operand.len() - 1].to_string()));
    }

    match operand {
        "true" | "True" => return Ok(Value::Bool(true)),
        "false" | "False" => return Ok(Value::Bool(false)),
        "null" | "None" => return Ok(Value::Null),
        _ => {}
    }

    if let Ok(i) = operand.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = operand.parse::<f64>() {
        return Ok(Value::from(f));
    }

    Ok(ctx.get(operand).cloned().unwrap_or(Value::Null))
}
