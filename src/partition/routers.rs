//! Partition router implementations
//!
//! Each router handles a specific partitioning strategy.

use super::types::PartitionRouter;
use crate::datetime;
use crate::error::{Error, Result};
use crate::request::{RequestOption, RequestOptions};
use crate::template::{render, render_to_value, render_value, TemplateContext};
use crate::types::StreamSlice;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// List Router
// ============================================================================

/// List-based partition router
///
/// Creates one partition per value of a static (or config-provided) list.
#[derive(Debug, Clone)]
pub struct ListRouter {
    /// List of partition values
    values: Vec<Value>,
    /// Field name for partition
    cursor_field: String,
    /// Where the value goes in the request, if anywhere
    request_option: Option<RequestOption>,
}

impl ListRouter {
    /// Create a new list router
    pub fn new(values: Vec<Value>, cursor_field: impl Into<String>) -> Result<Self> {
        let cursor_field = cursor_field.into();
        if cursor_field.trim().is_empty() {
            return Err(Error::missing_field("cursor_field"));
        }
        Ok(Self {
            values,
            cursor_field,
            request_option: None,
        })
    }

    /// Create from a manifest value
    ///
    /// `values` is either a list (items are interpolated) or a template that
    /// evaluates to a list, e.g. `{{ config.regions }}`. A template that
    /// evaluates to a string is split on commas.
    pub fn from_config(
        values: &Value,
        cursor_field: impl Into<String>,
        ctx: &TemplateContext,
    ) -> Result<Self> {
        let values = match values {
            Value::Array(items) => items
                .iter()
                .map(|item| render_value(item, ctx))
                .collect::<Result<Vec<_>>>()?,
            Value::String(template) => match render_to_value(template, ctx) {
                Value::Array(items) => items,
                Value::String(s) => s
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
                Value::Null => {
                    return Err(Error::invalid_value(
                        "values",
                        format!("'{template}' evaluated to nothing"),
                    ))
                }
                other => vec![other],
            },
            other => {
                return Err(Error::invalid_value(
                    "values",
                    format!("expected a list or a template, got {other}"),
                ))
            }
        };
        Self::new(values, cursor_field)
    }

    /// Inject the partition value into requests
    #[must_use]
    pub fn with_request_option(mut self, option: RequestOption) -> Self {
        self.request_option = Some(option);
        self
    }

    /// Partition values
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[async_trait]
impl PartitionRouter for ListRouter {
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        Ok(self
            .values
            .iter()
            .map(|v| StreamSlice::new().with_partition_value(self.cursor_field.clone(), v.clone()))
            .collect())
    }

    fn request_options(
        &self,
        slice: &StreamSlice,
        ctx: &TemplateContext,
    ) -> Result<RequestOptions> {
        match (&self.request_option, slice.partition().get(&self.cursor_field)) {
            (Some(option), Some(value)) => option.to_options(value, ctx),
            _ => Ok(RequestOptions::new()),
        }
    }
}

// ============================================================================
// Datetime Router
// ============================================================================

/// Default cursor slice key for the window start
pub const DEFAULT_START_FIELD: &str = "start_time";

/// Default cursor slice key for the window end
pub const DEFAULT_END_FIELD: &str = "end_time";

/// Datetime-based partition router
///
/// Splits `[start, end]` into windows of `step`. Window bounds are written
/// to the slice's cursor part, formatted with `format`. With a cursor
/// granularity the windows are closed intervals that do not overlap
/// (`end = next_start - granularity`); without one they share their bounds.
#[derive(Debug, Clone)]
pub struct DatetimeRouter {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    step: Duration,
    cursor_granularity: Option<Duration>,
    format: String,
    start_field: String,
    end_field: String,
    start_option: Option<RequestOption>,
    end_option: Option<RequestOption>,
}

impl DatetimeRouter {
    /// Create a new datetime router
    pub fn new(
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        step: Duration,
        format: impl Into<String>,
    ) -> Result<Self> {
        if step <= Duration::zero() {
            return Err(Error::invalid_value("step", "must be a positive duration"));
        }
        Ok(Self {
            start,
            end,
            step,
            cursor_granularity: None,
            format: format.into(),
            start_field: DEFAULT_START_FIELD.to_string(),
            end_field: DEFAULT_END_FIELD.to_string(),
            start_option: None,
            end_option: None,
        })
    }

    /// Create from manifest strings
    ///
    /// `start` and `end` may be templates; a missing `end` (or `now`) means
    /// the current time. Values are parsed with `format` first, then with
    /// common ISO forms.
    pub fn from_config(
        start: &str,
        end: Option<&str>,
        step: &str,
        format: impl Into<String>,
        ctx: &TemplateContext,
    ) -> Result<Self> {
        let format = format.into();
        let parse = |raw: &str| -> Result<DateTime<FixedOffset>> {
            let rendered = render(raw, ctx)?;
            datetime::parse(&rendered, &format).or_else(|_| datetime::parse_flexible(&rendered))
        };

        let start = parse(start)?;
        let end = match end.map(str::trim) {
            None | Some("now" | "{{ now }}") => datetime::now_utc(),
            Some(raw) => parse(raw)?,
        };
        let step = datetime::parse_duration(step)?;

        Self::new(start, end, step, format)
    }

    /// Make windows non-overlapping at this resolution
    pub fn with_cursor_granularity(mut self, granularity: Duration) -> Result<Self> {
        if granularity <= Duration::zero() || granularity > self.step {
            return Err(Error::invalid_value(
                "cursor_granularity",
                "must be positive and no larger than step",
            ));
        }
        self.cursor_granularity = Some(granularity);
        Ok(self)
    }

    /// Rename the cursor slice keys
    #[must_use]
    pub fn with_field_names(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_field = start.into();
        self.end_field = end.into();
        self
    }

    /// Inject the window start into requests
    #[must_use]
    pub fn with_start_option(mut self, option: RequestOption) -> Self {
        self.start_option = Some(option);
        self
    }

    /// Inject the window end into requests
    #[must_use]
    pub fn with_end_option(mut self, option: RequestOption) -> Self {
        self.end_option = Some(option);
        self
    }

    /// Resume from a checkpoint: windows start no earlier than `bound`
    #[must_use]
    pub fn with_lower_bound(mut self, bound: Option<DateTime<FixedOffset>>) -> Self {
        if let Some(bound) = bound {
            if bound > self.start {
                debug!(
                    start = %self.start,
                    bound = %bound,
                    "Moving datetime window start to checkpoint"
                );
                self.start = bound;
            }
        }
        self
    }

    /// Window start
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// Window end
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Compute all windows
    pub fn slices(&self) -> Vec<StreamSlice> {
        let mut slices = Vec::new();
        let mut current = self.start;

        loop {
            let in_range = match self.cursor_granularity {
                Some(_) => current <= self.end,
                None => current < self.end,
            };
            if !in_range {
                break;
            }

            let next = current + self.step;
            let window_end = match self.cursor_granularity {
                Some(granularity) => (next - granularity).min(self.end),
                None => next.min(self.end),
            };

            slices.push(
                StreamSlice::new()
                    .with_cursor_value(
                        self.start_field.clone(),
                        Value::String(datetime::format(&current, &self.format)),
                    )
                    .with_cursor_value(
                        self.end_field.clone(),
                        Value::String(datetime::format(&window_end, &self.format)),
                    ),
            );
            current = next;
        }

        slices
    }
}

#[async_trait]
impl PartitionRouter for DatetimeRouter {
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        let slices = self.slices();
        debug!(
            count = slices.len(),
            start = %self.start,
            end = %self.end,
            "Generated datetime windows"
        );
        Ok(slices)
    }

    fn request_options(
        &self,
        slice: &StreamSlice,
        ctx: &TemplateContext,
    ) -> Result<RequestOptions> {
        let mut options = RequestOptions::new();
        let bounds = [
            (&self.start_option, &self.start_field),
            (&self.end_option, &self.end_field),
        ];
        for (option, field) in bounds {
            if let (Some(option), Some(value)) = (option, slice.cursor_slice().get(field)) {
                options.merge(option.to_options(value, ctx)?)?;
            }
        }
        Ok(options)
    }
}

// ============================================================================
// Cartesian Router
// ============================================================================

/// Cartesian product of several routers
///
/// Every combination of the inner routers' slices becomes one slice; later
/// routers win on key conflicts.
#[derive(Debug, Clone)]
pub struct CartesianRouter {
    routers: Vec<Arc<dyn PartitionRouter>>,
}

impl CartesianRouter {
    /// Create a product of `routers`
    pub fn new(routers: Vec<Arc<dyn PartitionRouter>>) -> Result<Self> {
        if routers.is_empty() {
            return Err(Error::config("cartesian router needs at least one router"));
        }
        Ok(Self { routers })
    }
}

#[async_trait]
impl PartitionRouter for CartesianRouter {
    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        let mut product = vec![StreamSlice::new()];

        for router in &self.routers {
            let slices = router.stream_slices().await?;
            product = product
                .iter()
                .flat_map(|left| slices.iter().map(move |right| left.clone().merge(right)))
                .collect();
        }

        Ok(product)
    }

    fn request_options(
        &self,
        slice: &StreamSlice,
        ctx: &TemplateContext,
    ) -> Result<RequestOptions> {
        let parts = self
            .routers
            .iter()
            .map(|router| router.request_options(slice, ctx))
            .collect::<Result<Vec<_>>>()?;
        RequestOptions::merge_all(parts)
    }
}
