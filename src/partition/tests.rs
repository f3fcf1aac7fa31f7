//! Tests for partition module

use super::*;
use crate::error::Result;
use crate::request::RequestOption;
use crate::retriever::Retriever;
use crate::template::TemplateContext;
use crate::types::{Record, StreamSlice};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap().fixed_offset()
}

fn cursor_str<'a>(slice: &'a StreamSlice, key: &str) -> &'a str {
    slice.cursor_slice().get(key).and_then(Value::as_str).unwrap()
}

/// Parent stream serving canned records per slice
#[derive(Debug)]
struct StaticParent {
    slices: Vec<StreamSlice>,
    records: Vec<Value>,
}

#[async_trait]
impl Retriever for StaticParent {
    fn name(&self) -> &str {
        "parent"
    }

    async fn stream_slices(&self) -> Result<Vec<StreamSlice>> {
        Ok(self.slices.clone())
    }

    async fn read_records(&self, slice: &StreamSlice) -> Result<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .map(|r| Record::from_value("parent", r.clone()).with_partition(slice))
            .collect())
    }
}

fn parent(records: Vec<Value>) -> Arc<dyn Retriever> {
    Arc::new(StaticParent {
        slices: vec![StreamSlice::new()],
        records,
    })
}

// ============================================================================
// SinglePartition Tests
// ============================================================================

#[tokio::test]
async fn test_single_partition() {
    let slices = SinglePartition.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 1);
    assert!(slices[0].is_unpartitioned());
    assert!(SinglePartition
        .request_options(&slices[0], &TemplateContext::new())
        .unwrap()
        .is_empty());
}

// ============================================================================
// ListRouter Tests
// ============================================================================

#[tokio::test]
async fn test_list_router_basic() {
    let router = ListRouter::new(vec![json!("us"), json!("eu"), json!("apac")], "region").unwrap();

    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 3);
    assert_eq!(slices[0].partition().get("region"), Some(&json!("us")));
    assert_eq!(slices[2].partition().get("region"), Some(&json!("apac")));
}

#[tokio::test]
async fn test_list_router_empty() {
    let router = ListRouter::new(vec![], "value").unwrap();
    assert!(router.stream_slices().await.unwrap().is_empty());
}

#[test]
fn test_list_router_requires_field() {
    assert!(ListRouter::new(vec![json!(1)], " ").unwrap_err().is_config());
}

#[tokio::test]
async fn test_list_router_from_config_template() {
    let ctx = TemplateContext::with_config(json!({"repos": ["a/b", "c/d"], "csv": "x, y,,z"}));

    let router = ListRouter::from_config(&json!("{{ config.repos }}"), "repo", &ctx).unwrap();
    assert_eq!(router.values(), &[json!("a/b"), json!("c/d")]);

    let router = ListRouter::from_config(&json!("{{ config.csv }}"), "letter", &ctx).unwrap();
    assert_eq!(router.values(), &[json!("x"), json!("y"), json!("z")]);

    let router =
        ListRouter::from_config(&json!(["static", "{{ config.csv }}"]), "v", &ctx).unwrap();
    assert_eq!(router.values().len(), 2);

    assert!(ListRouter::from_config(&json!("{{ config.missing }}"), "v", &ctx).is_err());
    assert!(ListRouter::from_config(&json!(42), "v", &ctx).is_err());
}

#[tokio::test]
async fn test_list_router_request_option() {
    let router = ListRouter::new(vec![json!("open")], "state")
        .unwrap()
        .with_request_option(RequestOption::param("state").unwrap());

    let slices = router.stream_slices().await.unwrap();
    let options = router
        .request_options(&slices[0], &TemplateContext::new())
        .unwrap();
    assert_eq!(options.params.get("state"), Some(&"open".to_string()));

    let without = router
        .request_options(&StreamSlice::new(), &TemplateContext::new())
        .unwrap();
    assert!(without.is_empty());
}

// ============================================================================
// DatetimeRouter Tests
// ============================================================================

#[tokio::test]
async fn test_datetime_router_daily() {
    let router =
        DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 4, 0), Duration::days(1), "%Y-%m-%d")
            .unwrap();

    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 3);

    assert_eq!(cursor_str(&slices[0], "start_time"), "2024-01-01");
    assert_eq!(cursor_str(&slices[0], "end_time"), "2024-01-02");
    assert_eq!(cursor_str(&slices[2], "start_time"), "2024-01-03");
    assert_eq!(cursor_str(&slices[2], "end_time"), "2024-01-04");
    assert!(slices.iter().all(StreamSlice::is_unpartitioned));
}

#[test]
fn test_datetime_router_partial_last() {
    let router = DatetimeRouter::new(
        utc(2024, 1, 1, 0),
        utc(2024, 1, 2, 12),
        Duration::days(1),
        "%Y-%m-%d %H:%M",
    )
    .unwrap();

    let slices = router.slices();
    assert_eq!(slices.len(), 2);
    assert_eq!(cursor_str(&slices[1], "end_time"), "2024-01-02 12:00");
}

#[test]
fn test_datetime_router_granularity() {
    let router = DatetimeRouter::new(
        utc(2024, 1, 1, 0),
        utc(2024, 1, 2, 23),
        Duration::days(1),
        "%Y-%m-%dT%H:%M:%SZ",
    )
    .unwrap()
    .with_cursor_granularity(Duration::seconds(1))
    .unwrap();

    let slices = router.slices();
    assert_eq!(slices.len(), 2);
    assert_eq!(cursor_str(&slices[0], "end_time"), "2024-01-01T23:59:59Z");
    assert_eq!(cursor_str(&slices[1], "start_time"), "2024-01-02T00:00:00Z");
    assert_eq!(cursor_str(&slices[1], "end_time"), "2024-01-02T23:00:00Z");
}

#[test]
fn test_datetime_router_epoch_format() {
    let router =
        DatetimeRouter::new(utc(2021, 1, 1, 0), utc(2021, 1, 1, 2), Duration::hours(1), "%s")
            .unwrap()
            .with_field_names("after", "before");

    let slices = router.slices();
    assert_eq!(slices.len(), 2);
    assert_eq!(cursor_str(&slices[0], "after"), "1609459200");
    assert_eq!(cursor_str(&slices[1], "before"), "1609466400");
}

#[test]
fn test_datetime_router_empty_range() {
    let router =
        DatetimeRouter::new(utc(2024, 2, 1, 0), utc(2024, 1, 1, 0), Duration::days(1), "%Y-%m-%d")
            .unwrap();
    assert!(router.slices().is_empty());
}

#[test]
fn test_datetime_router_rejects_bad_step() {
    let err = DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 2, 0), Duration::zero(), "%s")
        .unwrap_err();
    assert!(err.is_config());

    let router =
        DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 2, 0), Duration::hours(1), "%s")
            .unwrap();
    assert!(router.with_cursor_granularity(Duration::days(1)).is_err());
}

#[test]
fn test_datetime_router_from_config() {
    let ctx = TemplateContext::with_config(json!({"start_date": "2024-01-01"}));
    let router = DatetimeRouter::from_config(
        "{{ config.start_date }}",
        Some("2024-01-03"),
        "P1D",
        "%Y-%m-%d",
        &ctx,
    )
    .unwrap();
    assert_eq!(router.slices().len(), 2);

    let open_ended =
        DatetimeRouter::from_config("2024-01-01T00:00:00Z", None, "1d", "%Y-%m-%dT%H:%M:%SZ", &ctx)
            .unwrap();
    assert!(open_ended.end() > utc(2024, 1, 1, 0));

    let missing = DatetimeRouter::from_config("{{ config.nope }}", None, "1d", "%Y-%m-%d", &ctx);
    assert!(missing.unwrap_err().is_config());
}

#[test]
fn test_datetime_router_lower_bound() {
    let router =
        DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 5, 0), Duration::days(1), "%Y-%m-%d")
            .unwrap()
            .with_lower_bound(Some(utc(2024, 1, 3, 0)));
    assert_eq!(router.slices().len(), 2);

    // An older checkpoint does not move the start backwards
    let router = router.with_lower_bound(Some(utc(2023, 1, 1, 0)));
    assert_eq!(router.start(), utc(2024, 1, 3, 0));
}

#[test]
fn test_datetime_router_request_options() {
    let router =
        DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 2, 0), Duration::days(1), "%Y-%m-%d")
            .unwrap()
            .with_start_option(RequestOption::param("since").unwrap())
            .with_end_option(RequestOption::param("until").unwrap());

    let slices = router.slices();
    let options = router
        .request_options(&slices[0], &TemplateContext::new())
        .unwrap();
    assert_eq!(options.params.get("since"), Some(&"2024-01-01".to_string()));
    assert_eq!(options.params.get("until"), Some(&"2024-01-02".to_string()));
}

// ============================================================================
// SubstreamRouter Tests
// ============================================================================

#[tokio::test]
async fn test_substream_router_basic() {
    let records = vec![
        json!({"id": "cus_1", "name": "Customer 1"}),
        json!({"id": "cus_2", "name": "Customer 2"}),
    ];
    let router =
        SubstreamRouter::new(vec![ParentStreamConfig::new(parent(records), "id", "customer_id")
            .unwrap()])
        .unwrap();

    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0].partition().get("customer_id"), Some(&json!("cus_1")));
    assert_eq!(
        slices[1].extra_fields().get(PARENT_RECORD_FIELD),
        Some(&json!({"id": "cus_2", "name": "Customer 2"}))
    );
}

#[tokio::test]
async fn test_substream_router_dedup_and_missing_keys() {
    let records = vec![
        json!({"data": {"id": 1}}),
        json!({"data": {"id": 2}}),
        json!({"data": {"id": 1}}),
        json!({"other": "no_id"}),
        json!({"data": {"id": null}}),
    ];
    let router = SubstreamRouter::new(vec![ParentStreamConfig::new(
        parent(records),
        "data.id",
        "item_id",
    )
    .unwrap()])
    .unwrap();

    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0].partition().get("item_id"), Some(&json!(1)));
}

#[tokio::test]
async fn test_substream_router_keeps_parent_slice() {
    let parent = Arc::new(StaticParent {
        slices: vec![
            StreamSlice::new().with_partition_value("org", json!("a")),
            StreamSlice::new().with_partition_value("org", json!("b")),
        ],
        records: vec![json!({"id": 7})],
    });
    let router =
        SubstreamRouter::new(vec![ParentStreamConfig::new(parent, "id", "repo_id").unwrap()])
            .unwrap();

    // Same key under two parent slices is still one child partition
    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 1);
    assert_eq!(
        slices[0].partition().get(PARENT_SLICE_FIELD),
        Some(&json!({"org": "a"}))
    );
}

#[tokio::test]
async fn test_substream_router_request_option() {
    let config = ParentStreamConfig::new(parent(vec![json!({"id": "x"})]), "id", "parent_id")
        .unwrap()
        .with_request_option(RequestOption::header("X-Parent").unwrap());
    let router = SubstreamRouter::new(vec![config]).unwrap();

    let slices = router.stream_slices().await.unwrap();
    let options = router
        .request_options(&slices[0], &TemplateContext::new())
        .unwrap();
    assert_eq!(options.headers.get("X-Parent"), Some(&"x".to_string()));
}

#[test]
fn test_substream_router_config_errors() {
    assert!(SubstreamRouter::new(vec![]).unwrap_err().is_config());
    assert!(ParentStreamConfig::new(parent(vec![]), "", "id").is_err());
    assert!(ParentStreamConfig::new(parent(vec![]), "id", "").is_err());
}

// ============================================================================
// CartesianRouter Tests
// ============================================================================

#[tokio::test]
async fn test_cartesian_router_product() {
    let regions: Arc<dyn PartitionRouter> =
        Arc::new(ListRouter::new(vec![json!("us"), json!("eu")], "region").unwrap());
    let windows: Arc<dyn PartitionRouter> = Arc::new(
        DatetimeRouter::new(utc(2024, 1, 1, 0), utc(2024, 1, 4, 0), Duration::days(1), "%Y-%m-%d")
            .unwrap(),
    );
    let router = CartesianRouter::new(vec![regions, windows]).unwrap();

    let slices = router.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 6);
    assert_eq!(slices[0].partition().get("region"), Some(&json!("us")));
    assert_eq!(cursor_str(&slices[0], "start_time"), "2024-01-01");
    assert_eq!(slices[5].partition().get("region"), Some(&json!("eu")));
    assert_eq!(cursor_str(&slices[5], "start_time"), "2024-01-03");
}

#[tokio::test]
async fn test_cartesian_router_empty_side() {
    let some: Arc<dyn PartitionRouter> = Arc::new(ListRouter::new(vec![json!(1)], "a").unwrap());
    let none: Arc<dyn PartitionRouter> = Arc::new(ListRouter::new(vec![], "b").unwrap());
    let router = CartesianRouter::new(vec![some, none]).unwrap();
    assert!(router.stream_slices().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cartesian_router_merges_request_options() {
    let a: Arc<dyn PartitionRouter> = Arc::new(
        ListRouter::new(vec![json!("x")], "a")
            .unwrap()
            .with_request_option(RequestOption::param("a").unwrap()),
    );
    let b: Arc<dyn PartitionRouter> = Arc::new(
        ListRouter::new(vec![json!("y")], "b")
            .unwrap()
            .with_request_option(RequestOption::param("b").unwrap()),
    );
    let router = CartesianRouter::new(vec![a, b]).unwrap();

    let slices = router.stream_slices().await.unwrap();
    let options = router
        .request_options(&slices[0], &TemplateContext::new())
        .unwrap();
    assert_eq!(options.params.len(), 2);

    assert!(CartesianRouter::new(vec![]).is_err());
}
