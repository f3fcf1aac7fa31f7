//! Tests for request module

use super::*;
use crate::error::ErrorKind;
use crate::template::TemplateContext;
use crate::types::StreamSlice;
use serde_json::json;
use std::collections::BTreeMap;

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

// ============================================================================
// RequestOption Tests
// ============================================================================

#[test]
fn test_request_option_requires_field_name() {
    let err = RequestOption::new("  ", RequestOptionType::Header).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_request_option_injection_targets() {
    let ctx = TemplateContext::new();

    let opts = RequestOption::param("offset")
        .unwrap()
        .to_options(&json!(20), &ctx)
        .unwrap();
    assert_eq!(opts.params.get("offset"), Some(&"20".to_string()));

    let opts = RequestOption::header("X-Cursor")
        .unwrap()
        .to_options(&json!("abc"), &ctx)
        .unwrap();
    assert_eq!(opts.headers.get("X-Cursor"), Some(&"abc".to_string()));

    let opts = RequestOption::new("page", RequestOptionType::BodyJson)
        .unwrap()
        .to_options(&json!(3), &ctx)
        .unwrap();
    assert_eq!(opts.body_json.get("page"), Some(&json!(3)));

    let opts = RequestOption::new("page", RequestOptionType::BodyData)
        .unwrap()
        .to_options(&json!(3), &ctx)
        .unwrap();
    assert_eq!(opts.body_data.get("page"), Some(&json!("3")));
}

#[test]
fn test_request_option_interpolated_field_name() {
    let ctx = TemplateContext::with_config(json!({"param": "since"}));
    let opts = RequestOption::param("{{ config.param }}")
        .unwrap()
        .to_options(&json!("2024"), &ctx)
        .unwrap();
    assert_eq!(opts.params.get("since"), Some(&"2024".to_string()));
}

// ============================================================================
// RequestOptions Merge Tests
// ============================================================================

#[test]
fn test_merge_disjoint() {
    let mut a = RequestOptions::new().with_param("limit", "10");
    let b = RequestOptions::new()
        .with_param("offset", "20")
        .with_header("Authorization", "Bearer x");
    a.merge(b).unwrap();
    assert_eq!(a.params.len(), 2);
    assert_eq!(a.headers.len(), 1);
}

#[test]
fn test_merge_duplicate_key_is_config_error() {
    let mut a = RequestOptions::new().with_param("limit", "10");
    let b = RequestOptions::new().with_param("limit", "50");
    let err = a.merge(b).unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("limit"));
}

#[test]
fn test_merge_both_bodies_is_config_error() {
    let mut a = RequestOptions::new();
    a.body_data.insert("a".into(), json!("1"));
    let mut b = RequestOptions::new();
    b.body_json.insert("b".into(), json!(1));
    assert!(a.merge(b).unwrap_err().is_config());
}

#[test]
fn test_merge_two_paths_is_config_error() {
    let mut a = RequestOptions::new().with_path("/a");
    let b = RequestOptions::new().with_path("/b");
    assert!(a.merge(b).is_err());

    let mut c = RequestOptions::new();
    c.merge(RequestOptions::new().with_path("/c")).unwrap();
    assert_eq!(c.path.as_deref(), Some("/c"));
}

#[test]
fn test_merge_all() {
    let merged = RequestOptions::merge_all(vec![
        RequestOptions::new().with_param("a", "1"),
        RequestOptions::new().with_param("b", "2"),
        RequestOptions::new(),
    ])
    .unwrap();
    assert_eq!(merged.params, map(&[("a", "1"), ("b", "2")]));
}

// ============================================================================
// Provider Tests
// ============================================================================

#[test]
fn test_provider_renders_templates() {
    let provider = InterpolatedRequestOptionsProvider::new(
        map(&[
            ("since", "{{ stream_slice.start_time }}"),
            ("region", "{{ config.region }}"),
            ("cursor", "{{ next_page_token.next_page_token }}"),
        ]),
        map(&[("X-Account", "{{ config.account }}")]),
        BTreeMap::new(),
        None,
    )
    .unwrap();

    let slice = StreamSlice::new().with_cursor_value("start_time", json!("2024-01-01"));
    let ctx = TemplateContext::with_config(json!({"region": "eu", "account": "acme"}))
        .with_stream_slice(&slice);

    let opts = provider.request_options(&ctx).unwrap();
    assert_eq!(opts.params.get("since"), Some(&"2024-01-01".to_string()));
    assert_eq!(opts.params.get("region"), Some(&"eu".to_string()));
    // Undefined on the first page, so omitted
    assert!(!opts.params.contains_key("cursor"));
    assert_eq!(opts.headers.get("X-Account"), Some(&"acme".to_string()));
}

#[test]
fn test_provider_body_json() {
    let provider = InterpolatedRequestOptionsProvider::new(
        BTreeMap::new(),
        BTreeMap::new(),
        BTreeMap::new(),
        Some(json!({"query": {"account": "{{ config.account }}"}, "limit": 10})),
    )
    .unwrap();
    let ctx = TemplateContext::with_config(json!({"account": "acme"}));
    let opts = provider.request_options(&ctx).unwrap();
    assert_eq!(opts.body_json.get("query"), Some(&json!({"account": "acme"})));
    assert_eq!(opts.body_json.get("limit"), Some(&json!(10)));
}

#[test]
fn test_provider_rejects_both_bodies() {
    let err = InterpolatedRequestOptionsProvider::new(
        BTreeMap::new(),
        BTreeMap::new(),
        map(&[("a", "1")]),
        Some(json!({"b": 1})),
    )
    .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_provider_rejects_non_object_json() {
    assert!(InterpolatedRequestOptionsProvider::new(
        BTreeMap::new(),
        BTreeMap::new(),
        BTreeMap::new(),
        Some(json!([1, 2])),
    )
    .is_err());
}
