//! Tests for manifest module

use super::*;
use crate::auth::{AuthConfig, Location, OAuth2Config};
use crate::cursor::{CollectingStateSink, CursorValueType};
use crate::error::{ErrorKind, Result};
use crate::http::{HttpRequest, HttpResponse, Requester};
use crate::request::RequestOptionType;
use crate::state::State;
use crate::template::TemplateContext;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct ScriptedRequester {
    responses: Mutex<VecDeque<Value>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedRequester {
    fn new(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Requester for ScriptedRequester {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let body = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| json!({"data": []}));
        Ok(HttpResponse::from_json(&body))
    }
}

const USERS_MANIFEST: &str = r#"
name: example
url_base: https://api.example.com
auth:
  type: bearer
  token: "{{ config.token }}"
parameters:
  page_size: 2
streams:
  - name: users
    primary_key: [id]
    retriever:
      type: simple
      requester:
        path: /users
        request_parameters:
          sort: asc
      record_selector:
        extractor:
          type: dpath
          field_path: [data]
      paginator:
        pagination_strategy:
          type: offset_increment
          page_size: "{{ parameters.page_size }}"
        page_token_option:
          type: request_option
          field_name: offset
          inject_into: request_parameter
        page_size_option:
          field_name: limit
          inject_into: request_parameter
    incremental_sync:
      cursor_field: updated_at
"#;

// ============================================================================
// Loading Tests
// ============================================================================

#[test]
fn test_load_minimal_manifest() {
    let yaml = r#"
name: minimal
url_base: https://api.example.com
streams:
  - name: users
    retriever:
      type: simple
      requester:
        path: /users
"#;

    let def = load_manifest_from_str(yaml).unwrap();
    assert_eq!(def.name, "minimal");
    assert_eq!(def.version, "0.1.0");
    assert_eq!(def.http.timeout_secs, 30);
    assert_eq!(def.http.max_retries, 3);
    assert!(def.concurrency.is_none());

    let RetrieverDefinition::Simple {
        requester,
        paginator,
        partition_router,
        ..
    } = &def.streams[0].retriever
    else {
        panic!("expected simple retriever");
    };
    assert_eq!(requester.http_method, "GET");
    assert!(paginator.is_none());
    assert!(partition_router.is_none());
}

#[test]
fn test_load_full_stream() {
    let def = load_manifest_from_str(USERS_MANIFEST).unwrap();
    let stream = def.stream("users").unwrap();
    assert_eq!(stream.primary_key, vec!["id"]);

    let RetrieverDefinition::Simple {
        paginator: Some(paginator),
        ..
    } = &stream.retriever
    else {
        panic!("expected paginator");
    };
    assert!(matches!(
        paginator.pagination_strategy,
        PaginationStrategyDefinition::OffsetIncrement {
            inject_on_first_request: false,
            ..
        }
    ));
    assert!(matches!(
        &paginator.page_token_option,
        PageTokenOptionDefinition::RequestOption(option) if option.field_name == "offset"
    ));

    let incremental = stream.incremental_sync.as_ref().unwrap();
    assert_eq!(incremental.cursor_type, CursorValueType::default());
    assert!(!incremental.per_partition);
}

#[test]
fn test_load_routers_and_async() {
    let yaml = r#"
name: multi
url_base: https://api.example.com
concurrency:
  max_workers: 6
  deadline_secs: 60
streams:
  - name: orgs
    retriever:
      type: simple
      requester: { path: /orgs }
  - name: repos
    retriever:
      type: simple
      requester: { path: "/orgs/{{ stream_partition.org }}/repos" }
      partition_router:
        type: cartesian
        routers:
          - type: substream
            parent_stream_configs:
              - { stream: orgs, parent_key: login, partition_field: org }
          - type: datetime
            start_datetime: "2024-01-01T00:00:00Z"
            end_datetime: "2024-01-03T00:00:00Z"
            step: P1D
  - name: exports
    retriever:
      type: async
      partition_router:
        type: list
        values: [us, eu]
        cursor_field: region
      job:
        create: { path: /exports }
        poll: { path: "/exports/{{ job_id }}", interval_secs: 1 }
        download: { path: "/exports/{{ job_id }}/file", records_path: [rows] }
"#;

    let def = load_manifest_from_str(yaml).unwrap();
    assert_eq!(def.stream_names(), vec!["orgs", "repos", "exports"]);
    assert_eq!(def.streams[1].retriever.parent_streams(), vec!["orgs"]);

    let RetrieverDefinition::Async { job, .. } = &def.streams[2].retriever else {
        panic!("expected async retriever");
    };
    assert_eq!(job.create.http_method, "POST");
    assert_eq!(job.create.job_id_path, "id");
    assert_eq!(job.poll.max_attempts, 120);
    assert_eq!(job.poll.failed_values, vec!["Failed", "Aborted"]);

    let concurrency = def.concurrency.as_ref().unwrap();
    assert_eq!(concurrency.max_workers, 6);
    assert_eq!(concurrency.queue_capacity, None);
}

#[test]
fn test_load_manifest_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.yaml");
    std::fs::write(&path, USERS_MANIFEST).unwrap();

    assert_eq!(load_manifest(&path).unwrap().name, "example");
    assert!(load_manifest(dir.path().join("missing.yaml")).unwrap_err().is_config());
}

// ============================================================================
// Validation Tests
// ============================================================================

fn assert_invalid(yaml: &str, message: &str) {
    let err = load_manifest_from_str(yaml).unwrap_err();
    assert!(err.is_config(), "{err}");
    assert!(err.to_string().contains(message), "{err}");
}

#[test]
fn test_validation_errors() {
    assert_invalid(
        "name: ''\nurl_base: https://x\nstreams: []",
        "name cannot be empty",
    );
    assert_invalid(
        "name: a\nurl_base: https://x\nstreams: []",
        "at least one stream",
    );
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - { name: s, retriever: { type: simple, requester: { path: /s } } }
  - { name: s, retriever: { type: simple, requester: { path: /t } } }
"#,
        "Duplicate stream names",
    );
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - { name: s, retriever: { type: simple, requester: { path: /s, http_method: FETCH } } }
"#,
        "invalid HTTP method",
    );
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - { name: s, retriever: { type: simple, requester: { path: "" } } }
"#,
        "path cannot be empty",
    );
    assert_invalid("not: [valid", "Failed to parse manifest YAML");
}

#[test]
fn test_validation_of_parents() {
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - name: child
    retriever:
      type: substream
      nested_field: items
      parent_stream_configs: [{ stream: ghost, parent_key: id, partition_field: id }]
"#,
        "unknown parent stream 'ghost'",
    );
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - name: a
    retriever:
      type: substream
      nested_field: items
      parent_stream_configs: [{ stream: b, parent_key: id, partition_field: id }]
  - name: b
    retriever:
      type: substream
      nested_field: items
      parent_stream_configs: [{ stream: a, parent_key: id, partition_field: id }]
"#,
        "Parent stream cycle",
    );
    assert_invalid(
        r#"
name: a
url_base: https://x
streams:
  - name: child
    retriever:
      type: substream
      parent_stream_configs: [{ stream: child, parent_key: id, partition_field: id }]
"#,
        "nested_field or a requester",
    );
}

// ============================================================================
// Factory Tests
// ============================================================================

fn factory(yaml: &str, requester: Arc<ScriptedRequester>) -> ComponentFactory {
    ComponentFactory::with_requester(
        load_manifest_from_str(yaml).unwrap(),
        json!({"token": "t0k3n", "regions": "us,eu"}),
        requester,
    )
    .unwrap()
}

#[tokio::test]
async fn test_factory_builds_paginated_stream() {
    let requester = ScriptedRequester::new(vec![
        json!({"data": [{"id": 1}, {"id": 2}]}),
        json!({"data": [{"id": 3}]}),
    ]);
    let stream = factory(USERS_MANIFEST, requester.clone())
        .build_stream("users")
        .unwrap();

    assert!(stream.is_incremental());
    assert_eq!(stream.cursor_field(), Some("updated_at"));
    assert_eq!(stream.json_schema()["type"], "object");

    let retriever = stream.retriever();
    let mut records = Vec::new();
    for slice in retriever.stream_slices().await.unwrap() {
        records.extend(retriever.read_records(&slice).await.unwrap());
    }
    assert_eq!(records.len(), 3);

    let requests = requester.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].options.params.get("limit"), Some(&"2".to_string()));
    assert_eq!(requests[0].options.params.get("sort"), Some(&"asc".to_string()));
    assert_eq!(requests[1].options.params.get("offset"), Some(&"2".to_string()));
    assert_eq!(
        requests[0].options.headers.get("Authorization"),
        Some(&"Bearer t0k3n".to_string())
    );
}

#[test]
fn test_factory_rejects_invalid_components_before_requests() {
    let yaml = USERS_MANIFEST.replace("\"{{ parameters.page_size }}\"", "0");
    let requester = ScriptedRequester::new(vec![]);
    let err = factory(&yaml, requester.clone())
        .build_stream("users")
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(requester.requests().is_empty());
}

#[test]
fn test_factory_unknown_stream() {
    let err = factory(USERS_MANIFEST, ScriptedRequester::new(vec![]))
        .build_stream("nope")
        .unwrap_err();
    assert!(matches!(err, crate::Error::StreamNotFound { .. }));
}

#[test]
fn test_factory_loads_state_into_cursor() {
    let mut state = State::new();
    state.set_stream("users", json!({"updated_at": "2024-03-01T00:00:00Z"}));
    let sink = Arc::new(CollectingStateSink::new());

    let stream = factory(USERS_MANIFEST, ScriptedRequester::new(vec![]))
        .with_state(state)
        .with_state_sink(sink)
        .build_stream("users")
        .unwrap();

    assert_eq!(
        stream.cursor().unwrap().get_state(),
        json!({"updated_at": "2024-03-01T00:00:00Z"})
    );
}

#[tokio::test]
async fn test_factory_list_router_from_config() {
    let yaml = r#"
name: regions
url_base: https://api.example.com
streams:
  - name: sales
    retriever:
      type: simple
      requester: { path: "/{{ stream_partition.region }}/sales" }
      partition_router:
        type: list
        values: "{{ config.regions }}"
        cursor_field: region
"#;
    let requester = ScriptedRequester::new(vec![json!([{"n": 1}]), json!([{"n": 2}])]);
    let retriever = factory(yaml, requester.clone())
        .build_stream("sales")
        .unwrap()
        .retriever();

    let slices = retriever.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 2);
    for slice in &slices {
        retriever.read_records(slice).await.unwrap();
    }
    let paths: Vec<String> = requester.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/us/sales", "/eu/sales"]);
}

#[tokio::test]
async fn test_factory_datetime_router_resumes_from_state() {
    let yaml = r#"
name: events
url_base: https://api.example.com
streams:
  - name: events
    retriever:
      type: simple
      requester: { path: /events }
      partition_router:
        type: datetime
        start_datetime: "2024-01-01T00:00:00Z"
        end_datetime: "2024-01-05T00:00:00Z"
        step: 1d
    incremental_sync:
      cursor_field: ts
"#;
    let mut state = State::new();
    state.set_stream("events", json!({"ts": "2024-01-03T00:00:00Z"}));

    let retriever = factory(yaml, ScriptedRequester::new(vec![]))
        .with_state(state)
        .build_stream("events")
        .unwrap()
        .retriever();

    let slices = retriever.stream_slices().await.unwrap();
    assert_eq!(slices.len(), 2);
    assert_eq!(
        slices[0].cursor_slice().get("start_time"),
        Some(&json!("2024-01-03T00:00:00Z"))
    );
}

#[tokio::test]
async fn test_factory_substream_nested_records() {
    let yaml = r#"
name: nested
url_base: https://api.example.com
streams:
  - name: orders
    retriever:
      type: simple
      requester: { path: /orders }
      record_selector: { extractor: { type: dpath, field_path: [orders] } }
  - name: line_items
    retriever:
      type: substream
      nested_field: items
      parent_stream_configs:
        - { stream: orders, parent_key: id, partition_field: order_id }
"#;
    let requester = ScriptedRequester::new(vec![json!({"orders": [
        {"id": 1, "items": [{"sku": "a"}, {"sku": "b"}]},
        {"id": 2, "items": [{"sku": "c"}]}
    ]})]);
    let retriever = factory(yaml, requester)
        .build_stream("line_items")
        .unwrap()
        .retriever();

    let mut skus = Vec::new();
    for slice in retriever.stream_slices().await.unwrap() {
        for record in retriever.read_records(&slice).await.unwrap() {
            skus.push(record.get("sku").cloned().unwrap());
        }
    }
    assert_eq!(skus, vec![json!("a"), json!("b"), json!("c")]);
}

#[test]
fn test_factory_rejects_incremental_substream() {
    let yaml = r#"
name: nested
url_base: https://api.example.com
streams:
  - name: orders
    retriever: { type: simple, requester: { path: /orders } }
  - name: items
    retriever:
      type: substream
      nested_field: items
      parent_stream_configs: [{ stream: orders, parent_key: id, partition_field: order_id }]
    incremental_sync: { cursor_field: updated_at }
"#;
    let err = factory(yaml, ScriptedRequester::new(vec![]))
        .build_stream("items")
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_factory_concurrency() {
    let yaml = format!("{USERS_MANIFEST}concurrency:\n  max_workers: 6\n  deadline_secs: 10\n");
    let config = factory(&yaml, ScriptedRequester::new(vec![]))
        .concurrency()
        .unwrap()
        .unwrap();
    assert_eq!(config.consumers(), 3);
    assert_eq!(config.queue_capacity, 6);
    assert_eq!(config.deadline, Some(Duration::from_secs(10)));

    assert!(factory(USERS_MANIFEST, ScriptedRequester::new(vec![]))
        .concurrency()
        .unwrap()
        .is_none());
}

#[test]
fn test_build_auth_renders_templates() {
    let ctx = TemplateContext::with_config(json!({"key": "abc"}));
    let auth = build_auth(
        &AuthDefinition::ApiKey {
            field_name: "X-Api-Key".to_string(),
            value: "{{ config.key }}".to_string(),
            location: Location::Header,
            prefix: None,
        },
        &ctx,
    )
    .unwrap();
    assert_eq!(
        auth,
        AuthConfig::ApiKey {
            location: Location::Header,
            field_name: "X-Api-Key".to_string(),
            prefix: None,
            value: "abc".to_string(),
        }
    );

    let missing = build_auth(
        &AuthDefinition::Bearer {
            token: "{{ config.missing }}".to_string(),
        },
        &ctx,
    );
    assert!(missing.is_err());
}

#[test]
fn test_build_oauth_refresh_token_auth() {
    let def: AuthDefinition = serde_yaml::from_str(
        r#"
type: oauth2_refresh_token
token_url: https://auth.example.com/token
client_id: "{{ config.client_id }}"
client_secret: s3cret
refresh_token: "{{ config.refresh }}"
access_token_name: data.token
refresh_request_body:
  audience: "{{ config.audience }}"
"#,
    )
    .unwrap();
    let ctx =
        TemplateContext::with_config(json!({
            "client_id": "cid",
            "refresh": "r1",
            "audience": "api"
        }));

    let token_url = "https://auth.example.com/token";
    let expected = OAuth2Config::refresh_token(token_url, "cid", "s3cret", "r1")
        .with_token_fields("data.token", "expires_in")
        .with_body_param("audience", "api");
    assert_eq!(build_auth(&def, &ctx).unwrap(), AuthConfig::OAuth2(expected));
}

#[test]
fn test_page_token_option_parsing() {
    let def: PaginatorDefinition = serde_yaml::from_str(
        r#"
pagination_strategy: { type: cursor_pagination, cursor_value: "{{ response.next }}" }
page_token_option: { type: request_path }
"#,
    )
    .unwrap();
    assert!(matches!(def.page_token_option, PageTokenOptionDefinition::RequestPath));

    let option: PageTokenOptionDefinition = serde_yaml::from_str(
        "{ type: request_option, field_name: X-Cursor, inject_into: header }",
    )
    .unwrap();
    assert!(matches!(
        option,
        PageTokenOptionDefinition::RequestOption(ref o)
            if o.inject_into == RequestOptionType::Header
    ));
}
