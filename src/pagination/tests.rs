//! Tests for pagination module

use super::*;
use crate::http::HttpResponse;
use crate::request::{RequestOption, RequestOptionType};
use crate::template::TemplateContext;
use crate::types::NextPageToken;
use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

fn empty_response() -> HttpResponse {
    HttpResponse::from_json(&json!({}))
}

fn page(response: &HttpResponse, last_page_size: usize) -> PageContext<'_> {
    PageContext {
        response,
        last_page_size,
        last_record: None,
        last_page_token: None,
    }
}

fn offset_paginator(page_size: i64) -> DefaultPaginator {
    DefaultPaginator::new(
        Box::new(OffsetIncrement::new(Some(page_size), false).unwrap()),
        PageTokenOption::Request(RequestOption::param("offset").unwrap()),
        Some(PageTokenOption::Request(RequestOption::param("limit").unwrap())),
        "https://api.example.com",
    )
    .unwrap()
}

// ============================================================================
// OffsetIncrement Tests
// ============================================================================

#[test_case(0, None ; "empty page stops")]
#[test_case(1, None ; "short page stops")]
#[test_case(2, Some(NextPageToken::Int(2)) ; "full page advances by page size")]
#[test_case(5, Some(NextPageToken::Int(2)) ; "oversized page still advances by page size")]
fn test_offset_increment_next_token(last_page_size: usize, expected: Option<NextPageToken>) {
    let strategy = OffsetIncrement::new(Some(2), false).unwrap();
    let response = empty_response();
    assert_eq!(
        strategy.next_page_token(&page(&response, last_page_size)).unwrap(),
        expected
    );
}

#[test]
fn test_offset_increment_advances_monotonically() {
    let mut strategy = OffsetIncrement::new(Some(2), false).unwrap();
    let response = empty_response();
    let mut previous = -1;

    for _ in 0..5 {
        let token = strategy
            .next_page_token(&page(&response, 2))
            .unwrap()
            .unwrap();
        let value = token.as_i64().unwrap();
        assert!(value > previous);
        previous = value;
        strategy.advance(&token);
    }
    assert_eq!(strategy.offset(), 10);
}

#[test]
fn test_offset_increment_reset_returns_to_zero() {
    let mut strategy = OffsetIncrement::new(Some(2), true).unwrap();
    let response = HttpResponse::from_json(&json!([{"id": 0}, {"id": 1}]));

    for _ in 0..3 {
        let token = strategy
            .next_page_token(&page(&response, 2))
            .unwrap()
            .unwrap();
        strategy.advance(&token);
    }
    assert_eq!(strategy.offset(), 6);

    strategy.reset();
    assert_eq!(strategy.offset(), 0);
    assert_eq!(strategy.initial_token(), Some(NextPageToken::Int(0)));
}

#[test]
fn test_offset_increment_is_idempotent() {
    let strategy = OffsetIncrement::new(Some(3), false).unwrap();
    let response = empty_response();
    let first = strategy.next_page_token(&page(&response, 3)).unwrap();
    let second = strategy.next_page_token(&page(&response, 3)).unwrap();
    assert_eq!(first, second);
    assert_eq!(strategy.offset(), 0);
}

#[test]
fn test_offset_increment_without_page_size() {
    let strategy = OffsetIncrement::new(None, false).unwrap();
    let response = empty_response();
    assert_eq!(
        strategy.next_page_token(&page(&response, 7)).unwrap(),
        Some(NextPageToken::Int(7))
    );
    assert_eq!(strategy.next_page_token(&page(&response, 0)).unwrap(), None);
}

#[test]
fn test_offset_increment_inject_on_first_request() {
    assert_eq!(OffsetIncrement::new(Some(2), false).unwrap().initial_token(), None);
    assert_eq!(
        OffsetIncrement::new(Some(2), true).unwrap().initial_token(),
        Some(NextPageToken::Int(0))
    );
}

#[test_case(0 ; "zero")]
#[test_case(-5 ; "negative")]
fn test_invalid_page_size(page_size: i64) {
    assert!(OffsetIncrement::new(Some(page_size), false)
        .unwrap_err()
        .is_config());
    assert!(PageIncrement::new(Some(page_size), 0, false)
        .unwrap_err()
        .is_config());
}

#[test]
fn test_resolve_page_size() {
    let ctx = TemplateContext::with_config(json!({"page_size": 50, "bad": "lots"}));
    assert_eq!(resolve_page_size(&json!(25), &ctx).unwrap(), 25);
    assert_eq!(
        resolve_page_size(&json!("{{ config.page_size }}"), &ctx).unwrap(),
        50
    );
    assert!(resolve_page_size(&json!("{{ config.bad }}"), &ctx)
        .unwrap_err()
        .is_config());
    assert!(resolve_page_size(&json!(1.5), &ctx).unwrap_err().is_config());
    assert!(resolve_page_size(&json!("0"), &ctx).unwrap_err().is_config());
}

// ============================================================================
// PageIncrement Tests
// ============================================================================

#[test]
fn test_page_increment_sequence_and_reset() {
    let mut strategy = PageIncrement::new(Some(10), 1, true).unwrap();
    let response = empty_response();
    assert_eq!(strategy.initial_token(), Some(NextPageToken::Int(1)));

    let token = strategy
        .next_page_token(&page(&response, 10))
        .unwrap()
        .unwrap();
    assert_eq!(token, NextPageToken::Int(2));
    strategy.advance(&token);
    assert_eq!(strategy.page(), 2);

    assert_eq!(strategy.next_page_token(&page(&response, 9)).unwrap(), None);
    assert_eq!(strategy.next_page_token(&page(&response, 0)).unwrap(), None);

    strategy.reset();
    assert_eq!(strategy.page(), 1);
}

#[test]
fn test_page_increment_first_request_not_injected() {
    let strategy = PageIncrement::new(Some(10), 0, false).unwrap();
    assert_eq!(strategy.initial_token(), None);
}

// ============================================================================
// RecordFieldIncrement Tests
// ============================================================================

#[test]
fn test_record_field_increment() {
    let strategy = RecordFieldIncrement::new("meta.id", Some(2)).unwrap();
    let response = empty_response();
    let last = json!({"meta": {"id": "abc"}});

    let ctx = PageContext {
        response: &response,
        last_page_size: 2,
        last_record: Some(&last),
        last_page_token: None,
    };
    assert_eq!(
        strategy.next_page_token(&ctx).unwrap(),
        Some(NextPageToken::Str("abc".to_string()))
    );

    let short = PageContext {
        last_page_size: 1,
        ..ctx
    };
    assert_eq!(strategy.next_page_token(&short).unwrap(), None);

    let missing = json!({"other": 1});
    let no_field = PageContext {
        last_record: Some(&missing),
        ..ctx
    };
    assert_eq!(strategy.next_page_token(&no_field).unwrap(), None);
}

// ============================================================================
// CursorPagination Tests
// ============================================================================

#[test]
fn test_cursor_pagination_from_body() {
    let strategy = CursorPagination::new("{{ response.meta.next }}", json!({}))
        .unwrap()
        .with_stop_condition("{{ not response.meta.has_more }}");

    let more = HttpResponse::from_json(&json!({"meta": {"next": "c2", "has_more": true}}));
    assert_eq!(
        strategy.next_page_token(&page(&more, 3)).unwrap(),
        Some(NextPageToken::Str("c2".to_string()))
    );

    let done = HttpResponse::from_json(&json!({"meta": {"next": "c3", "has_more": false}}));
    assert_eq!(strategy.next_page_token(&page(&done, 3)).unwrap(), None);
}

#[test]
fn test_cursor_pagination_empty_value_stops() {
    let strategy = CursorPagination::new("{{ response.next }}", json!({})).unwrap();
    let response = HttpResponse::from_json(&json!({"next": null}));
    assert_eq!(strategy.next_page_token(&page(&response, 3)).unwrap(), None);
    let response = HttpResponse::from_json(&json!({"next": ""}));
    assert_eq!(strategy.next_page_token(&page(&response, 3)).unwrap(), None);
}

#[test]
fn test_cursor_pagination_link_header() {
    let strategy = CursorPagination::new("{{ headers.link.next.url }}", json!({})).unwrap();
    let response = HttpResponse::from_json(&json!([])).with_header(
        "Link",
        "<https://api.example.com/items?page=2>; rel=\"next\"",
    );
    assert_eq!(
        strategy.next_page_token(&page(&response, 0)).unwrap(),
        Some(NextPageToken::Str(
            "https://api.example.com/items?page=2".to_string()
        ))
    );

    let last = HttpResponse::from_json(&json!([]));
    assert_eq!(strategy.next_page_token(&page(&last, 0)).unwrap(), None);
}

// ============================================================================
// DefaultPaginator Tests
// ============================================================================

#[test]
fn test_default_paginator_request_options() {
    let mut paginator = offset_paginator(2);
    let ctx = TemplateContext::new();

    let first = paginator.request_options(&ctx).unwrap();
    assert_eq!(first.params.get("limit"), Some(&"2".to_string()));
    assert!(!first.params.contains_key("offset"));

    let response = empty_response();
    let token = paginator.next_page_token(&response, 2, None).unwrap().unwrap();
    paginator.advance(token);

    let second = paginator.request_options(&ctx).unwrap();
    assert_eq!(second.params.get("offset"), Some(&"2".to_string()));
    assert_eq!(second.params.get("limit"), Some(&"2".to_string()));
    assert_eq!(paginator.path(), None);
}

#[test]
fn test_default_paginator_reset() {
    let mut paginator = offset_paginator(2);
    let response = empty_response();
    for _ in 0..4 {
        let token = paginator.next_page_token(&response, 2, None).unwrap().unwrap();
        paginator.advance(token);
    }
    assert_eq!(paginator.current_token(), Some(&NextPageToken::Int(8)));

    paginator.reset();
    assert_eq!(paginator.current_token(), None);
    let token = paginator.next_page_token(&response, 2, None).unwrap();
    assert_eq!(token, Some(NextPageToken::Int(2)));
}

#[test]
fn test_default_paginator_header_injection() {
    let mut paginator = DefaultPaginator::new(
        Box::new(CursorPagination::new("{{ response.cursor }}", json!({})).unwrap()),
        PageTokenOption::Request(
            RequestOption::new("X-Page-Token", RequestOptionType::Header).unwrap(),
        ),
        None,
        "https://api.example.com",
    )
    .unwrap();

    let response = HttpResponse::from_json(&json!({"cursor": "abc"}));
    let token = paginator.next_page_token(&response, 1, None).unwrap().unwrap();
    paginator.advance(token);

    let options = paginator.request_options(&TemplateContext::new()).unwrap();
    assert_eq!(options.headers.get("X-Page-Token"), Some(&"abc".to_string()));
    assert!(options.params.is_empty());
}

#[test]
fn test_default_paginator_body_json_keeps_type() {
    let mut paginator = DefaultPaginator::new(
        Box::new(PageIncrement::new(Some(10), 1, false).unwrap()),
        PageTokenOption::Request(RequestOption::new("page", RequestOptionType::BodyJson).unwrap()),
        None,
        "",
    )
    .unwrap();
    paginator.advance(NextPageToken::Int(2));

    let options = paginator.request_options(&TemplateContext::new()).unwrap();
    assert_eq!(options.body_json.get("page"), Some(&json!(2)));
}

#[test]
fn test_default_paginator_path_strips_base() {
    let mut paginator = DefaultPaginator::new(
        Box::new(CursorPagination::new("{{ response.next }}", json!({})).unwrap()),
        PageTokenOption::Path,
        None,
        "https://api.example.com/v1/",
    )
    .unwrap();
    assert_eq!(paginator.path(), None);

    let response =
        HttpResponse::from_json(&json!({"next": "https://api.example.com/v1/items?page=2"}));
    let token = paginator.next_page_token(&response, 1, None).unwrap().unwrap();
    paginator.advance(token);

    assert_eq!(paginator.path(), Some("/items?page=2".to_string()));
    assert!(paginator
        .request_options(&TemplateContext::new())
        .unwrap()
        .is_empty());
}

#[test]
fn test_default_paginator_config_errors() {
    let page_size_in_path = DefaultPaginator::new(
        Box::new(OffsetIncrement::new(Some(2), false).unwrap()),
        PageTokenOption::Request(RequestOption::param("offset").unwrap()),
        Some(PageTokenOption::Path),
        "",
    );
    assert!(page_size_in_path.unwrap_err().is_config());

    let no_page_size = DefaultPaginator::new(
        Box::new(OffsetIncrement::new(None, false).unwrap()),
        PageTokenOption::Request(RequestOption::param("offset").unwrap()),
        Some(PageTokenOption::Request(RequestOption::param("limit").unwrap())),
        "",
    );
    assert!(no_page_size.unwrap_err().is_config());
}

#[test]
fn test_default_paginator_clone_is_independent() {
    let mut original = offset_paginator(2);
    let mut copy: Box<dyn Paginator> = Box::new(original.clone());

    let response = empty_response();
    let token = copy.next_page_token(&response, 2, None).unwrap().unwrap();
    copy.advance(token);

    assert_eq!(copy.current_token(), Some(&NextPageToken::Int(2)));
    assert_eq!(original.current_token(), None);
    original.reset();
}

#[test]
fn test_no_pagination() {
    let paginator = NoPagination;
    let response = HttpResponse::from_json(&json!([1, 2, 3]));
    assert_eq!(paginator.next_page_token(&response, 3, None).unwrap(), None);
    assert_eq!(paginator.path(), None);
    assert!(paginator
        .request_options(&TemplateContext::new())
        .unwrap()
        .is_empty());
}
