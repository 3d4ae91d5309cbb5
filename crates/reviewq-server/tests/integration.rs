use axum::http::StatusCode;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use reviewq_core::config::Config;
use reviewq_remote::{InMemoryQueueService, Op, RemoteError, RetryPolicy};
use reviewq_server::engine::Engine;
use reviewq_server::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn demo() -> (Arc<InMemoryQueueService>, axum::Router) {
    let svc = Arc::new(InMemoryQueueService::demo());
    let engine = Engine::with_retry(svc.clone(), &Config::default(), RetryPolicy::none());
    let app = reviewq_server::router(AppState::without_polling(engine));
    (svc, app)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

fn card_ids(json: &serde_json::Value) -> Vec<String> {
    json["cards"]
        .as_array()
        .map(|cards| {
            cards
                .iter()
                .filter_map(|c| c["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_defaults_to_pending_cards() {
    let (_svc, app) = demo();
    let (status, json) = get(&app, "/api/queue").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "needs_decision");
    assert_eq!(json["filter"], "all");
    assert_eq!(card_ids(&json), vec!["c-101", "c-102", "c-103", "c-104"]);
    assert_eq!(json["counts"]["needsDecision"], 4);
    assert!(json["error"].is_null());
}

#[tokio::test]
async fn queue_query_overrides_filter() {
    let (_svc, app) = demo();
    let (_, json) = get(&app, "/api/queue?filter=high_risk").await;
    assert_eq!(card_ids(&json), vec!["c-101"]);

    let (_, json) = get(&app, "/api/queue?filter=low_confidence").await;
    assert_eq!(card_ids(&json), vec!["c-101", "c-104"]);
}

#[tokio::test]
async fn invalid_filter_is_a_bad_request() {
    let (_svc, app) = demo();
    let (status, json) = get(&app, "/api/queue?filter=urgent").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("urgent"));
}

#[tokio::test]
async fn aggregates_report_counts_and_status() {
    let (_svc, app) = demo();
    let (status, json) = get(&app, "/api/aggregates").await;
    assert_eq!(status, StatusCode::OK);
    let stats = &json["stats"]["data"];
    assert_eq!(stats["navigationCounts"]["needsDecision"], 4);
    assert_eq!(stats["globalStatus"]["status"], "pending_decisions");
    assert_eq!(stats["globalStatus"]["message"], "4 decisions are waiting for you");
    assert!(json["drift"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn failed_read_reports_error_alongside_data() {
    let (svc, app) = demo();
    svc.fail_next(Op::Stats, RemoteError::Transient("connection reset".into()));
    let (status, json) = get(&app, "/api/aggregates").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["stats"]["data"].is_null());
    assert!(json["stats"]["error"].is_string());
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approve_removes_card_and_updates_aggregates() {
    let (_svc, app) = demo();
    get(&app, "/api/queue").await;
    get(&app, "/api/aggregates").await;

    let (status, json) = send(&app, "POST", "/api/cards/c-102/approve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "settled");
    assert_eq!(json["card"]["objectiveStatus"], "handled");

    let (_, json) = get(&app, "/api/queue").await;
    assert_eq!(card_ids(&json), vec!["c-101", "c-103", "c-104"]);
    let (_, json) = get(&app, "/api/aggregates").await;
    assert_eq!(json["stats"]["data"]["navigationCounts"]["needsDecision"], 3);
}

#[tokio::test]
async fn second_approve_is_skipped() {
    let (svc, app) = demo();
    send(&app, "POST", "/api/cards/c-103/approve", None).await;
    let (status, json) = send(&app, "POST", "/api/cards/c-103/approve", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "skipped");
    assert_eq!(json["reason"], "already_resolved");
    assert_eq!(svc.calls(Op::Approve), 1);
}

#[tokio::test]
async fn override_requires_a_reason() {
    let (_svc, app) = demo();
    let (status, _) = post_json(&app, "/api/cards/c-101/override", serde_json::json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn rejected_override_rolls_back() {
    let (_svc, app) = demo();
    get(&app, "/api/queue").await;
    let (status, json) = post_json(
        &app,
        "/api/cards/c-101/override",
        serde_json::json!({ "reason": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].is_string());

    let (_, json) = get(&app, "/api/queue").await;
    assert!(card_ids(&json).contains(&"c-101".to_string()));
}

#[tokio::test]
async fn conflict_from_service_maps_to_409() {
    let (_svc, app) = demo();
    get(&app, "/api/queue?status=waiting_on_others").await;
    let (status, _) = send(&app, "POST", "/api/cards/c-105/approve", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn edit_accepts_proposed_action_field() {
    let (svc, app) = demo();
    let (status, json) = post_json(
        &app,
        "/api/cards/c-102/edit",
        serde_json::json!({ "proposedAction": "Count me in." }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["card"]["proposedAction"], "Count me in.");
    assert_eq!(
        svc.card(&"c-102".into()).unwrap().proposed_action,
        "Count me in."
    );
}

#[tokio::test]
async fn escalate_moves_card_out_of_needs_decision() {
    let (_svc, app) = demo();
    get(&app, "/api/queue").await;
    let (status, json) = post_json(
        &app,
        "/api/cards/c-104/escalate",
        serde_json::json!({ "reason": "finance should look" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["card"]["escalated"], true);

    let (_, json) = get(&app, "/api/queue?status=waiting_on_others").await;
    assert!(card_ids(&json).contains(&"c-104".to_string()));
}

#[tokio::test]
async fn unknown_card_is_not_found() {
    let (_svc, app) = demo();
    let (status, _) = send(&app, "POST", "/api/cards/nope/approve", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Selection, conversation, focus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn changing_view_changes_default_slice() {
    let (_svc, app) = demo();
    let (status, json) = send(
        &app,
        "PUT",
        "/api/selection",
        Some(serde_json::json!({ "view": "handled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["view"], "handled");

    let (_, json) = get(&app, "/api/queue").await;
    assert_eq!(card_ids(&json), vec!["c-106"]);
}

#[tokio::test]
async fn conversation_needs_a_selected_card() {
    let (_svc, app) = demo();
    let (status, _) = get(&app, "/api/conversation").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    get(&app, "/api/queue").await;
    let (status, json) = post_json(
        &app,
        "/api/selection/card",
        serde_json::json!({ "cardId": "c-101" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["selected"]["objectiveId"], "obj-c-101");

    let (status, json) = get(&app, "/api/conversation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn selecting_unlisted_card_is_not_found() {
    let (_svc, app) = demo();
    let (status, _) = post_json(
        &app,
        "/api/selection/card",
        serde_json::json!({ "cardId": "c-999" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn focus_accepts_and_lists_refetches() {
    let (_svc, app) = demo();
    let (status, json) = send(&app, "POST", "/api/focus", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let keys = json["refetching"].as_array().unwrap();
    assert!(keys.iter().any(|k| k == "stats"));
}
