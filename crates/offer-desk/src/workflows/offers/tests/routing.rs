use super::common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::offers::router::{offer_router, USER_HEADER};

fn router() -> Router {
    let (service, _, _) = build_service();
    offer_router(Arc::new(service))
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    (status, read_json(response).await)
}

async fn seeded_listing(router: &Router) -> String {
    let (status, body) = send(
        router,
        request(
            "POST",
            "/api/v1/listings",
            Some("agent-1"),
            Some(json!({
                "address": "1247 Oak Valley Dr",
                "city": "Austin",
                "state": "TX",
                "asking_price": 700000.0,
                "loan_balance": 200000.0
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().expect("listing id").to_string()
}

fn reference_offer() -> Value {
    json!({
        "buyerName": "Jordan Reyes",
        "buyerType": "pre-approved",
        "price": "$700,000",
        "agentCommission": 3,
        "closingTimelineDays": 30,
        "contingencies": ["inspection"]
    })
}

#[tokio::test]
async fn requests_without_caller_are_unauthorized() {
    let router = router();
    let (status, body) = send(&router, request("GET", "/api/v1/listings/listing-000001", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().expect("error").contains(USER_HEADER));
}

#[tokio::test]
async fn submit_route_returns_scored_offer_view() {
    let router = router();
    let listing_id = seeded_listing(&router).await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/listings/{listing_id}/offers"),
            Some("agent-1"),
            Some(reference_offer()),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["commission"], 21_000.0);
    assert_eq!(body["net_proceeds"], 479_000.0);
    assert_eq!(body["risk_score"], 8);
    assert_eq!(body["overall_score"], 113);
    assert_eq!(body["display_score"], 100);
    assert_eq!(body["buyer_type"], "pre_approved");
}

#[tokio::test]
async fn invalid_offer_returns_field_errors() {
    let router = router();
    let listing_id = seeded_listing(&router).await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/listings/{listing_id}/offers"),
            Some("agent-1"),
            Some(json!({ "price": "abc", "closing_timeline_days": 30 })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"][0]["field"], "price");
}

#[tokio::test]
async fn other_users_are_forbidden() {
    let router = router();
    let listing_id = seeded_listing(&router).await;

    let (status, _) = send(
        &router,
        request(
            "GET",
            &format!("/api/v1/listings/{listing_id}/comparison"),
            Some("agent-2"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn counter_history_and_conflict_flow() {
    let router = router();
    let listing_id = seeded_listing(&router).await;
    let (_, offer) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/listings/{listing_id}/offers"),
            Some("agent-1"),
            Some(reference_offer()),
        ),
    )
    .await;
    let offer_id = offer["offer_id"].as_str().expect("offer id").to_string();

    let (status, counter) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/offers/{offer_id}/counter"),
            Some("agent-1"),
            Some(json!({ "price": 690000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(counter["version_number"], 2);
    assert_eq!(counter["parent_offer_id"], offer_id.as_str());

    let (status, _) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/offers/{offer_id}/counter"),
            Some("agent-1"),
            Some(json!({ "price": 695000 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let counter_id = counter["offer_id"].as_str().expect("counter id");
    let (status, history) = send(
        &router,
        request(
            "GET",
            &format!("/api/v1/offers/{counter_id}/history"),
            Some("agent-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let versions: Vec<i64> = history
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|view| view["version_number"].as_i64())
        .collect();
    assert_eq!(versions, vec![1, 2]);

    let (status, diff) = send(
        &router,
        request(
            "GET",
            &format!("/api/v1/offers/{offer_id}/diff/{counter_id}"),
            Some("agent-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(diff["price"]["changed"], true);
    assert_eq!(diff["notes"]["changed"], false);
}

#[tokio::test]
async fn status_route_rejects_second_transition() {
    let router = router();
    let listing_id = seeded_listing(&router).await;
    let (_, offer) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/listings/{listing_id}/offers"),
            Some("agent-1"),
            Some(reference_offer()),
        ),
    )
    .await;
    let offer_id = offer["offer_id"].as_str().expect("offer id").to_string();
    let uri = format!("/api/v1/offers/{offer_id}/status");

    let (status, body) = send(
        &router,
        request("POST", &uri, Some("agent-1"), Some(json!({ "status": "rejected" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status_label"], "rejected");

    let (status, _) = send(
        &router,
        request("POST", &uri, Some("agent-1"), Some(json!({ "status": "accepted" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn failed_extraction_route_stores_placeholder() {
    let router = router();
    let listing_id = seeded_listing(&router).await;

    let (status, body) = send(
        &router,
        request(
            "POST",
            &format!("/api/v1/listings/{listing_id}/offers/extracted"),
            Some("agent-1"),
            Some(json!({ "outcome": "failed", "reason": "blank page" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["source"], "extraction_fallback");
    assert_eq!(body["needs_review"], true);
    assert_eq!(body["price"], 700_000.0);
}

#[tokio::test]
async fn priorities_route_patches_weights() {
    let router = router();
    let listing_id = seeded_listing(&router).await;
    let uri = format!("/api/v1/listings/{listing_id}/priorities");

    let (status, body) = send(
        &router,
        request("PATCH", &uri, Some("agent-1"), Some(json!({ "closing_speed": 9 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["closing_speed"], 9);
    assert_eq!(body["price"], 5);

    let (status, _) = send(
        &router,
        request("PATCH", &uri, Some("agent-1"), Some(json!({ "price": 0 }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn unknown_offer_is_not_found() {
    let router = router();
    let (status, _) = send(
        &router,
        request("GET", "/api/v1/offers/offer-424242", Some("agent-1"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
