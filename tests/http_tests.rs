mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use common::*;
use storefront_engine::db::orders;
use storefront_engine::domain::aggregates::OrderStatus;
use storefront_engine::http::{router, AppState};
use storefront_engine::provider::mock::SIGNATURE_HEADER;
use storefront_engine::provider::{MockMode, MockProvider};
use storefront_engine::services::LogNotifier;

fn app_with(pool: PgPool, mode: MockMode) -> Router {
    let provider = Arc::new(MockProvider::new("mock", "whsec_test", mode));
    router(AppState::new(pool, provider, Arc::new(LogNotifier), "http://shop.test"))
}

/// Router over a pool that never connects; only for requests rejected before any query.
fn offline_app() -> Router {
    let pool = PgPoolOptions::new().connect_lazy("postgres://nobody@127.0.0.1:1/none").unwrap();
    app_with(pool, MockMode::Succeeded)
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn signed_webhook(body: &serde_json::Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = MockProvider::new("mock", "whsec_test", MockMode::Succeeded).sign(&raw, Utc::now().timestamp()).unwrap();
    Request::post("/webhooks/mock")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(raw))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let res = offline_app().oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "healthy");
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let req = Request::post("/webhooks/mock")
        .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
        .body(Body::from(r#"{"id":"evt_1","type":"payment.succeeded"}"#))
        .unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "invalid webhook");
}

#[tokio::test]
async fn webhook_for_unknown_provider_is_not_found() {
    let req = Request::post("/webhooks/stripe").body(Body::from("{}")).unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_action_without_confirmation_redirects() {
    let order_id = Uuid::now_v7();
    let req = Request::post(format!("/api/v1/admin/orders/{order_id}/cancel"))
        .header("x-user-id", Uuid::now_v7().to_string())
        .header("x-user-role", "admin")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("note=changed+my+mind"))
        .unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[header::LOCATION], format!("/api/v1/admin/orders/{order_id}").as_str());
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let req = Request::post(format!("/api/v1/admin/orders/{}/cancel", Uuid::now_v7()))
        .header("x-user-id", Uuid::now_v7().to_string())
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("confirm=1"))
        .unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let req = Request::get(format!("/api/v1/admin/orders/{}", Uuid::now_v7()))
        .header("x-user-role", "admin")
        .body(Body::empty())
        .unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_user_header_is_a_validation_error() {
    let req = Request::get(format!("/api/v1/orders/{}", Uuid::now_v7()))
        .header("x-user-id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let res = offline_app().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn checkout_pay_and_signed_webhook_end_to_end() {
    let Some(pool) = test_pool().await else { return };
    let user = Uuid::now_v7();
    let variant = seed_variant(&pool, 4500, "EUR", 3).await;
    let cart = seed_cart(&pool, Some(user), &[(variant, 2)]).await;
    let app = app_with(pool.clone(), MockMode::Initiated);

    let checkout = Request::post("/api/v1/checkout")
        .header("x-user-id", user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({"cart_id": cart, "idempotency_key": "web-1"}).to_string()))
        .unwrap();
    let res = app.clone().oneshot(checkout).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = json_body(res).await;
    assert_eq!(created["total_cents"], 9000);
    let order_id: Uuid = created["order_id"].as_str().unwrap().parse().unwrap();

    // a stranger learns nothing about the order
    let peek = Request::post(format!("/api/v1/orders/{order_id}/pay"))
        .header("x-user-id", Uuid::now_v7().to_string())
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(peek).await.unwrap().status(), StatusCode::FORBIDDEN);

    let pay = Request::post(format!("/api/v1/orders/{order_id}/pay"))
        .header("x-user-id", user.to_string())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"idempotency_key":"web-pay"}"#))
        .unwrap();
    let res = app.clone().oneshot(pay).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "initiated");

    let payment = storefront_engine::db::payments::list_payments(&pool, order_id).await.unwrap().remove(0);
    let event = serde_json::json!({
        "id": format!("evt_{}", Uuid::now_v7().simple()),
        "type": "payment.succeeded",
        "data": {"payment_ref": payment.provider_ref, "amount_cents": 9000, "currency": "EUR"}
    });
    let res = app.clone().oneshot(signed_webhook(&event)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["duplicate"], false);
    let res = app.clone().oneshot(signed_webhook(&event)).await.unwrap();
    assert_eq!(json_body(res).await["duplicate"], true);

    let order = orders::get_order(&pool, order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn unknown_event_type_returns_server_error() {
    let Some(pool) = test_pool().await else { return };
    let app = app_with(pool, MockMode::Succeeded);
    let event = serde_json::json!({"id": format!("evt_{}", Uuid::now_v7().simple()), "type": "charge.disputed"});
    let res = app.oneshot(signed_webhook(&event)).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
