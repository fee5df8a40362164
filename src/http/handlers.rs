use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use super::actor::{Actor, AdminActor};
use super::AppState;
use crate::domain::aggregates::OrderAction;
use crate::domain::value_objects::{IdempotencyKey, OrderOwner};
use crate::error::{CommerceError, Result};
use crate::services::{
    CreateOrderRequest, PayOrderRequest, RefundOrderRequest, TransitionRequest, WebhookOutcome,
};

fn idempotency_key(raw: Option<&str>) -> Result<IdempotencyKey> {
    match raw.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => IdempotencyKey::new(k).map_err(|e| CommerceError::Validation(e.to_string())),
        None => Ok(IdempotencyKey::generate()),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "storefront-engine"}))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutBody {
    pub cart_id: Uuid,
    #[validate(email)]
    pub guest_email: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub shipping_cents: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub tax_cents: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub discount_cents: i64,
    #[serde(default)]
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
}

pub async fn checkout(State(s): State<AppState>, actor: Actor, Json(body): Json<CheckoutBody>) -> Result<(StatusCode, Json<crate::services::CreateOrderResult>)> {
    body.validate()?;
    let owner = match (actor.user_id, body.guest_email.as_deref()) {
        (Some(id), _) => OrderOwner::User(id),
        (None, Some(email)) => OrderOwner::guest(email),
        (None, None) => return Err(CommerceError::Validation("guest_email is required for guest checkout".into())),
    };
    let idempotency_key = match body.idempotency_key.as_deref() {
        Some(k) => Some(IdempotencyKey::new(k.trim()).map_err(|e| CommerceError::Validation(e.to_string()))?),
        None => None,
    };
    let result = s.orders.create_from_cart(CreateOrderRequest {
        cart_id: body.cart_id,
        owner,
        contact_email: body.contact_email,
        idempotency_key,
        shipping_cents: body.shipping_cents,
        tax_cents: body.tax_cents,
        discount_cents: body.discount_cents,
        shipping_address: body.shipping_address,
        billing_address: body.billing_address,
    }).await?;
    let status = if result.idempotent { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct DisplayParams {
    pub currency: Option<String>,
    pub rate: Option<String>,
}

pub async fn get_order(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, Query(p): Query<DisplayParams>) -> Result<Json<crate::services::orders::OrderView>> {
    let display = match (p.currency, p.rate) {
        (Some(currency), Some(rate)) => {
            let rate = Decimal::from_str(rate.trim()).map_err(|_| CommerceError::Validation("invalid exchange rate".into()))?;
            Some((currency, rate))
        }
        _ => None,
    };
    Ok(Json(s.orders.view_for_owner(id, actor.user_id, display).await?))
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PayBody {
    #[validate(length(min = 1, max = 64))]
    pub idempotency_key: Option<String>,
}

pub async fn pay_order(State(s): State<AppState>, actor: Actor, Path(id): Path<Uuid>, body: Option<Json<PayBody>>) -> Result<Json<crate::services::PayOrderResult>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;
    let result = s.payments.pay_order(PayOrderRequest {
        order_id: id,
        actor_user_id: actor.user_id,
        idempotency_key: idempotency_key(body.idempotency_key.as_deref())?,
        return_url: format!("{}/orders/{id}/payment/return", s.base_url),
        cancel_url: format!("{}/orders/{id}/payment/cancel", s.base_url),
    }).await.map_err(CommerceError::conceal_existence)?;
    Ok(Json(result))
}

pub async fn admin_order(State(s): State<AppState>, _admin: AdminActor, Path(id): Path<Uuid>) -> Result<Json<crate::services::admin::AdminOrderView>> {
    Ok(Json(s.admin.detail(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionForm {
    pub confirm: Option<String>,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub amount_cents: Option<String>,
}

impl ActionForm {
    fn confirmed(&self) -> bool {
        self.confirm.as_deref().map(str::trim) == Some("1")
    }

    fn amount_cents(&self) -> Result<Option<i64>> {
        match self.amount_cents.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            None => Ok(None),
            Some(a) => a.parse::<i64>().map(Some).map_err(|_| CommerceError::Validation("amount_cents must be an integer".into())),
        }
    }
}

pub async fn admin_action(
    State(s): State<AppState>, AdminActor(admin_id): AdminActor, Path((id, action)): Path<(Uuid, String)>, Form(form): Form<ActionForm>,
) -> Result<Response> {
    if !form.confirmed() {
        return Ok(Redirect::to(&format!("/api/v1/admin/orders/{id}")).into_response());
    }
    match OrderAction::from_str(&action)? {
        OrderAction::Refund => {
            let result = s.refunds.refund_order(RefundOrderRequest {
                order_id: id,
                actor_user_id: Some(admin_id),
                idempotency_key: idempotency_key(form.idempotency_key.as_deref())?,
                amount_cents: form.amount_cents()?,
                reason: form.note.clone().filter(|n| !n.trim().is_empty()),
            }).await?;
            Ok(Json(result).into_response())
        }
        other => {
            let result = s.admin.transition(TransitionRequest {
                order_id: id,
                actor_user_id: Some(admin_id),
                action: other,
                note: form.note,
            }).await?;
            Ok(Json(result).into_response())
        }
    }
}

pub async fn webhook(State(s): State<AppState>, Path(provider): Path<String>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(p) = s.providers.get(&provider) else {
        return CommerceError::NotFound("provider").into_response();
    };
    let event = match p.verify_and_parse_webhook(&headers, &body) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(provider = %provider, error = %e, "rejected webhook");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid webhook"}))).into_response();
        }
    };
    match s.webhooks.handle(p.name(), &event, &body).await {
        Ok(outcome) => (StatusCode::OK, Json(json!({"status": "ok", "duplicate": outcome == WebhookOutcome::Duplicate}))).into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "webhook processing failed"}))).into_response(),
    }
}
