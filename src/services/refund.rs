//! Refunds, the money-out counterpart of [`super::payment`].

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use super::settlement;
use crate::db::payments::{self, NewRefund};
use crate::db::orders;
use crate::domain::aggregates::order::resolve_refund_amount;
use crate::domain::aggregates::{PaymentStatus, Refund};
use crate::domain::value_objects::IdempotencyKey;
use crate::error::{CommerceError, Result};
use crate::provider::{PaymentProvider, ProviderStatus, RefundRequest};

#[derive(Clone, Debug)]
pub struct RefundOrderRequest {
    pub order_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub idempotency_key: IdempotencyKey,
    /// `None` or zero refunds everything still refundable.
    pub amount_cents: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefundOrderResult {
    pub refund_id: Uuid,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    pub idempotent: bool,
    pub error_message: Option<String>,
}

impl RefundOrderResult {
    fn replay(r: &Refund) -> Self {
        Self { refund_id: r.id, status: r.status, amount_cents: r.amount_cents, idempotent: true, error_message: r.error_message.clone() }
    }
}

#[derive(Clone)]
pub struct RefundService {
    pool: PgPool,
    provider: Arc<dyn PaymentProvider>,
}

impl RefundService {
    pub fn new(pool: PgPool, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { pool, provider }
    }

    #[instrument(skip(self, req), fields(order_id = %req.order_id, key = %req.idempotency_key, requested = ?req.amount_cents))]
    pub async fn refund_order(&self, req: RefundOrderRequest) -> Result<RefundOrderResult> {
        let key = req.idempotency_key.as_str();

        // phase 1
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, req.order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        let payment = payments::latest_succeeded_payment(&mut *tx, order.id).await?;

        if let Some(p) = &payment {
            if let Some(existing) = payments::find_refund_by_key(&mut *tx, p.id, key).await? {
                tx.commit().await?;
                info!(refund_id = %existing.id, status = %existing.status, "refund replayed");
                return Ok(RefundOrderResult::replay(&existing));
            }
        }
        if !order.status.is_refundable() {
            return Err(CommerceError::NotRefundable);
        }
        let payment = payment.ok_or(CommerceError::NoSucceededPayment)?;

        let pending = payments::pending_refund_total(&mut *tx, order.id).await?;
        let amount = resolve_refund_amount(req.amount_cents, order.remaining_refundable(pending))?;
        if req.amount_cents.is_some_and(|a| a > amount) {
            info!(requested = ?req.amount_cents, clamped = amount, pending, "refund amount clamped to remaining");
        }

        let new = NewRefund {
            order_id: order.id,
            payment_id: payment.id,
            provider: self.provider.name().to_string(),
            amount_cents: amount,
            currency: order.currency.clone(),
            idempotency_key: key.to_string(),
            reason: req.reason.clone(),
        };
        let refund = match payments::insert_refund(&mut tx, &new).await? {
            Some(r) => r,
            None => {
                let existing = payments::find_refund_by_key(&mut *tx, payment.id, key).await?
                    .ok_or(CommerceError::NotFound("refund"))?;
                tx.commit().await?;
                return Ok(RefundOrderResult::replay(&existing));
            }
        };
        tx.commit().await?;

        // phase 2
        let outcome = self.provider.refund_payment(RefundRequest {
            order_id: order.id,
            payment_id: payment.id,
            payment_ref: payment.provider_ref.clone(),
            amount_cents: refund.amount_cents,
            currency: refund.currency.clone(),
            idempotency_key: refund.idempotency_key.clone(),
            reason: refund.reason.clone(),
        }).await;

        // phase 3
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, order.id).await?.ok_or(CommerceError::OrderNotFound)?;
        let current = payments::lock_refund(&mut tx, refund.id).await?.ok_or(CommerceError::NotFound("refund"))?;

        let mut result = RefundOrderResult {
            refund_id: refund.id, status: current.status, amount_cents: refund.amount_cents, idempotent: false, error_message: None,
        };
        let (provider_ref, failure) = match outcome {
            Err(e) => (None, Some(e.to_string())),
            Ok(resp) => match resp.status {
                ProviderStatus::Succeeded => {
                    if settlement::should_apply(current.status, PaymentStatus::Succeeded) {
                        settlement::refund_succeeded(&mut tx, &order, &current, resp.provider_ref.as_deref(), req.actor_user_id).await?;
                        result.status = PaymentStatus::Succeeded;
                    }
                    (resp.provider_ref, None)
                }
                ProviderStatus::Initiated | ProviderStatus::RequiresRedirect => {
                    if current.status == PaymentStatus::Initiated {
                        payments::set_refund_status(&mut tx, current.id, PaymentStatus::Initiated, resp.provider_ref.as_deref(), None).await?;
                    }
                    info!(refund_id = %current.id, "refund pending provider confirmation");
                    (resp.provider_ref, None)
                }
                ProviderStatus::Failed => (resp.provider_ref, Some("refund declined by provider".to_string())),
            },
        };
        if let Some(msg) = failure {
            if settlement::should_apply(current.status, PaymentStatus::Failed) {
                settlement::refund_failed(&mut tx, &order, &current, provider_ref.as_deref(), &msg, req.actor_user_id).await?;
                result.status = PaymentStatus::Failed;
            }
            result.error_message = Some(msg);
        }
        tx.commit().await?;
        Ok(result)
    }
}
