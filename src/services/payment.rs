//! Payment initiation and finalization.
//!
//! Three phases: reserve an `initiated` payment under the order lock, call the provider with
//! no transaction open, then finalize under the order lock again. A payment left
//! `initiated` is reconciled by the webhook path.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::notify::{self, Notifier};
use super::settlement;
use crate::db::{orders, payments};
use crate::db::payments::NewPayment;
use crate::domain::aggregates::{OrderStatus, Payment, PaymentStatus};
use crate::domain::value_objects::IdempotencyKey;
use crate::error::{CommerceError, Result};
use crate::provider::{CreatePaymentRequest, PaymentProvider, ProviderStatus};

#[derive(Clone, Debug)]
pub struct PayOrderRequest {
    pub order_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub idempotency_key: IdempotencyKey,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayOrderResult {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub idempotent: bool,
    pub redirect_url: Option<String>,
    pub error_message: Option<String>,
}

impl PayOrderResult {
    fn replay(p: &Payment) -> Self {
        Self { payment_id: p.id, status: p.status, idempotent: true, redirect_url: None, error_message: p.error_message.clone() }
    }
}

#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
}

impl PaymentService {
    pub fn new(pool: PgPool, provider: Arc<dyn PaymentProvider>, notifier: Arc<dyn Notifier>) -> Self {
        Self { pool, provider, notifier }
    }

    #[instrument(skip(self, req), fields(order_id = %req.order_id, key = %req.idempotency_key))]
    pub async fn pay_order(&self, req: PayOrderRequest) -> Result<PayOrderResult> {
        // phase 1: reserve
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, req.order_id).await?.ok_or(CommerceError::OrderNotFound)?;
        order.authorize(req.actor_user_id)?;

        if let Some(existing) = payments::find_payment_by_key(&mut *tx, order.id, req.idempotency_key.as_str()).await? {
            tx.commit().await?;
            info!(payment_id = %existing.id, status = %existing.status, "payment replayed");
            return Ok(PayOrderResult::replay(&existing));
        }
        if order.status != OrderStatus::Created || order.total_cents <= 0 {
            return Err(CommerceError::OrderNotPayable);
        }

        let new = NewPayment {
            order_id: order.id,
            provider: self.provider.name().to_string(),
            amount_cents: order.total_cents,
            currency: order.currency.clone(),
            idempotency_key: req.idempotency_key.as_str().to_string(),
        };
        let payment = match payments::insert_payment(&mut tx, &new).await? {
            Some(p) => p,
            None => {
                let existing = payments::find_payment_by_key(&mut *tx, order.id, req.idempotency_key.as_str()).await?
                    .ok_or(CommerceError::NotFound("payment"))?;
                tx.commit().await?;
                return Ok(PayOrderResult::replay(&existing));
            }
        };
        tx.commit().await?;

        // phase 2: provider call, no locks held
        let outcome = self.provider.create_payment(CreatePaymentRequest {
            order_id: order.id,
            amount_cents: payment.amount_cents,
            currency: payment.currency.clone(),
            idempotency_key: payment.idempotency_key.clone(),
            return_url: req.return_url.clone(),
            cancel_url: req.cancel_url.clone(),
        }).await;

        // phase 3: finalize
        let mut tx = self.pool.begin().await?;
        let order = orders::lock_order(&mut tx, order.id).await?.ok_or(CommerceError::OrderNotFound)?;
        let current = payments::lock_payment(&mut tx, payment.id).await?.ok_or(CommerceError::NotFound("payment"))?;

        let mut result = PayOrderResult {
            payment_id: payment.id, status: current.status, idempotent: false, redirect_url: None, error_message: None,
        };
        let mut paid_now = false;
        match outcome {
            Err(e) => {
                let msg = e.to_string();
                if settlement::should_apply(current.status, PaymentStatus::Failed) {
                    settlement::payment_failed(&mut tx, &current, None, &msg).await?;
                    result.status = PaymentStatus::Failed;
                }
                result.error_message = Some(msg);
            }
            Ok(resp) => match resp.status {
                ProviderStatus::Initiated | ProviderStatus::RequiresRedirect => {
                    if current.status == PaymentStatus::Initiated {
                        payments::set_payment_status(&mut tx, current.id, PaymentStatus::Initiated, resp.provider_ref.as_deref(), None).await?;
                    }
                    result.redirect_url = resp.redirect_url;
                    info!(payment_id = %current.id, "payment pending provider confirmation");
                }
                ProviderStatus::Succeeded => {
                    if settlement::should_apply(current.status, PaymentStatus::Succeeded) {
                        paid_now = settlement::payment_succeeded(&mut tx, &order, &current, resp.provider_ref.as_deref(), req.actor_user_id).await?;
                        result.status = PaymentStatus::Succeeded;
                    }
                }
                ProviderStatus::Failed => {
                    let msg = "payment declined by provider";
                    if settlement::should_apply(current.status, PaymentStatus::Failed) {
                        settlement::payment_failed(&mut tx, &current, resp.provider_ref.as_deref(), msg).await?;
                        result.status = PaymentStatus::Failed;
                    }
                    result.error_message = Some(msg.to_string());
                }
            },
        }
        tx.commit().await?;

        if paid_now {
            match order.contact_email.as_deref() {
                Some(to) => notify::spawn_enqueue(self.notifier.clone(), notify::payment_received(&order, payment.amount_cents, to)),
                None => warn!(order_id = %order.id, "paid order has no contact email"),
            }
        }
        Ok(result)
    }
}
