//! Webhook reconciliation: finalizes payments and refunds that the synchronous path left
//! `initiated`.
//!
//! Deliveries are deduplicated on `(provider, event_id)`. The dedup row and the applier's
//! effects commit together, so a processed event is never applied twice and a failed one is
//! retried on the next delivery.

use sqlx::{PgConnection, PgPool};
use tracing::{error, info, instrument, warn};

use super::settlement;
use crate::db::{orders, payments, provider_events};
use crate::domain::aggregates::PaymentStatus;
use crate::error::{CommerceError, Result};
use crate::provider::WebhookEvent;

pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const REFUND_SUCCEEDED: &str = "refund.succeeded";
pub const REFUND_FAILED: &str = "refund.failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Already processed; nothing was re-run.
    Duplicate,
}

#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
}

impl WebhookService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, event, raw_body), fields(event_id = %event.event_id, event_type = %event.event_type))]
    pub async fn handle(&self, provider: &str, event: &WebhookEvent, raw_body: &[u8]) -> Result<WebhookOutcome> {
        let payload = serde_json::from_slice::<serde_json::Value>(raw_body)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(raw_body).into_owned()));

        let mut tx = self.pool.begin().await?;
        let Some(row_id) = provider_events::record_event(&mut tx, provider, &event.event_id, &event.event_type, &payload).await? else {
            tx.commit().await?;
            info!("webhook already processed");
            return Ok(WebhookOutcome::Duplicate);
        };

        match apply(&mut tx, provider, event).await {
            Ok(()) => {
                provider_events::mark_processed(&mut tx, row_id).await?;
                tx.commit().await?;
                Ok(WebhookOutcome::Applied)
            }
            Err(e) => {
                tx.rollback().await?;
                error!(error = %e, "webhook apply failed");
                if let Err(rec) = provider_events::record_failure(&self.pool, provider, &event.event_id, &event.event_type, &payload, &e.to_string()).await {
                    error!(error = %rec, "could not record webhook failure");
                }
                Err(e)
            }
        }
    }
}

async fn apply(conn: &mut PgConnection, provider: &str, event: &WebhookEvent) -> Result<()> {
    match event.event_type.as_str() {
        PAYMENT_SUCCEEDED => apply_payment(conn, provider, event, PaymentStatus::Succeeded).await,
        PAYMENT_FAILED => apply_payment(conn, provider, event, PaymentStatus::Failed).await,
        REFUND_SUCCEEDED => apply_refund(conn, provider, event, PaymentStatus::Succeeded).await,
        REFUND_FAILED => apply_refund(conn, provider, event, PaymentStatus::Failed).await,
        other => Err(CommerceError::UnknownEventType(other.to_string())),
    }
}

async fn apply_payment(conn: &mut PgConnection, provider: &str, event: &WebhookEvent, target: PaymentStatus) -> Result<()> {
    let provider_ref = event.payment_ref.as_deref()
        .ok_or_else(|| CommerceError::Validation("webhook has no payment reference".into()))?;
    let found = payments::find_payment_by_ref(&mut *conn, provider, provider_ref).await?.ok_or(CommerceError::NotFound("payment"))?;

    let order = orders::lock_order(conn, found.order_id).await?.ok_or(CommerceError::OrderNotFound)?;
    let payment = payments::lock_payment(conn, found.id).await?.ok_or(CommerceError::NotFound("payment"))?;
    if event.amount_cents != 0 && event.amount_cents != payment.amount_cents {
        warn!(payment_id = %payment.id, reported = event.amount_cents, expected = payment.amount_cents, "webhook amount differs from payment");
    }
    if !settlement::should_apply(payment.status, target) {
        info!(payment_id = %payment.id, status = %payment.status, "payment already final, webhook is a no-op");
        return Ok(());
    }
    match target {
        PaymentStatus::Succeeded => { settlement::payment_succeeded(conn, &order, &payment, None, None).await?; }
        _ => settlement::payment_failed(conn, &payment, None, "provider reported payment failure").await?,
    }
    Ok(())
}

async fn apply_refund(conn: &mut PgConnection, provider: &str, event: &WebhookEvent, target: PaymentStatus) -> Result<()> {
    let provider_ref = event.refund_ref.as_deref()
        .ok_or_else(|| CommerceError::Validation("webhook has no refund reference".into()))?;
    let found = payments::find_refund_by_ref(&mut *conn, provider, provider_ref).await?.ok_or(CommerceError::NotFound("refund"))?;

    let order = orders::lock_order(conn, found.order_id).await?.ok_or(CommerceError::OrderNotFound)?;
    let refund = payments::lock_refund(conn, found.id).await?.ok_or(CommerceError::NotFound("refund"))?;
    if event.amount_cents != 0 && event.amount_cents != refund.amount_cents {
        warn!(refund_id = %refund.id, reported = event.amount_cents, expected = refund.amount_cents, "webhook amount differs from refund");
    }
    if !settlement::should_apply(refund.status, target) {
        info!(refund_id = %refund.id, status = %refund.status, "refund already final, webhook is a no-op");
        return Ok(());
    }
    match target {
        PaymentStatus::Succeeded => { settlement::refund_succeeded(conn, &order, &refund, None, None).await?; }
        _ => settlement::refund_failed(conn, &order, &refund, None, "provider reported refund failure", None).await?,
    }
    Ok(())
}
