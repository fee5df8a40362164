//! Finalization steps shared by the synchronous third phase and the webhook appliers.
//! Every function expects the order row, then the payment/refund row, to be locked by the
//! caller's transaction.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{ledger, orders, payments};
use crate::domain::aggregates::order::{apply_refund, RefundApplication};
use crate::domain::aggregates::{Order, Payment, PaymentStatus, Refund};
use crate::domain::events::{NewFinancialEntry, NewOrderEvent};
use crate::error::{CommerceError, Result};

/// Rows only leave `initiated`, except that a provider success overrides a local failure.
pub fn should_apply(current: PaymentStatus, target: PaymentStatus) -> bool {
    match (current, target) {
        (c, t) if c == t => false,
        (PaymentStatus::Initiated, _) => true,
        (PaymentStatus::Failed, PaymentStatus::Succeeded) => true,
        _ => false,
    }
}

/// Marks the payment succeeded, books it once and moves the order `created -> paid`.
/// Returns whether the order moved.
pub async fn payment_succeeded(
    conn: &mut PgConnection, order: &Order, payment: &Payment, provider_ref: Option<&str>, actor_user_id: Option<Uuid>,
) -> Result<bool> {
    payments::set_payment_status(conn, payment.id, PaymentStatus::Succeeded, provider_ref, None).await?;
    ledger::ensure_entry(conn, &NewFinancialEntry::payment_succeeded(order.id, payment.id, payment.amount_cents, &payment.currency)).await?;

    let moved = orders::mark_paid_if_created(conn, order.id, Utc::now()).await?;
    if moved {
        orders::insert_event(conn, &NewOrderEvent {
            order_id: order.id,
            actor_user_id,
            action: "pay",
            from_status: order.status.as_str(),
            to_status: "paid",
            note: None,
        }).await?;
        info!(order_id = %order.id, payment_id = %payment.id, "order paid");
    } else {
        info!(order_id = %order.id, status = %order.status, "payment settled, order already past created");
    }
    Ok(moved)
}

pub async fn payment_failed(conn: &mut PgConnection, payment: &Payment, provider_ref: Option<&str>, error: &str) -> Result<()> {
    payments::set_payment_status(conn, payment.id, PaymentStatus::Failed, provider_ref, Some(error)).await?;
    warn!(payment_id = %payment.id, order_id = %payment.order_id, error, "payment failed");
    Ok(())
}

/// Marks the refund succeeded, books the outflow once and recomputes order refund totals.
/// Orders outside `paid`/`partially_refunded` keep their status and only gain refunded cents.
pub async fn refund_succeeded(
    conn: &mut PgConnection, order: &Order, refund: &Refund, provider_ref: Option<&str>, actor_user_id: Option<Uuid>,
) -> Result<RefundApplication> {
    payments::set_refund_status(conn, refund.id, PaymentStatus::Succeeded, provider_ref, None).await?;
    let booked = ledger::ensure_entry(conn, &NewFinancialEntry::refund_succeeded(order.id, refund.id, refund.amount_cents, &refund.currency)).await?;

    let mut applied = apply_refund(order.total_cents, order.refunded_cents, refund.amount_cents);
    if !booked {
        // totals were already moved by whoever booked the entry
        return Ok(RefundApplication { refunded_cents: order.refunded_cents, status: order.status, fully_refunded: order.refunded_cents >= order.total_cents });
    }
    let mut note = format!("refunded {} of {} cents", refund.amount_cents, order.total_cents);
    if !order.status.is_refundable() {
        warn!(order_id = %order.id, refund_id = %refund.id, status = %order.status, "refund settled after order left the refundable states");
        note.push_str(&format!(", order stays {}", order.status));
        applied.status = order.status;
    }
    let refunded_at = applied.fully_refunded.then(Utc::now);
    if !orders::apply_refund_totals(conn, order.id, order.refunded_cents, applied.refunded_cents, applied.status, refunded_at).await? {
        return Err(CommerceError::Internal(format!("refund totals for order {} changed under lock", order.id)));
    }
    orders::insert_event(conn, &NewOrderEvent {
        order_id: order.id,
        actor_user_id,
        action: "refund",
        from_status: order.status.as_str(),
        to_status: applied.status.as_str(),
        note: Some(note),
    }).await?;
    info!(order_id = %order.id, refund_id = %refund.id, refunded = applied.refunded_cents, status = %applied.status, "refund settled");
    Ok(applied)
}

/// Marks the refund failed, writes the informational ledger row and an audit event.
/// The order status is untouched.
pub async fn refund_failed(
    conn: &mut PgConnection, order: &Order, refund: &Refund, provider_ref: Option<&str>, error: &str, actor_user_id: Option<Uuid>,
) -> Result<()> {
    payments::set_refund_status(conn, refund.id, PaymentStatus::Failed, provider_ref, Some(error)).await?;
    ledger::ensure_entry(conn, &NewFinancialEntry::refund_failed(order.id, refund.id, &refund.currency)).await?;
    orders::insert_event(conn, &NewOrderEvent {
        order_id: order.id,
        actor_user_id,
        action: "refund_failed",
        from_status: order.status.as_str(),
        to_status: order.status.as_str(),
        note: Some(error.to_string()),
    }).await?;
    warn!(order_id = %order.id, refund_id = %refund.id, error, "refund failed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn test_initiated_moves_to_any_outcome() {
        assert!(should_apply(Initiated, Succeeded));
        assert!(should_apply(Initiated, Failed));
    }

    #[test]
    fn test_terminal_rows_stay_put() {
        assert!(!should_apply(Succeeded, Succeeded));
        assert!(!should_apply(Failed, Failed));
        assert!(!should_apply(Succeeded, Failed));
        assert!(!should_apply(Succeeded, Initiated));
    }

    #[test]
    fn test_provider_success_overrides_local_failure() {
        assert!(should_apply(Failed, Succeeded));
    }
}
