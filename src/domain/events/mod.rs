//! Immutable facts recorded against an order: audit events and ledger entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Append-only audit row per state change.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewOrderEvent {
    pub order_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: &'static str,
    pub from_status: &'static str,
    pub to_status: &'static str,
    pub note: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent { PaymentSucceeded, RefundSucceeded, RefundFailed }

impl LedgerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentSucceeded => "payment_succeeded",
            Self::RefundSucceeded => "refund_succeeded",
            Self::RefundFailed => "refund_failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefType { Payment, Refund }

impl RefType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Payment => "payment", Self::Refund => "refund" }
    }
}

/// Ledger row. Positive amounts flow in, negative flow out, zero records a failure.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct FinancialEntry {
    pub id: Uuid,
    pub order_id: Uuid,
    pub event: String,
    pub amount_cents: i64,
    pub currency: String,
    pub ref_type: String,
    pub ref_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFinancialEntry {
    pub order_id: Uuid,
    pub event: LedgerEvent,
    pub amount_cents: i64,
    pub currency: String,
    pub ref_type: RefType,
    pub ref_id: Uuid,
}

impl NewFinancialEntry {
    pub fn payment_succeeded(order_id: Uuid, payment_id: Uuid, amount_cents: i64, currency: &str) -> Self {
        Self { order_id, event: LedgerEvent::PaymentSucceeded, amount_cents, currency: currency.to_string(), ref_type: RefType::Payment, ref_id: payment_id }
    }
    pub fn refund_succeeded(order_id: Uuid, refund_id: Uuid, amount_cents: i64, currency: &str) -> Self {
        Self { order_id, event: LedgerEvent::RefundSucceeded, amount_cents: -amount_cents, currency: currency.to_string(), ref_type: RefType::Refund, ref_id: refund_id }
    }
    pub fn refund_failed(order_id: Uuid, refund_id: Uuid, currency: &str) -> Self {
        Self { order_id, event: LedgerEvent::RefundFailed, amount_cents: 0, currency: currency.to_string(), ref_type: RefType::Refund, ref_id: refund_id }
    }
}

/// Net settled amount: payments in minus refunds out.
pub fn net_settled(entries: &[FinancialEntry]) -> i64 {
    entries.iter().map(|e| e.amount_cents).sum()
}
