//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::value_objects::OrderOwner;
use crate::error::{CommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { Created, Paid, Shipped, Delivered, Cancelled, PartiallyRefunded, Refunded }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
        }
    }
    pub fn is_refundable(&self) -> bool { matches!(self, Self::Paid | Self::PartiallyRefunded) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "created" => Self::Created,
            "paid" => Self::Paid,
            "shipped" => Self::Shipped,
            "delivered" => Self::Delivered,
            "cancelled" => Self::Cancelled,
            "partially_refunded" => Self::PartiallyRefunded,
            "refunded" => Self::Refunded,
            other => return Err(UnknownStatus(other.to_string())),
        })
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = UnknownStatus;
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> { s.parse() }
}

/// Explicit administrative actions. Refund-driven partial transitions are computed by
/// [`apply_refund`] instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderAction { Cancel, Ship, Deliver, Refund }

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Cancel => "cancel", Self::Ship => "ship", Self::Deliver => "deliver", Self::Refund => "refund" }
    }
}

impl FromStr for OrderAction {
    type Err = CommerceError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "cancel" => Ok(Self::Cancel),
            "ship" => Ok(Self::Ship),
            "deliver" => Ok(Self::Deliver),
            "refund" => Ok(Self::Refund),
            _ => Err(CommerceError::NotActionable),
        }
    }
}

/// Transition table for administrative actions.
pub fn next_status(from: OrderStatus, action: OrderAction) -> Result<OrderStatus> {
    use OrderAction::*;
    use OrderStatus::*;
    match (action, from) {
        (Cancel, Created) => Ok(Cancelled),
        (Ship, Paid) => Ok(Shipped),
        (Deliver, Shipped) => Ok(Delivered),
        (Refund, Paid) => Ok(Refunded),
        _ => Err(CommerceError::InvalidTransition),
    }
}

/// Amount still refundable once settled and in-flight refunds are accounted for.
pub fn remaining_refundable(total_cents: i64, refunded_cents: i64, pending_cents: i64) -> i64 {
    total_cents - refunded_cents - pending_cents
}

/// Resolves a requested refund amount: `None`/`0` means everything remaining,
/// anything larger than `remaining` is clamped.
pub fn resolve_refund_amount(requested: Option<i64>, remaining: i64) -> Result<i64> {
    if remaining <= 0 { return Err(CommerceError::NotRefundable); }
    match requested {
        None | Some(0) => Ok(remaining),
        Some(n) if n < 0 => Err(CommerceError::Validation("refund amount must not be negative".into())),
        Some(n) => Ok(n.min(remaining)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefundApplication {
    pub refunded_cents: i64,
    pub status: OrderStatus,
    pub fully_refunded: bool,
}

/// New refund totals after a refund of `amount_cents` settles.
pub fn apply_refund(total_cents: i64, refunded_cents: i64, amount_cents: i64) -> RefundApplication {
    let refunded = refunded_cents.saturating_add(amount_cents).min(total_cents);
    if refunded >= total_cents {
        RefundApplication { refunded_cents: total_cents, status: OrderStatus::Refunded, fully_refunded: true }
    } else {
        RefundApplication { refunded_cents: refunded, status: OrderStatus::PartiallyRefunded, fully_refunded: false }
    }
}

/// Order amounts fixed at creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderTotals { pub subtotal_cents: i64, pub shipping_cents: i64, pub tax_cents: i64, pub discount_cents: i64 }

impl OrderTotals {
    pub fn total_cents(&self) -> Result<i64> {
        if self.shipping_cents < 0 || self.tax_cents < 0 || self.discount_cents < 0 {
            return Err(CommerceError::Validation("shipping, tax and discount must not be negative".into()));
        }
        let gross = self.subtotal_cents
            .checked_add(self.shipping_cents)
            .and_then(|v| v.checked_add(self.tax_cents))
            .ok_or_else(|| CommerceError::Validation("order amount overflow".into()))?;
        if self.discount_cents >= gross {
            // payments must move a positive amount
            return Err(CommerceError::Validation("discount must leave a payable order amount".into()));
        }
        Ok(gross - self.discount_cents)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_email: Option<String>,
    pub contact_email: Option<String>,
    #[serde(skip)]
    pub actor_key: String,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
    pub cart_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub currency: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub refunded_cents: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn owner(&self) -> Option<OrderOwner> {
        match (self.user_id, &self.guest_email) {
            (Some(id), _) => Some(OrderOwner::User(id)),
            (None, Some(email)) => Some(OrderOwner::Guest(email.clone())),
            (None, None) => None,
        }
    }

    /// An order with an owning user is only accessible to that user.
    pub fn authorize(&self, actor_user_id: Option<Uuid>) -> Result<()> {
        match (self.user_id, actor_user_id) {
            (Some(owner), Some(actor)) if owner == actor => Ok(()),
            (Some(_), _) => Err(CommerceError::Forbidden),
            (None, _) => Ok(()),
        }
    }

    pub fn remaining_refundable(&self, pending_cents: i64) -> i64 {
        remaining_refundable(self.total_cents, self.refunded_cents, pending_cents)
    }
}

/// Frozen snapshot of a purchased line.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub unit_price_cents: i64,
    pub currency: String,
    pub quantity: i32,
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
}
