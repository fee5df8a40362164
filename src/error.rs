//! Error taxonomy shared by every service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::provider::ProviderError;

/// Shortfall for a single variant during stock reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutOfStockItem {
    pub variant_id: Uuid,
    pub requested: i32,
    pub available: i32,
}

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("cart is empty")]
    CartEmpty,

    #[error("currency mismatch in cart")]
    CurrencyMismatch,

    #[error("product unavailable")]
    ProductUnavailable,

    #[error("{}", out_of_stock_message(.items))]
    OutOfStock { items: Vec<OutOfStockItem> },

    #[error("invalid order status transition")]
    InvalidTransition,

    #[error("order not actionable")]
    NotActionable,

    #[error("order not payable")]
    OrderNotPayable,

    #[error("order not refundable")]
    NotRefundable,

    #[error("no succeeded payment found")]
    NoSucceededPayment,

    #[error("forbidden")]
    Forbidden,

    #[error("order not found")]
    OrderNotFound,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown webhook event type: {0}")]
    UnknownEventType(String),

    #[error("payment provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

fn out_of_stock_message(items: &[OutOfStockItem]) -> String {
    match items.first() {
        Some(it) => format!(
            "out of stock: variant={} requested={} available={}",
            it.variant_id, it.requested, it.available
        ),
        None => "out of stock".to_string(),
    }
}

impl CommerceError {
    /// Deadlocks and lock timeouts that are worth replaying the whole transaction for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(e) if crate::db::is_retryable(e))
    }

    /// Hides whether an order exists from callers that do not own it.
    pub fn conceal_existence(self) -> Self {
        match self {
            Self::OrderNotFound => Self::Forbidden,
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::OutOfStock { .. } => StatusCode::CONFLICT,
            Self::CartEmpty | Self::CurrencyMismatch | Self::ProductUnavailable => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::InvalidTransition
            | Self::NotActionable
            | Self::OrderNotPayable
            | Self::NotRefundable
            | Self::NoSucceededPayment => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::OrderNotFound | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnknownEventType(_) | Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the end user. Infrastructure details never leak here.
    pub fn user_message(&self) -> String {
        match self {
            Self::OutOfStock { .. } => "Some items are out of stock. Please update your cart.".into(),
            Self::CartEmpty => "Your cart is empty.".into(),
            Self::CurrencyMismatch => "Your cart mixes currencies. Please update your cart.".into(),
            Self::ProductUnavailable => "Some items are no longer available. Please update your cart.".into(),
            Self::InvalidTransition => "This action is not allowed for the order's current status.".into(),
            Self::NotActionable => "This order action is not supported.".into(),
            Self::OrderNotPayable => "This order can no longer be paid.".into(),
            Self::NotRefundable => "This order cannot be refunded.".into(),
            Self::NoSucceededPayment => "This order has no successful payment to refund.".into(),
            Self::Forbidden => "No access.".into(),
            Self::OrderNotFound => "Order not found.".into(),
            Self::NotFound(what) => format!("{what} not found."),
            Self::Validation(m) => m.clone(),
            Self::UnknownEventType(_) | Self::Provider(_) => "Payment provider error. Please try again.".into(),
            Self::Database(_) | Self::Internal(_) => "An internal error occurred.".into(),
        }
    }
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::info!(error = %self, "request rejected");
        }
        let body = match &self {
            Self::OutOfStock { items } => json!({"error": self.user_message(), "items": items}),
            _ => json!({"error": self.user_message()}),
        };
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for CommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CommerceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_stock_reports_first_shortfall() {
        let id = Uuid::nil();
        let err = CommerceError::OutOfStock {
            items: vec![OutOfStockItem { variant_id: id, requested: 3, available: 1 }],
        };
        assert_eq!(
            err.to_string(),
            format!("out of stock: variant={id} requested=3 available=1")
        );
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn missing_order_is_concealed_as_forbidden() {
        let err = CommerceError::OrderNotFound.conceal_existence();
        assert!(matches!(err, CommerceError::Forbidden));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.user_message(), "No access.");
    }

    #[test]
    fn infrastructure_details_stay_internal() {
        let err = CommerceError::Internal("pool exhausted on host db-2".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("db-2"));
        assert!(!err.is_retryable());
    }
}
