//! Payment provider boundary.
//!
//! Providers are unreliable collaborators: calls may be slow or fail at the transport
//! level, and webhooks arrive at least once and in any order.

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod mock;

pub use mock::{MockMode, MockProvider};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by provider: {0}")]
    Rejected(String),
    #[error("invalid webhook signature")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus { Initiated, Succeeded, Failed, RequiresRedirect }

#[derive(Clone, Debug)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug)]
pub struct CreatePaymentResponse {
    pub provider_ref: Option<String>,
    pub status: ProviderStatus,
    pub redirect_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    pub payment_ref: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RefundResponse {
    pub provider_ref: Option<String>,
    pub status: ProviderStatus,
}

/// Verified webhook notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event_type: String,
    pub payment_ref: Option<String>,
    pub refund_ref: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Scopes payment/refund rows and webhook routes.
    fn name(&self) -> &str;

    async fn create_payment(&self, req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ProviderError>;

    async fn refund_payment(&self, req: RefundRequest) -> Result<RefundResponse, ProviderError>;

    fn verify_and_parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, ProviderError>;
}
