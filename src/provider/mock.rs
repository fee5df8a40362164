//! Mock payment provider with HMAC-signed webhooks.

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    CreatePaymentRequest, CreatePaymentResponse, PaymentProvider, ProviderError, ProviderStatus,
    RefundRequest, RefundResponse, WebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-mock-signature";
const TOLERANCE_SECS: u64 = 300;

/// Outcome the mock reports for create/refund calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockMode { Succeeded, Initiated, RequiresRedirect, Failed }

impl FromStr for MockMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "succeeded" => Ok(Self::Succeeded),
            "initiated" => Ok(Self::Initiated),
            "requires_redirect" | "redirect" => Ok(Self::RequiresRedirect),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown mock payment mode '{other}'")),
        }
    }
}

/// Wire format of a mock webhook body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockWebhookBody {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: MockWebhookData,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MockWebhookData {
    #[serde(default)]
    pub payment_ref: String,
    #[serde(default)]
    pub refund_ref: String,
    #[serde(default)]
    pub amount_cents: i64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct MockProvider {
    name: String,
    secret: Vec<u8>,
    mode: MockMode,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, secret: impl Into<Vec<u8>>, mode: MockMode) -> Self {
        Self { name: name.into(), secret: secret.into(), mode }
    }

    /// Signature header value for `body` at `timestamp`.
    pub fn sign(&self, body: &[u8], timestamp: i64) -> Result<String, ProviderError> {
        let digest = self.mac(body, timestamp)?.finalize().into_bytes();
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }

    fn mac(&self, body: &[u8], timestamp: i64) -> Result<HmacSha256, ProviderError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ProviderError::Transport(format!("webhook secret: {e}")))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    fn verify_signature(&self, header: &str, body: &[u8]) -> Result<(), ProviderError> {
        let mut timestamp: Option<i64> = None;
        let mut v1: Option<&str> = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1 = Some(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(ProviderError::InvalidSignature)?;
        let signature = hex::decode(v1.ok_or(ProviderError::InvalidSignature)?)
            .map_err(|_| ProviderError::InvalidSignature)?;
        let skew = Utc::now().timestamp().checked_sub(timestamp).ok_or(ProviderError::InvalidSignature)?;
        if skew.unsigned_abs() > TOLERANCE_SECS {
            return Err(ProviderError::InvalidSignature);
        }
        self.mac(body, timestamp)?.verify_slice(&signature).map_err(|_| ProviderError::InvalidSignature)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn name(&self) -> &str { &self.name }

    #[instrument(skip(self, req), fields(order_id = %req.order_id, amount = req.amount_cents))]
    async fn create_payment(&self, req: CreatePaymentRequest) -> Result<CreatePaymentResponse, ProviderError> {
        if req.amount_cents <= 0 {
            return Err(ProviderError::Rejected("amount must be greater than zero".into()));
        }
        let provider_ref = format!("mock_pay_{}", Uuid::new_v4().simple());
        let (status, redirect_url) = match self.mode {
            MockMode::Succeeded => (ProviderStatus::Succeeded, None),
            MockMode::Initiated => (ProviderStatus::Initiated, None),
            MockMode::Failed => (ProviderStatus::Failed, None),
            MockMode::RequiresRedirect => (
                ProviderStatus::RequiresRedirect,
                Some(format!("{}?payment_ref={}", req.return_url, provider_ref)),
            ),
        };
        info!(provider_ref = %provider_ref, ?status, "mock payment created");
        Ok(CreatePaymentResponse { provider_ref: Some(provider_ref), status, redirect_url })
    }

    #[instrument(skip(self, req), fields(payment_id = %req.payment_id, amount = req.amount_cents))]
    async fn refund_payment(&self, req: RefundRequest) -> Result<RefundResponse, ProviderError> {
        if req.amount_cents <= 0 {
            return Err(ProviderError::Rejected("amount must be greater than zero".into()));
        }
        let status = match self.mode {
            MockMode::Succeeded => ProviderStatus::Succeeded,
            MockMode::Initiated | MockMode::RequiresRedirect => ProviderStatus::Initiated,
            MockMode::Failed => ProviderStatus::Failed,
        };
        let provider_ref = format!("mock_ref_{}", Uuid::new_v4().simple());
        info!(provider_ref = %provider_ref, ?status, "mock refund created");
        Ok(RefundResponse { provider_ref: Some(provider_ref), status })
    }

    fn verify_and_parse_webhook(&self, headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent, ProviderError> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ProviderError::InvalidSignature)?;
        self.verify_signature(header, body)?;

        let parsed: MockWebhookBody =
            serde_json::from_slice(body).map_err(|e| ProviderError::MalformedPayload(e.to_string()))?;
        if parsed.id.trim().is_empty() || parsed.event_type.trim().is_empty() {
            return Err(ProviderError::MalformedPayload("missing id or type".into()));
        }
        Ok(WebhookEvent {
            event_id: parsed.id,
            event_type: parsed.event_type,
            payment_ref: non_empty(parsed.data.payment_ref),
            refund_ref: non_empty(parsed.data.refund_ref),
            amount_cents: parsed.data.amount_cents,
            currency: parsed.data.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn provider() -> MockProvider { MockProvider::new("mock", "whsec_test", MockMode::Succeeded) }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": "evt_1", "type": "payment.succeeded",
            "data": {"payment_ref": "mock_pay_1", "amount_cents": 5000, "currency": "EUR"}
        })).unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(SIGNATURE_HEADER, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_signed_webhook_parses() {
        let p = provider();
        let body = body();
        let sig = p.sign(&body, Utc::now().timestamp()).unwrap();
        let ev = p.verify_and_parse_webhook(&headers(&sig), &body).unwrap();
        assert_eq!(ev.event_id, "evt_1");
        assert_eq!(ev.event_type, "payment.succeeded");
        assert_eq!(ev.payment_ref.as_deref(), Some("mock_pay_1"));
        assert_eq!(ev.refund_ref, None);
        assert_eq!(ev.amount_cents, 5000);
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let p = provider();
        let body = body();
        let sig = p.sign(&body, Utc::now().timestamp()).unwrap();
        let mut tampered = body.clone();
        tampered[10] ^= 1;
        assert!(matches!(p.verify_and_parse_webhook(&headers(&sig), &tampered), Err(ProviderError::InvalidSignature)));
    }

    #[test]
    fn test_stale_or_missing_signature_is_rejected() {
        let p = provider();
        let body = body();
        let stale = p.sign(&body, Utc::now().timestamp() - 3600).unwrap();
        assert!(matches!(p.verify_and_parse_webhook(&headers(&stale), &body), Err(ProviderError::InvalidSignature)));
        assert!(matches!(p.verify_and_parse_webhook(&HeaderMap::new(), &body), Err(ProviderError::InvalidSignature)));
        assert!(matches!(p.verify_and_parse_webhook(&headers("t=1,v1=zz"), &body), Err(ProviderError::InvalidSignature)));
        for extreme in [i64::MIN, i64::MAX] {
            let header = format!("t={extreme},v1=00");
            assert!(matches!(p.verify_and_parse_webhook(&headers(&header), &body), Err(ProviderError::InvalidSignature)));
        }
    }

    #[test]
    fn test_signed_garbage_is_malformed() {
        let p = provider();
        let body = b"not json".to_vec();
        let sig = p.sign(&body, Utc::now().timestamp()).unwrap();
        assert!(matches!(p.verify_and_parse_webhook(&headers(&sig), &body), Err(ProviderError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_modes_map_to_provider_statuses() {
        let req = CreatePaymentRequest {
            order_id: Uuid::now_v7(), amount_cents: 100, currency: "EUR".into(),
            idempotency_key: "k".into(), return_url: "http://x/return".into(), cancel_url: "http://x/cancel".into(),
        };
        let redirect = MockProvider::new("mock", "s", MockMode::RequiresRedirect).create_payment(req.clone()).await.unwrap();
        assert_eq!(redirect.status, ProviderStatus::RequiresRedirect);
        assert!(redirect.redirect_url.unwrap().starts_with("http://x/return?payment_ref=mock_pay_"));

        let zero = CreatePaymentRequest { amount_cents: 0, ..req };
        assert!(matches!(provider().create_payment(zero).await, Err(ProviderError::Rejected(_))));
        assert_eq!("REDIRECT".parse::<MockMode>().unwrap(), MockMode::RequiresRedirect);
    }
}
