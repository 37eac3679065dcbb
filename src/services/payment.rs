//! Payment gateway collaborator
//!
//! Authorize/capture/refund against Razorpay. Amounts cross this boundary
//! as integer minor units only; error descriptions from the gateway are
//! relayed to the caller unmodified.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;
use crate::{Result, SnazzError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureReceipt {
    pub capture_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order. `capture_immediately = false` is the COD
    /// hold (authorize-only); `true` is an immediate prepaid charge.
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        capture_immediately: bool,
        metadata: Value,
    ) -> Result<GatewayOrder>;

    async fn capture(&self, payment_id: &str, amount_minor: i64, currency: &str) -> Result<CaptureReceipt>;

    async fn refund(&self, payment_id: &str, amount_minor: i64, notes: &str) -> Result<RefundReceipt>;
}

// =============================================================================
// Razorpay
// =============================================================================

pub struct RazorpayGateway {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self::with_base_url(key_id, key_secret, "https://api.razorpay.com")
    }

    pub fn with_base_url(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            base_url: base_url.into(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| SnazzError::Configuration(format!("payment gateway unreachable: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SnazzError::GatewayRejected(format!("unreadable gateway response: {e}")))?;

        if !status.is_success() {
            // Relay the gateway's own description verbatim where present.
            let description = payload["error"]["description"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            return Err(SnazzError::GatewayRejected(description));
        }
        Ok(payload)
    }
}

fn required_id(payload: &Value) -> Result<String> {
    payload["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SnazzError::GatewayRejected("gateway response missing id".into()))
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    #[instrument(skip(self, metadata))]
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        capture_immediately: bool,
        metadata: Value,
    ) -> Result<GatewayOrder> {
        let payload = self
            .post(
                "/v1/orders",
                json!({
                    "amount": amount_minor,
                    "currency": currency,
                    "payment_capture": if capture_immediately { 1 } else { 0 },
                    "notes": metadata,
                }),
            )
            .await?;
        Ok(GatewayOrder { gateway_order_id: required_id(&payload)? })
    }

    #[instrument(skip(self))]
    async fn capture(&self, payment_id: &str, amount_minor: i64, currency: &str) -> Result<CaptureReceipt> {
        let payload = self
            .post(
                &format!("/v1/payments/{payment_id}/capture"),
                json!({ "amount": amount_minor, "currency": currency }),
            )
            .await?;
        Ok(CaptureReceipt { capture_id: required_id(&payload)? })
    }

    #[instrument(skip(self, notes))]
    async fn refund(&self, payment_id: &str, amount_minor: i64, notes: &str) -> Result<RefundReceipt> {
        let payload = self
            .post(
                &format!("/v1/payments/{payment_id}/refund"),
                json!({ "amount": amount_minor, "notes": { "reason": notes } }),
            )
            .await?;
        Ok(RefundReceipt { refund_id: required_id(&payload)? })
    }
}

// =============================================================================
// Unconfigured fallback
// =============================================================================

/// Stand-in used when gateway credentials are absent. Every call fails with
/// a configuration error so operators see the misconfiguration immediately
/// instead of a half-working payment flow.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_order(&self, _: i64, _: &str, _: bool, _: Value) -> Result<GatewayOrder> {
        Err(unconfigured())
    }
    async fn capture(&self, _: &str, _: i64, _: &str) -> Result<CaptureReceipt> {
        Err(unconfigured())
    }
    async fn refund(&self, _: &str, _: i64, _: &str) -> Result<RefundReceipt> {
        Err(unconfigured())
    }
}

fn unconfigured() -> SnazzError {
    SnazzError::Configuration("RAZORPAY_KEY_ID / RAZORPAY_KEY_SECRET are not set".into())
}
