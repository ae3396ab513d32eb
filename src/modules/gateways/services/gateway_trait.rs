use crate::core::{Currency, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Supported payment processors. Dispatch is by this tag, never by string
/// comparison on a name field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Razorpay,
    Stripe,
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayKind::Razorpay => write!(f, "razorpay"),
            GatewayKind::Stripe => write!(f, "stripe"),
        }
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "razorpay" => Ok(GatewayKind::Razorpay),
            "stripe" => Ok(GatewayKind::Stripe),
            _ => Err(format!("Unknown gateway: {}", s)),
        }
    }
}

/// Order/intent creation request sent to a gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    /// Amount in minor currency units
    pub amount_minor: i64,

    pub currency: Currency,

    /// Our payment id, passed as the gateway receipt/reference
    pub receipt: String,

    /// Rider the order is for (gateway metadata)
    pub user_id: String,

    /// Ride the order pays for (gateway metadata)
    pub ride_id: String,
}

/// Order opened at the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOrder {
    /// Gateway's order/intent id; globally unique, our idempotency key
    pub order_ref: String,

    pub amount_minor: i64,

    pub currency: Currency,
}

/// Refund issued at the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub refund_id: String,
    pub status: String,
}

/// Normalized webhook event kinds this core reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    Captured,
    Failed,
    RefundProcessed,
    /// Acknowledged without any state change
    Unhandled,
}

/// Webhook notification after signature verification and parsing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub kind: WebhookEventKind,

    /// Gateway order/intent id the event refers to
    pub order_ref: Option<String>,

    /// Gateway transaction (charge/payment) id
    pub gateway_txn_id: Option<String>,

    /// Gateway refund id, set for refund events
    pub refund_id: Option<String>,

    /// Event amount in minor units, when the gateway includes it
    pub amount_minor: Option<i64>,

    /// Full gateway payload (JSON)
    pub raw: serde_json::Value,
}

/// Payment gateway client: order creation, signature verification, webhook
/// parsing and refunds. One implementation per processor, constructed once
/// and passed as a dependency.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Open an order/intent at the gateway. Failures are retryable
    /// `GatewayError`s; the HTTP client retries transient ones itself.
    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder>;

    /// Verify a client-submitted payment signature for `order_ref` and
    /// `gateway_txn_id`. Returns `SignatureMismatch` on failure.
    fn verify_payment_signature(
        &self,
        order_ref: &str,
        gateway_txn_id: &str,
        signature: &str,
    ) -> Result<()>;

    /// Verify the webhook signature against the raw body bytes, then parse.
    /// Verification happens strictly before any interpretation of the body.
    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent>;

    /// Issue a (possibly partial) refund for a captured transaction
    async fn refund(
        &self,
        gateway_txn_id: &str,
        amount_minor: i64,
        reason: &str,
    ) -> Result<GatewayRefund>;
}
