use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::GatewayKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Payment state. Transitions follow a strict forward graph: Pending may
/// become Completed or Failed exactly once (conditional write); Completed may
/// become Refunded once the cumulative refund equals the original amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentState::Pending => "pending",
            PaymentState::Completed => "completed",
            PaymentState::Failed => "failed",
            PaymentState::Refunded => "refunded",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentState::Pending),
            "completed" => Ok(PaymentState::Completed),
            "failed" => Ok(PaymentState::Failed),
            "refunded" => Ok(PaymentState::Refunded),
            _ => Err(format!("Invalid payment state: {}", s)),
        }
    }
}

/// How the rider pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Wallet,
}

/// A single monetary transaction tied to one ride and one gateway order.
///
/// `gateway_order_ref` is globally unique and is the natural idempotency key
/// for the payment. The refund sub-record lives inline: cumulative refunded
/// amount, reason, gateway refund id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub ride_id: String,
    pub rider_id: String,
    /// Amount in minor currency units
    pub amount_minor: i64,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub state: PaymentState,
    pub gateway: GatewayKind,
    /// Gateway order/intent id (unique)
    pub gateway_order_ref: String,
    /// Gateway transaction id, set on completion
    pub gateway_txn_id: Option<String>,
    /// Cumulative amount refunded so far
    pub refunded_amount_minor: i64,
    pub refund_reason: Option<String>,
    pub gateway_refund_id: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// Set once the completion side effects (ledger entries, notifications)
    /// have been applied. Completed payments without it are picked up by the
    /// reconciliation pass.
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        ride_id: String,
        rider_id: String,
        amount_minor: i64,
        currency: Currency,
        method: PaymentMethod,
        gateway: GatewayKind,
        gateway_order_ref: String,
    ) -> Result<Self> {
        if amount_minor <= 0 {
            return Err(AppError::validation("Payment amount must be positive"));
        }
        if ride_id.trim().is_empty() {
            return Err(AppError::validation("Ride ID cannot be empty"));
        }
        if rider_id.trim().is_empty() {
            return Err(AppError::validation("Rider ID cannot be empty"));
        }
        if gateway_order_ref.trim().is_empty() {
            return Err(AppError::validation("Gateway order reference cannot be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            ride_id,
            rider_id,
            amount_minor,
            currency,
            method,
            state: PaymentState::Pending,
            gateway,
            gateway_order_ref,
            gateway_txn_id: None,
            refunded_amount_minor: 0,
            refund_reason: None,
            gateway_refund_id: None,
            refunded_at: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.state == PaymentState::Completed
    }

    /// Refunds may only be issued against a completed payment
    pub fn can_refund(&self) -> bool {
        self.state == PaymentState::Completed && self.remaining_refundable_minor() > 0
    }

    /// Amount still available for refund; never negative
    pub fn remaining_refundable_minor(&self) -> i64 {
        (self.amount_minor - self.refunded_amount_minor).max(0)
    }

    /// Whether the payer was charged from their in-app wallet (refunds then
    /// credit the wallet back)
    pub fn is_wallet_funded(&self) -> bool {
        self.method == PaymentMethod::Wallet
    }
}
