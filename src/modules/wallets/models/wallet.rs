use crate::core::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Wallet id of the platform's own commission account
pub const PLATFORM_WALLET_ID: &str = "platform";

/// Who owns a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Rider,
    Driver,
    Platform,
}

/// Ledger entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryCategory {
    Topup,
    RidePayment,
    Refund,
    Commission,
    Payout,
    Withdrawal,
    CancellationFee,
}

/// One immutable credit or debit against a wallet.
///
/// `amount_minor` is signed: credits positive, debits negative. Entries are
/// never edited; corrections are new offsetting entries. The wallet balance
/// is always the sum of its entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: String,
    pub wallet_id: String,
    pub owner_kind: OwnerKind,
    /// Signed amount in minor currency units
    pub amount_minor: i64,
    pub category: EntryCategory,
    /// Unique idempotency key, e.g. "{payment_id}:earning". A second append
    /// with the same reference is a no-op returning the stored entry.
    pub reference: String,
    /// Triggering payment, if any
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a ledger append. `amount_minor` is always positive here; the
/// store applies the sign for debits.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub wallet_id: String,
    pub owner_kind: OwnerKind,
    pub amount_minor: i64,
    pub category: EntryCategory,
    pub reference: String,
    pub payment_id: Option<String>,
}

impl NewLedgerEntry {
    pub fn new(
        wallet_id: impl Into<String>,
        owner_kind: OwnerKind,
        amount_minor: i64,
        category: EntryCategory,
        reference: impl Into<String>,
    ) -> Result<Self> {
        let wallet_id = wallet_id.into();
        let reference = reference.into();

        if amount_minor <= 0 {
            return Err(AppError::validation("Ledger amount must be positive"));
        }
        if wallet_id.trim().is_empty() {
            return Err(AppError::validation("Wallet ID cannot be empty"));
        }
        if reference.trim().is_empty() {
            return Err(AppError::validation("Ledger reference cannot be empty"));
        }

        Ok(Self {
            wallet_id,
            owner_kind,
            amount_minor,
            category,
            reference,
            payment_id: None,
        })
    }

    pub fn with_payment(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    /// Materialize into a stored entry with the given sign
    pub fn into_entry(self, signed_amount: i64) -> LedgerEntry {
        LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            wallet_id: self.wallet_id,
            owner_kind: self.owner_kind,
            amount_minor: signed_amount,
            category: self.category,
            reference: self.reference,
            payment_id: self.payment_id,
            created_at: Utc::now(),
        }
    }
}

/// Result of an append: the stored entry plus whether this call actually
/// wrote it. A duplicate reference is absorbed as a successful no-op.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub entry: LedgerEntry,
    pub duplicate: bool,
}
