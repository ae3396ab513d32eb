use super::super::models::{AppendOutcome, EntryCategory, LedgerEntry, NewLedgerEntry, OwnerKind};
use super::super::repositories::WalletStore;
use crate::core::Result;
use std::sync::Arc;
use tracing::info;

/// Wallet ledger orchestration: topups, withdrawals and balance queries.
///
/// Settlement and refund credits go through the store directly from their
/// services so the idempotency references stay in one place per flow.
pub struct WalletService {
    wallet_store: Arc<dyn WalletStore>,
}

impl WalletService {
    pub fn new(wallet_store: Arc<dyn WalletStore>) -> Self {
        Self { wallet_store }
    }

    /// Credit a user topup. `topup_ref` is the external payment reference and
    /// doubles as the idempotency key.
    pub async fn topup(
        &self,
        wallet_id: &str,
        owner_kind: OwnerKind,
        amount_minor: i64,
        topup_ref: &str,
    ) -> Result<AppendOutcome> {
        let entry = NewLedgerEntry::new(
            wallet_id,
            owner_kind,
            amount_minor,
            EntryCategory::Topup,
            format!("topup:{}", topup_ref),
        )?;

        let outcome = self.wallet_store.credit(entry).await?;
        info!(
            wallet_id = wallet_id,
            amount_minor = amount_minor,
            duplicate = outcome.duplicate,
            "Wallet topup recorded"
        );
        Ok(outcome)
    }

    /// Debit a withdrawal; fails with InsufficientFunds when the balance
    /// cannot cover it
    pub async fn withdraw(
        &self,
        wallet_id: &str,
        owner_kind: OwnerKind,
        amount_minor: i64,
        withdrawal_ref: &str,
    ) -> Result<AppendOutcome> {
        let entry = NewLedgerEntry::new(
            wallet_id,
            owner_kind,
            amount_minor,
            EntryCategory::Withdrawal,
            format!("withdrawal:{}", withdrawal_ref),
        )?;

        let outcome = self.wallet_store.debit(entry).await?;
        info!(
            wallet_id = wallet_id,
            amount_minor = amount_minor,
            duplicate = outcome.duplicate,
            "Wallet withdrawal recorded"
        );
        Ok(outcome)
    }

    pub async fn balance(&self, wallet_id: &str) -> Result<i64> {
        self.wallet_store.balance(wallet_id).await
    }

    pub async fn entries(&self, wallet_id: &str, limit: u32, offset: u32) -> Result<Vec<LedgerEntry>> {
        self.wallet_store.entries(wallet_id, limit, offset).await
    }
}
