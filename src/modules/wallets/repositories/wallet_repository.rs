use super::super::models::{AppendOutcome, LedgerEntry, NewLedgerEntry};
use crate::core::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Persistence seam for the wallet ledger.
///
/// Appends are idempotent on the entry's unique `reference`; a duplicate is
/// absorbed and returned with `duplicate = true`. `debit` checks
/// `balance >= amount` under per-wallet serialization and fails with
/// `InsufficientFunds` instead of allowing a negative balance.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn credit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome>;
    async fn debit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome>;
    /// Derived value: the sum of all entries for the wallet
    async fn balance(&self, wallet_id: &str) -> Result<i64>;
    /// Page of entries for the wallet, newest first
    async fn entries(&self, wallet_id: &str, limit: u32, offset: u32) -> Result<Vec<LedgerEntry>>;
}

/// MySQL-backed wallet ledger.
///
/// Per-wallet serialization uses a row lock on the wallets table inside a
/// transaction; uniqueness of `reference` is additionally enforced by a
/// UNIQUE constraint on ledger_entries.reference.
pub struct MySqlWalletStore {
    pool: MySqlPool,
}

impl MySqlWalletStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, wallet_id, owner_kind, amount_minor, category, reference,
                   payment_id, created_at
            FROM ledger_entries
            WHERE reference = ?
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn append(&self, input: NewLedgerEntry, signed_amount: i64) -> Result<AppendOutcome> {
        // Idempotency: a previously applied reference is a successful no-op
        if let Some(existing) = self.find_by_reference(&input.reference).await? {
            return Ok(AppendOutcome {
                entry: existing,
                duplicate: true,
            });
        }

        let mut tx = self.pool.begin().await?;

        // Serialize concurrent mutations on the same wallet
        sqlx::query("INSERT IGNORE INTO wallets (id, owner_kind) VALUES (?, ?)")
            .bind(&input.wallet_id)
            .bind(input.owner_kind)
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT id FROM wallets WHERE id = ? FOR UPDATE")
            .bind(&input.wallet_id)
            .fetch_one(&mut *tx)
            .await?;

        if signed_amount < 0 {
            let row: (Option<i64>,) = sqlx::query_as(
                r#"
                SELECT CAST(COALESCE(SUM(amount_minor), 0) AS SIGNED)
                FROM ledger_entries
                WHERE wallet_id = ?
                "#,
            )
            .bind(&input.wallet_id)
            .fetch_one(&mut *tx)
            .await?;

            let balance = row.0.unwrap_or(0);
            if balance < -signed_amount {
                return Err(AppError::insufficient_funds(format!(
                    "wallet {} balance {} < debit {}",
                    input.wallet_id, balance, -signed_amount
                )));
            }
        }

        let entry = input.into_entry(signed_amount);

        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, wallet_id, owner_kind, amount_minor, category, reference,
                payment_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.wallet_id)
        .bind(entry.owner_kind)
        .bind(entry.amount_minor)
        .bind(entry.category)
        .bind(&entry.reference)
        .bind(&entry.payment_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                tx.commit().await?;
                Ok(AppendOutcome {
                    entry,
                    duplicate: false,
                })
            }
            // Lost a race on the unique reference: another writer already
            // applied this entry. Absorb as a duplicate.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                drop(tx);
                let existing = self
                    .find_by_reference(&entry.reference)
                    .await?
                    .ok_or_else(|| {
                        AppError::internal("Duplicate ledger reference vanished after conflict")
                    })?;
                Ok(AppendOutcome {
                    entry: existing,
                    duplicate: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl WalletStore for MySqlWalletStore {
    async fn credit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome> {
        let amount = entry.amount_minor;
        self.append(entry, amount).await
    }

    async fn debit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome> {
        let amount = entry.amount_minor;
        self.append(entry, -amount).await
    }

    async fn balance(&self, wallet_id: &str) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT CAST(COALESCE(SUM(amount_minor), 0) AS SIGNED)
            FROM ledger_entries
            WHERE wallet_id = ?
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.unwrap_or(0))
    }

    async fn entries(&self, wallet_id: &str, limit: u32, offset: u32) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, wallet_id, owner_kind, amount_minor, category, reference,
                   payment_id, created_at
            FROM ledger_entries
            WHERE wallet_id = ?
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
