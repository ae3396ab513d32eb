use super::super::models::{Payment, PaymentState};
use crate::core::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::MySqlPool;

/// Refund applied through a conditional write: the update only lands when the
/// payment is still Completed and its cumulative refunded amount still equals
/// `expected_prior_refunded_minor`, so two refund writers cannot both apply.
#[derive(Debug, Clone)]
pub struct RefundUpdate {
    pub expected_prior_refunded_minor: i64,
    pub new_refunded_minor: i64,
    pub reason: String,
    pub gateway_refund_id: String,
    /// Refunded when the cumulative amount reaches the original, otherwise
    /// the payment stays Completed with a non-empty refund record
    pub new_state: PaymentState,
}

/// Persistence seam for payments.
///
/// The persistence contract is create, unique-key lookup and conditional
/// update by current-state predicate; nothing stronger is assumed. All
/// completion/failure/refund transitions are conditional writes returning
/// whether this caller won the transition.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new pending payment unless a fresh pending one already exists
    /// for the same ride, in which case that one is returned instead.
    /// Serialized per ride so two concurrent order creations cannot both
    /// insert. Returns `(payment, created)`.
    async fn insert_pending_unique(
        &self,
        payment: Payment,
        freshness: Duration,
    ) -> Result<(Payment, bool)>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>>;
    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>>;
    /// Lookup by the gateway transaction id set on completion (refund
    /// webhooks reference it instead of the order)
    async fn find_by_txn_id(&self, gateway_txn_id: &str) -> Result<Option<Payment>>;
    /// Most recent pending payment for the ride created within the freshness
    /// window, used to absorb duplicate in-flight orders
    async fn find_fresh_pending_for_ride(
        &self,
        ride_id: &str,
        freshness: Duration,
    ) -> Result<Option<Payment>>;
    /// Any completed (or refunded) payment for the ride; guards the
    /// single-completion invariant
    async fn find_completed_for_ride(&self, ride_id: &str) -> Result<Option<Payment>>;
    /// Pending -> Completed, recording the gateway transaction id. Returns
    /// false when another writer already moved the payment.
    async fn complete_if_pending(&self, id: &str, gateway_txn_id: &str) -> Result<bool>;
    /// Pending -> Failed. Returns false when the payment is already terminal.
    async fn fail_if_pending(&self, id: &str) -> Result<bool>;
    /// Apply a refund (see `RefundUpdate`), appending it to the payment's
    /// refund history in the same write. Returns false when the conditional
    /// predicate did not hold.
    async fn record_refund(&self, id: &str, update: &RefundUpdate) -> Result<bool>;
    /// Whether a gateway refund id was already applied to the payment, over
    /// its whole refund history. Webhook redeliveries for any earlier partial
    /// refund must still match, not just the most recent one.
    async fn refund_applied(&self, id: &str, gateway_refund_id: &str) -> Result<bool>;
    /// Mark completion side effects as applied. Returns false when already
    /// marked.
    async fn mark_settled(&self, id: &str) -> Result<bool>;
    /// Completed payments whose side effects were never marked applied and
    /// that are older than the grace window (reconciliation input)
    async fn find_completed_unsettled(&self, grace: Duration) -> Result<Vec<Payment>>;
}

const PAYMENT_COLUMNS: &str = r#"
    id, ride_id, rider_id, amount_minor, currency, method, state, gateway,
    gateway_order_ref, gateway_txn_id, refunded_amount_minor, refund_reason,
    gateway_refund_id, refunded_at, settled_at, created_at, updated_at
"#;

/// MySQL-backed payment repository
pub struct MySqlPaymentStore {
    pool: MySqlPool,
}

impl MySqlPaymentStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for MySqlPaymentStore {
    async fn insert_pending_unique(
        &self,
        payment: Payment,
        freshness: Duration,
    ) -> Result<(Payment, bool)> {
        let mut tx = self.pool.begin().await?;

        // Serialize order creation per ride via the ride row lock
        sqlx::query("SELECT id FROM rides WHERE id = ? FOR UPDATE")
            .bind(&payment.ride_id)
            .fetch_one(&mut *tx)
            .await?;

        let cutoff = Utc::now() - freshness;
        let existing = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE ride_id = ? AND state = 'pending' AND created_at >= ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(&payment.ride_id)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            return Ok((existing, false));
        }

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, ride_id, rider_id, amount_minor, currency, method, state, gateway,
                gateway_order_ref, gateway_txn_id, refunded_amount_minor, refund_reason,
                gateway_refund_id, refunded_at, settled_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.ride_id)
        .bind(&payment.rider_id)
        .bind(payment.amount_minor)
        .bind(payment.currency)
        .bind(payment.method)
        .bind(payment.state)
        .bind(payment.gateway)
        .bind(&payment.gateway_order_ref)
        .bind(&payment.gateway_txn_id)
        .bind(payment.refunded_amount_minor)
        .bind(&payment.refund_reason)
        .bind(&payment.gateway_refund_id)
        .bind(payment.refunded_at)
        .bind(payment.settled_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((payment, true))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE gateway_order_ref = ?",
            PAYMENT_COLUMNS
        ))
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_by_txn_id(&self, gateway_txn_id: &str) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE gateway_txn_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_txn_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_fresh_pending_for_ride(
        &self,
        ride_id: &str,
        freshness: Duration,
    ) -> Result<Option<Payment>> {
        let cutoff = Utc::now() - freshness;
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE ride_id = ? AND state = 'pending' AND created_at >= ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(ride_id)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn find_completed_for_ride(&self, ride_id: &str) -> Result<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE ride_id = ? AND state IN ('completed', 'refunded')
            LIMIT 1
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(ride_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    async fn complete_if_pending(&self, id: &str, gateway_txn_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET state = 'completed', gateway_txn_id = ?, updated_at = NOW()
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(gateway_txn_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_if_pending(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET state = 'failed', updated_at = NOW()
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_refund(&self, id: &str, update: &RefundUpdate) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET state = ?, refunded_amount_minor = ?, refund_reason = ?,
                gateway_refund_id = ?, refunded_at = NOW(), updated_at = NOW()
            WHERE id = ? AND state = 'completed' AND refunded_amount_minor = ?
            "#,
        )
        .bind(update.new_state)
        .bind(update.new_refunded_minor)
        .bind(&update.reason)
        .bind(&update.gateway_refund_id)
        .bind(id)
        .bind(update.expected_prior_refunded_minor)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        // History row for redelivery dedup; unique on the gateway refund id
        sqlx::query(
            r#"
            INSERT INTO payment_refunds (
                id, payment_id, gateway_refund_id, amount_minor, reason, created_at
            )
            VALUES (?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(id)
        .bind(&update.gateway_refund_id)
        .bind(update.new_refunded_minor - update.expected_prior_refunded_minor)
        .bind(&update.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn refund_applied(&self, id: &str, gateway_refund_id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM payment_refunds WHERE payment_id = ? AND gateway_refund_id = ? LIMIT 1",
        )
        .bind(id)
        .bind(gateway_refund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn mark_settled(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET settled_at = NOW(), updated_at = NOW()
            WHERE id = ? AND state IN ('completed', 'refunded') AND settled_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_completed_unsettled(&self, grace: Duration) -> Result<Vec<Payment>> {
        let cutoff = Utc::now() - grace;
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {}
            FROM payments
            WHERE state = 'completed' AND settled_at IS NULL AND updated_at < ?
            ORDER BY updated_at ASC
            LIMIT 100
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }
}
