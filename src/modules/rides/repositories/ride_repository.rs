use super::super::models::{Ride, RidePaymentStatus, RideState};
use crate::core::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Persistence seam for rides.
///
/// `update_state` is a conditional write: it only applies when the stored
/// state still equals `from`, so concurrent instances cannot both move the
/// same ride.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn insert(&self, ride: &Ride) -> Result<()>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Ride>>;
    /// Returns false when the conditional predicate did not hold
    async fn update_state(&self, id: &str, from: RideState, to: RideState) -> Result<bool>;
    /// Assign a driver and move Requested -> Matched in one conditional
    /// write; two matching attempts cannot both win
    async fn assign_driver(&self, id: &str, driver_id: &str) -> Result<bool>;
    async fn set_payment_status(
        &self,
        id: &str,
        status: RidePaymentStatus,
        last_payment_id: &str,
    ) -> Result<()>;
}

/// MySQL-backed ride repository
pub struct MySqlRideStore {
    pool: MySqlPool,
}

impl MySqlRideStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RideStore for MySqlRideStore {
    async fn insert(&self, ride: &Ride) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (
                id, rider_id, driver_id, pickup_lat, pickup_lng, drop_lat, drop_lng,
                fare_minor, currency, state, payment_status, last_payment_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ride.id)
        .bind(&ride.rider_id)
        .bind(&ride.driver_id)
        .bind(ride.pickup_lat)
        .bind(ride.pickup_lng)
        .bind(ride.drop_lat)
        .bind(ride.drop_lng)
        .bind(ride.fare_minor)
        .bind(ride.currency)
        .bind(ride.state)
        .bind(ride.payment_status)
        .bind(&ride.last_payment_id)
        .bind(ride.created_at)
        .bind(ride.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Ride>> {
        let ride = sqlx::query_as::<_, Ride>(
            r#"
            SELECT
                id, rider_id, driver_id, pickup_lat, pickup_lng, drop_lat, drop_lng,
                fare_minor, currency, state, payment_status, last_payment_id,
                created_at, updated_at
            FROM rides
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn update_state(&self, id: &str, from: RideState, to: RideState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET state = ?, updated_at = NOW()
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(to)
        .bind(id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn assign_driver(&self, id: &str, driver_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rides
            SET driver_id = ?, state = 'matched', updated_at = NOW()
            WHERE id = ? AND state = 'requested' AND driver_id IS NULL
            "#,
        )
        .bind(driver_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_payment_status(
        &self,
        id: &str,
        status: RidePaymentStatus,
        last_payment_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rides
            SET payment_status = ?, last_payment_id = ?, updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(last_payment_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
