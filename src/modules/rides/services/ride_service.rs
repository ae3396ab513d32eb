use super::super::models::{
    cancellation_fee_minor, transition, CancellationActor, Ride, RideEvent, RideState,
};
use super::super::repositories::RideStore;
use crate::core::{AppError, Currency, Result};
use crate::modules::wallets::models::{
    EntryCategory, NewLedgerEntry, OwnerKind, PLATFORM_WALLET_ID,
};
use crate::modules::wallets::repositories::WalletStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the ride lifecycle through conditional state writes and collects
/// the rider cancellation fee.
///
/// The trip-facing API lives in the ride orchestration service; this core
/// exposes the lifecycle as a library seam so both sides share one state
/// machine.
pub struct RideService {
    ride_store: Arc<dyn RideStore>,
    wallet_store: Arc<dyn WalletStore>,
    cancellation_fee_minor: i64,
}

impl RideService {
    pub fn new(
        ride_store: Arc<dyn RideStore>,
        wallet_store: Arc<dyn WalletStore>,
        cancellation_fee_minor: i64,
    ) -> Self {
        Self {
            ride_store,
            wallet_store,
            cancellation_fee_minor,
        }
    }

    pub async fn create(
        &self,
        rider_id: &str,
        pickup: (f64, f64),
        drop: (f64, f64),
        fare_minor: i64,
        currency: Currency,
    ) -> Result<Ride> {
        let ride = Ride::new(rider_id.to_string(), pickup, drop, fare_minor, currency)?;
        self.ride_store.insert(&ride).await?;
        info!(ride_id = %ride.id, rider_id = rider_id, "Ride requested");
        Ok(ride)
    }

    /// Assign a driver to a requested ride. Exactly one of two concurrent
    /// matches wins; the loser gets `InvalidStateTransition`.
    pub async fn assign_driver(&self, ride_id: &str, driver_id: &str) -> Result<Ride> {
        let won = self.ride_store.assign_driver(ride_id, driver_id).await?;
        if !won {
            let ride = self.load(ride_id).await?;
            return Err(AppError::invalid_transition(format!(
                "Ride '{}' is {} and cannot be matched",
                ride_id, ride.state
            )));
        }
        info!(ride_id = ride_id, driver_id = driver_id, "Driver matched");
        self.load(ride_id).await
    }

    /// Apply a forward lifecycle event. Losing the conditional write to a
    /// writer applying the same event is an idempotent success.
    pub async fn advance(&self, ride_id: &str, event: RideEvent) -> Result<Ride> {
        if matches!(event, RideEvent::DriverMatched | RideEvent::Cancel(_)) {
            return Err(AppError::validation(
                "Use assign_driver / cancel for matching and cancellation",
            ));
        }

        let ride = self.load(ride_id).await?;
        let next = transition(ride.state, event)?;

        let won = self.ride_store.update_state(ride_id, ride.state, next).await?;
        let current = self.load(ride_id).await?;
        if !won && current.state != next {
            return Err(AppError::invalid_transition(format!(
                "Ride '{}' moved to {} concurrently",
                ride_id, current.state
            )));
        }

        info!(ride_id = ride_id, state = %current.state, "Ride advanced");
        Ok(current)
    }

    /// Cancel a ride on behalf of `caller_id`. Rider cancellations after the
    /// driver is already arriving or waiting incur the flat cancellation fee,
    /// debited from the rider wallet and credited to the platform.
    pub async fn cancel(
        &self,
        caller_id: &str,
        ride_id: &str,
        actor: CancellationActor,
    ) -> Result<Ride> {
        let ride = self.load(ride_id).await?;

        let owner = match actor {
            CancellationActor::Rider(_) => Some(ride.rider_id.as_str()),
            CancellationActor::Driver(_) => ride.driver_id.as_deref(),
        };
        if owner != Some(caller_id) {
            return Err(AppError::unauthorized(
                "Caller is not a party to this ride".to_string(),
            ));
        }

        transition(ride.state, RideEvent::Cancel(actor))?;

        let won = self
            .ride_store
            .update_state(ride_id, ride.state, RideState::Cancelled)
            .await?;
        if !won {
            let current = self.load(ride_id).await?;
            if current.state == RideState::Cancelled {
                return Ok(current);
            }
            return Err(AppError::invalid_transition(format!(
                "Ride '{}' moved to {} concurrently",
                ride_id, current.state
            )));
        }

        let fee = cancellation_fee_minor(ride.state, actor, self.cancellation_fee_minor);
        if fee > 0 {
            self.collect_fee(&ride, fee).await;
        }

        info!(
            ride_id = ride_id,
            from = %ride.state,
            fee_minor = fee,
            "Ride cancelled"
        );
        self.load(ride_id).await
    }

    /// Best-effort fee collection: an uncovered wallet defers the fee to the
    /// external billing pipeline instead of blocking the cancellation
    async fn collect_fee(&self, ride: &Ride, fee_minor: i64) {
        let charge = NewLedgerEntry::new(
            &ride.rider_id,
            OwnerKind::Rider,
            fee_minor,
            EntryCategory::CancellationFee,
            format!("cancel_fee:{}:charge", ride.id),
        );
        let charge = match charge {
            Ok(charge) => charge,
            Err(e) => {
                warn!(ride_id = %ride.id, error = %e, "Invalid cancellation fee entry");
                return;
            }
        };

        match self.wallet_store.debit(charge).await {
            Ok(outcome) => {
                if !outcome.duplicate {
                    let fee = NewLedgerEntry::new(
                        PLATFORM_WALLET_ID,
                        OwnerKind::Platform,
                        fee_minor,
                        EntryCategory::CancellationFee,
                        format!("cancel_fee:{}:fee", ride.id),
                    );
                    if let Ok(fee) = fee {
                        if let Err(e) = self.wallet_store.credit(fee).await {
                            warn!(ride_id = %ride.id, error = %e, "Fee credit failed");
                        }
                    }
                }
            }
            Err(AppError::InsufficientFunds(_)) => {
                warn!(
                    ride_id = %ride.id,
                    rider_id = %ride.rider_id,
                    fee_minor = fee_minor,
                    "Wallet cannot cover cancellation fee, deferring to billing"
                );
            }
            Err(e) => {
                warn!(ride_id = %ride.id, error = %e, "Cancellation fee debit failed");
            }
        }
    }

    async fn load(&self, ride_id: &str) -> Result<Ride> {
        self.ride_store
            .find_by_id(ride_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Ride '{}' not found", ride_id)))
    }
}
