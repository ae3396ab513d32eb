use super::super::models::{Payment, PaymentMethod};
use super::super::repositories::PaymentStore;
use crate::core::{AppError, Result};
use crate::modules::gateways::{CreateOrderRequest, GatewayKind, GatewayRegistry};
use crate::modules::rides::repositories::RideStore;
use chrono::Duration;
use std::sync::Arc;
use tracing::info;

/// Opens payment orders against a gateway for a ride.
///
/// Idempotent by ride and status: a fresh pending payment for the same ride
/// is returned instead of opening a second gateway order, and a ride with a
/// completed payment is rejected before any gateway call.
pub struct OrderService {
    payment_store: Arc<dyn PaymentStore>,
    ride_store: Arc<dyn RideStore>,
    registry: Arc<GatewayRegistry>,
    pending_freshness: Duration,
}

impl OrderService {
    pub fn new(
        payment_store: Arc<dyn PaymentStore>,
        ride_store: Arc<dyn RideStore>,
        registry: Arc<GatewayRegistry>,
        pending_freshness: Duration,
    ) -> Self {
        Self {
            payment_store,
            ride_store,
            registry,
            pending_freshness,
        }
    }

    pub async fn create_order(
        &self,
        caller_id: &str,
        ride_id: &str,
        amount_minor: i64,
        method: PaymentMethod,
        gateway_kind: GatewayKind,
    ) -> Result<Payment> {
        if amount_minor <= 0 {
            return Err(AppError::validation("Order amount must be positive"));
        }

        let ride = self
            .ride_store
            .find_by_id(ride_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Ride '{}' not found", ride_id)))?;

        if ride.rider_id != caller_id {
            return Err(AppError::unauthorized("Caller does not own this ride"));
        }

        // Single-completion invariant: checked before the gateway is touched
        if let Some(paid) = self.payment_store.find_completed_for_ride(ride_id).await? {
            return Err(AppError::invalid_transition(format!(
                "Ride '{}' already has a completed payment ({})",
                ride_id, paid.id
            )));
        }

        // Reuse a fresh in-flight order instead of opening a duplicate
        if let Some(pending) = self
            .payment_store
            .find_fresh_pending_for_ride(ride_id, self.pending_freshness)
            .await?
        {
            info!(
                ride_id = ride_id,
                payment_id = %pending.id,
                "Reusing fresh pending payment for ride"
            );
            return Ok(pending);
        }

        let gateway = self.registry.get(gateway_kind)?;
        let order = gateway
            .create_order(CreateOrderRequest {
                amount_minor,
                currency: ride.currency,
                receipt: ride_id.to_string(),
                user_id: ride.rider_id.clone(),
                ride_id: ride_id.to_string(),
            })
            .await?;

        let payment = Payment::new(
            ride_id.to_string(),
            ride.rider_id,
            amount_minor,
            ride.currency,
            method,
            gateway_kind,
            order.order_ref,
        )?;

        // The insert itself re-checks for a racing pending payment under a
        // per-ride lock; a lost race returns the winner's payment
        let (stored, created) = self
            .payment_store
            .insert_pending_unique(payment, self.pending_freshness)
            .await?;

        info!(
            ride_id = ride_id,
            payment_id = %stored.id,
            order_ref = %stored.gateway_order_ref,
            gateway = %gateway_kind,
            created = created,
            "Payment order opened"
        );

        Ok(stored)
    }
}
