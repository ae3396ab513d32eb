use super::super::models::{Payment, PaymentState};
use super::super::repositories::{PaymentStore, RefundUpdate};
use crate::core::events::{Notifier, PaymentEvent};
use crate::core::{AppError, Result};
use crate::modules::gateways::GatewayRegistry;
use crate::modules::rides::models::RidePaymentStatus;
use crate::modules::rides::repositories::RideStore;
use crate::modules::wallets::models::{EntryCategory, NewLedgerEntry, OwnerKind};
use crate::modules::wallets::repositories::WalletStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of applying a gateway-confirmed refund
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundApplication {
    Applied,
    /// Refund id already recorded; absorbed as an idempotent no-op
    Duplicate,
}

/// Issues and reconciles full/partial refunds against completed payments.
///
/// The refund bound (cumulative refunds never exceed the original amount) is
/// enforced both in the amount computation and by the store's conditional
/// write on the prior cumulative amount.
pub struct RefundService {
    payment_store: Arc<dyn PaymentStore>,
    wallet_store: Arc<dyn WalletStore>,
    ride_store: Arc<dyn RideStore>,
    registry: Arc<GatewayRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl RefundService {
    pub fn new(
        payment_store: Arc<dyn PaymentStore>,
        wallet_store: Arc<dyn WalletStore>,
        ride_store: Arc<dyn RideStore>,
        registry: Arc<GatewayRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payment_store,
            wallet_store,
            ride_store,
            registry,
            notifier,
        }
    }

    /// Issue a refund for `requested_minor` (or the full remaining amount).
    ///
    /// Precondition: the payment is Completed. The payment only moves to
    /// Refunded when the cumulative refunded amount reaches the original;
    /// partial refunds leave it Completed with a non-empty refund record.
    pub async fn refund(
        &self,
        caller_id: &str,
        payment_id: &str,
        requested_minor: Option<i64>,
        reason: &str,
    ) -> Result<Payment> {
        let payment = self
            .payment_store
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment '{}' not found", payment_id)))?;

        if payment.rider_id != caller_id {
            return Err(AppError::unauthorized(
                "Caller does not own this payment".to_string(),
            ));
        }

        if payment.state != PaymentState::Completed {
            return Err(AppError::invalid_transition(format!(
                "Payment '{}' is {} and cannot be refunded",
                payment_id, payment.state
            )));
        }

        let remaining = payment.remaining_refundable_minor();
        if remaining == 0 {
            return Err(AppError::invalid_transition(format!(
                "Payment '{}' is already fully refunded",
                payment_id
            )));
        }

        if let Some(requested) = requested_minor {
            if requested <= 0 {
                return Err(AppError::validation("Refund amount must be positive"));
            }
        }
        let refund_minor = requested_minor.unwrap_or(remaining).min(remaining);

        let gateway_txn_id = payment.gateway_txn_id.clone().ok_or_else(|| {
            AppError::internal(format!(
                "Completed payment '{}' has no gateway transaction id",
                payment_id
            ))
        })?;

        self.notifier
            .notify(PaymentEvent::RefundInitiated {
                payment_id: payment.id.clone(),
                amount_minor: refund_minor,
                user_id: payment.rider_id.clone(),
            })
            .await;

        let gateway = self.registry.get(payment.gateway)?;
        let gateway_refund = gateway.refund(&gateway_txn_id, refund_minor, reason).await?;

        self.record_and_credit(&payment, &gateway_refund.refund_id, refund_minor, reason)
            .await?;

        self.payment_store
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::internal("Payment vanished after refund write"))
    }

    /// Apply a refund the gateway confirmed via webhook. Deduplicated on the
    /// gateway refund id, so redelivered webhooks cannot double-credit.
    pub async fn apply_gateway_refund(
        &self,
        payment: &Payment,
        refund_id: &str,
        amount_minor: Option<i64>,
    ) -> Result<RefundApplication> {
        // Checked against the payment's whole refund history: after a second
        // partial refund, a redelivery for the first must still be absorbed
        if self
            .payment_store
            .refund_applied(&payment.id, refund_id)
            .await?
        {
            info!(
                payment_id = %payment.id,
                refund_id = refund_id,
                "Refund already recorded, acknowledging duplicate"
            );
            return Ok(RefundApplication::Duplicate);
        }

        match payment.state {
            PaymentState::Completed => {}
            PaymentState::Refunded => {
                // Fully refunded through a different refund id; nothing left
                // to apply, stop the gateway from retrying
                return Ok(RefundApplication::Duplicate);
            }
            state => {
                // A refund for a payment we never completed: our completion
                // write may still be in flight, let the gateway redeliver
                return Err(AppError::internal(format!(
                    "Refund webhook for payment '{}' in state {}",
                    payment.id, state
                )));
            }
        }

        let remaining = payment.remaining_refundable_minor();
        if remaining == 0 {
            return Ok(RefundApplication::Duplicate);
        }

        let refund_minor = amount_minor.unwrap_or(remaining).min(remaining);
        let applied = self
            .record_and_credit(payment, refund_id, refund_minor, "gateway-initiated refund")
            .await?;

        Ok(if applied {
            RefundApplication::Applied
        } else {
            RefundApplication::Duplicate
        })
    }

    /// Persist the refund record, credit the payer wallet for wallet-funded
    /// payments, update the ride and emit the completion event. Returns
    /// whether this call won the refund write.
    async fn record_and_credit(
        &self,
        payment: &Payment,
        refund_id: &str,
        refund_minor: i64,
        reason: &str,
    ) -> Result<bool> {
        let new_cumulative = payment.refunded_amount_minor + refund_minor;
        let new_state = if new_cumulative >= payment.amount_minor {
            PaymentState::Refunded
        } else {
            PaymentState::Completed
        };

        let won = self
            .payment_store
            .record_refund(
                &payment.id,
                &RefundUpdate {
                    expected_prior_refunded_minor: payment.refunded_amount_minor,
                    new_refunded_minor: new_cumulative,
                    reason: reason.to_string(),
                    gateway_refund_id: refund_id.to_string(),
                    new_state,
                },
            )
            .await?;

        if !won {
            // Another writer refunded concurrently; its record stands
            warn!(
                payment_id = %payment.id,
                refund_id = refund_id,
                "Lost refund race, skipping side effects"
            );
            return Ok(false);
        }

        // Wallet-funded payments credit the refund back to the payer. The
        // entry reference makes a webhook replay of the same refund a no-op.
        if payment.is_wallet_funded() {
            let credit = NewLedgerEntry::new(
                &payment.rider_id,
                OwnerKind::Rider,
                refund_minor,
                EntryCategory::Refund,
                format!("refund:{}", refund_id),
            )?
            .with_payment(&payment.id);
            self.wallet_store.credit(credit).await?;
        }

        if new_state == PaymentState::Refunded {
            self.ride_store
                .set_payment_status(&payment.ride_id, RidePaymentStatus::Refunded, &payment.id)
                .await?;
        }

        self.notifier
            .notify(PaymentEvent::RefundCompleted {
                payment_id: payment.id.clone(),
                amount_minor: refund_minor,
                user_id: payment.rider_id.clone(),
            })
            .await;

        info!(
            payment_id = %payment.id,
            refund_id = refund_id,
            refund_minor = refund_minor,
            cumulative_minor = new_cumulative,
            state = %new_state,
            "Refund recorded"
        );

        Ok(true)
    }
}
