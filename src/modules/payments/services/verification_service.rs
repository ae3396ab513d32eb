use super::super::models::{Payment, PaymentState};
use super::super::repositories::PaymentStore;
use super::settlement_service::SettlementService;
use crate::core::events::{Notifier, PaymentEvent};
use crate::core::{AppError, Result};
use crate::modules::gateways::GatewayRegistry;
use std::sync::Arc;
use tracing::{info, warn};

/// Synchronous client-driven payment verification.
///
/// Races with the webhook reconciler over the same payment; both funnel into
/// the store's `complete_if_pending` conditional write, so at most one of
/// them applies the completion side effect.
pub struct VerificationService {
    payment_store: Arc<dyn PaymentStore>,
    registry: Arc<GatewayRegistry>,
    settlement: Arc<SettlementService>,
    notifier: Arc<dyn Notifier>,
}

impl VerificationService {
    pub fn new(
        payment_store: Arc<dyn PaymentStore>,
        registry: Arc<GatewayRegistry>,
        settlement: Arc<SettlementService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payment_store,
            registry,
            settlement,
            notifier,
        }
    }

    /// Verify a client-submitted signature for `order_ref` and drive the
    /// payment to a terminal state.
    ///
    /// Signature mismatch marks the payment failed and is never retried.
    /// Losing the completion race to the webhook is success: the stored
    /// payment is returned without re-applying any side effect.
    pub async fn verify(
        &self,
        caller_id: &str,
        order_ref: &str,
        gateway_txn_id: &str,
        signature: &str,
    ) -> Result<Payment> {
        let payment = self
            .payment_store
            .find_by_order_ref(order_ref)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment for order '{}'", order_ref)))?;

        if payment.rider_id != caller_id {
            return Err(AppError::unauthorized(
                "Caller does not own this payment".to_string(),
            ));
        }

        // Already terminal: idempotent re-entry, return the stored result
        if payment.state.is_terminal() {
            info!(
                payment_id = %payment.id,
                state = %payment.state,
                "Verify called on terminal payment, returning stored result"
            );
            return Ok(payment);
        }

        let gateway = self.registry.get(payment.gateway)?;

        if let Err(e) = gateway.verify_payment_signature(order_ref, gateway_txn_id, signature) {
            warn!(
                payment_id = %payment.id,
                order_ref = order_ref,
                "Payment signature mismatch, marking failed"
            );
            let won = self.payment_store.fail_if_pending(&payment.id).await?;
            if won {
                self.notifier
                    .notify(PaymentEvent::PaymentFailed {
                        payment_id: payment.id.clone(),
                        amount_minor: payment.amount_minor,
                        user_id: payment.rider_id.clone(),
                    })
                    .await;
            }
            return Err(e);
        }

        let won = self
            .payment_store
            .complete_if_pending(&payment.id, gateway_txn_id)
            .await?;

        let stored = self
            .payment_store
            .find_by_id(&payment.id)
            .await?
            .ok_or_else(|| AppError::internal("Payment vanished after conditional write"))?;

        if won {
            // Terminal state is persisted before any side effect; a failure
            // here leaves the payment for the reconciliation pass
            if let Err(e) = self.settlement.settle(&stored).await {
                warn!(
                    payment_id = %stored.id,
                    error = %e,
                    "Settlement deferred to reconciliation"
                );
            }
        } else {
            info!(
                payment_id = %stored.id,
                "Lost completion race, treating as idempotent success"
            );
        }

        // Losing writer must still observe a completed payment
        if stored.state == PaymentState::Pending {
            return Err(AppError::internal(
                "Payment still pending after completion write",
            ));
        }

        Ok(stored)
    }
}
