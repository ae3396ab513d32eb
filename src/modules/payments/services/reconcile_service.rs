use super::super::models::Payment;
use super::super::repositories::PaymentStore;
use super::refund_service::{RefundApplication, RefundService};
use super::settlement_service::SettlementService;
use crate::core::events::{Notifier, PaymentEvent};
use crate::core::{AppError, Result};
use crate::modules::gateways::{GatewayKind, GatewayRegistry, WebhookEvent, WebhookEventKind};
use std::sync::Arc;
use tracing::{info, warn};

/// How a webhook delivery was resolved; all three acknowledge with 2xx
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event applied a state transition
    Processed,
    /// Payment was already in the state the event describes
    Duplicate,
    /// Event type we do not act on
    Ignored,
}

/// Server-to-server webhook path. The authoritative counterpart to the
/// client-driven verification: both funnel into the same conditional writes,
/// so whichever arrives second resolves as a duplicate.
pub struct WebhookReconciler {
    payment_store: Arc<dyn PaymentStore>,
    registry: Arc<GatewayRegistry>,
    settlement: Arc<SettlementService>,
    refunds: Arc<RefundService>,
    notifier: Arc<dyn Notifier>,
}

impl WebhookReconciler {
    pub fn new(
        payment_store: Arc<dyn PaymentStore>,
        registry: Arc<GatewayRegistry>,
        settlement: Arc<SettlementService>,
        refunds: Arc<RefundService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            payment_store,
            registry,
            settlement,
            refunds,
            notifier,
        }
    }

    /// Verify the webhook signature over the raw body, then apply the event.
    ///
    /// A bad signature is rejected before the body is ever parsed. A known
    /// event for a payment we cannot find is an error so the gateway retries
    /// later; the order row may not be visible yet.
    pub async fn handle(
        &self,
        kind: GatewayKind,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome> {
        let gateway = self.registry.get(kind)?;
        let event = gateway.parse_webhook(raw_body, signature)?;

        match event.kind {
            WebhookEventKind::Captured => self.apply_captured(&event).await,
            WebhookEventKind::Failed => self.apply_failed(&event).await,
            WebhookEventKind::RefundProcessed => self.apply_refund(&event).await,
            WebhookEventKind::Unhandled => {
                info!(gateway = %kind, "Ignoring unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn apply_captured(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let payment = self.find_payment(event).await?;

        if payment.state.is_terminal() {
            info!(
                payment_id = %payment.id,
                state = %payment.state,
                "Capture webhook for terminal payment, acknowledging duplicate"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let txn_id = event.gateway_txn_id.as_deref().ok_or_else(|| {
            AppError::internal("Capture event carried no gateway transaction id")
        })?;

        let won = self
            .payment_store
            .complete_if_pending(&payment.id, txn_id)
            .await?;

        if !won {
            info!(
                payment_id = %payment.id,
                "Lost completion race to another writer, acknowledging duplicate"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let stored = self
            .payment_store
            .find_by_id(&payment.id)
            .await?
            .ok_or_else(|| AppError::internal("Payment vanished after conditional write"))?;

        // Completion is already durable; a settlement failure here is picked
        // up by the reconciliation sweep
        if let Err(e) = self.settlement.settle(&stored).await {
            warn!(
                payment_id = %stored.id,
                error = %e,
                "Settlement deferred to reconciliation"
            );
        }

        Ok(WebhookOutcome::Processed)
    }

    async fn apply_failed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let payment = self.find_payment(event).await?;

        if payment.state.is_terminal() {
            return Ok(WebhookOutcome::Duplicate);
        }

        let won = self.payment_store.fail_if_pending(&payment.id).await?;
        if !won {
            return Ok(WebhookOutcome::Duplicate);
        }

        self.notifier
            .notify(PaymentEvent::PaymentFailed {
                payment_id: payment.id.clone(),
                amount_minor: payment.amount_minor,
                user_id: payment.rider_id.clone(),
            })
            .await;

        info!(payment_id = %payment.id, "Payment marked failed from webhook");
        Ok(WebhookOutcome::Processed)
    }

    async fn apply_refund(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let payment = self.find_payment(event).await?;
        let refund_id = event
            .refund_id
            .as_deref()
            .ok_or_else(|| AppError::internal("Refund event carried no refund id"))?;

        let applied = self
            .refunds
            .apply_gateway_refund(&payment, refund_id, event.amount_minor)
            .await?;

        Ok(match applied {
            RefundApplication::Applied => WebhookOutcome::Processed,
            RefundApplication::Duplicate => WebhookOutcome::Duplicate,
        })
    }

    /// Resolve the payment an event refers to, preferring the order reference
    /// and falling back to the gateway transaction id (refund events from
    /// some gateways only carry the charge id).
    async fn find_payment(&self, event: &WebhookEvent) -> Result<Payment> {
        if let Some(order_ref) = event.order_ref.as_deref() {
            if let Some(payment) = self.payment_store.find_by_order_ref(order_ref).await? {
                return Ok(payment);
            }
        }
        if let Some(txn_id) = event.gateway_txn_id.as_deref() {
            if let Some(payment) = self.payment_store.find_by_txn_id(txn_id).await? {
                return Ok(payment);
            }
        }
        // 5xx so the gateway redelivers once our write lands
        Err(AppError::internal(format!(
            "No payment found for webhook event (order_ref={:?}, txn_id={:?})",
            event.order_ref, event.gateway_txn_id
        )))
    }
}
