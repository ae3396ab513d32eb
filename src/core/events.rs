use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Real-time events emitted by the settlement core, consumed by an external
/// notifier keyed by the recipient user/driver id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    PaymentSuccess {
        payment_id: String,
        amount_minor: i64,
        user_id: String,
    },
    PaymentFailed {
        payment_id: String,
        amount_minor: i64,
        user_id: String,
    },
    RefundInitiated {
        payment_id: String,
        amount_minor: i64,
        user_id: String,
    },
    RefundCompleted {
        payment_id: String,
        amount_minor: i64,
        user_id: String,
    },
}

impl PaymentEvent {
    /// Wire name of the event, matching the realtime channel contract
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentSuccess { .. } => "payment:success",
            PaymentEvent::PaymentFailed { .. } => "payment:failed",
            PaymentEvent::RefundInitiated { .. } => "refund:initiated",
            PaymentEvent::RefundCompleted { .. } => "refund:completed",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            PaymentEvent::PaymentSuccess { user_id, .. }
            | PaymentEvent::PaymentFailed { user_id, .. }
            | PaymentEvent::RefundInitiated { user_id, .. }
            | PaymentEvent::RefundCompleted { user_id, .. } => user_id,
        }
    }
}

/// Seam to the external real-time delivery system. Delivery failures must not
/// fail the originating settlement, so `notify` is infallible; implementations
/// log and drop on error.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: PaymentEvent);
}

/// Default notifier: structured log line per event. The production push
/// pipeline subscribes downstream of these logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: PaymentEvent) {
        info!(
            event = event.name(),
            user_id = event.user_id(),
            payload = %serde_json::to_string(&event).unwrap_or_default(),
            "Emitting realtime event"
        );
    }
}
