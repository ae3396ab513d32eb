pub mod order_service;
pub mod reconcile_service;
pub mod refund_service;
pub mod settlement_service;
pub mod verification_service;

pub use order_service::OrderService;
pub use reconcile_service::{WebhookOutcome, WebhookReconciler};
pub use refund_service::{RefundApplication, RefundService};
pub use settlement_service::{EarningsCalculator, EarningsSplit, SettlementService};
pub use verification_service::VerificationService;
