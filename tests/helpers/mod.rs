//! In-process doubles for the persistence and gateway seams, with the same
//! conditional-write semantics as the MySQL-backed stores.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ridepay::core::events::{Notifier, PaymentEvent};
use ridepay::core::{AppError, Currency, Result};
use ridepay::modules::gateways::{
    CreateOrderRequest, GatewayClient, GatewayKind, GatewayOrder, GatewayRefund, GatewayRegistry,
    WebhookEvent, WebhookEventKind,
};
use ridepay::modules::payments::models::{Payment, PaymentMethod, PaymentState};
use ridepay::modules::payments::repositories::{PaymentStore, RefundUpdate};
use ridepay::modules::payments::services::{
    EarningsCalculator, OrderService, RefundService, SettlementService, VerificationService,
    WebhookReconciler,
};
use ridepay::modules::rides::models::{Ride, RideEvent, RidePaymentStatus, RideState};
use ridepay::modules::rides::repositories::RideStore;
use ridepay::modules::rides::services::RideService;
use ridepay::modules::wallets::models::{AppendOutcome, LedgerEntry, NewLedgerEntry};
use ridepay::modules::wallets::repositories::WalletStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Stores

#[derive(Default)]
pub struct InMemoryRideStore {
    rides: Mutex<HashMap<String, Ride>>,
}

#[async_trait]
impl RideStore for InMemoryRideStore {
    async fn insert(&self, ride: &Ride) -> Result<()> {
        self.rides
            .lock()
            .unwrap()
            .insert(ride.id.clone(), ride.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Ride>> {
        Ok(self.rides.lock().unwrap().get(id).cloned())
    }

    async fn update_state(&self, id: &str, from: RideState, to: RideState) -> Result<bool> {
        let mut rides = self.rides.lock().unwrap();
        match rides.get_mut(id) {
            Some(ride) if ride.state == from => {
                ride.state = to;
                ride.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn assign_driver(&self, id: &str, driver_id: &str) -> Result<bool> {
        let mut rides = self.rides.lock().unwrap();
        match rides.get_mut(id) {
            Some(ride) if ride.state == RideState::Requested && ride.driver_id.is_none() => {
                ride.driver_id = Some(driver_id.to_string());
                ride.state = RideState::Matched;
                ride.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_payment_status(
        &self,
        id: &str,
        status: RidePaymentStatus,
        last_payment_id: &str,
    ) -> Result<()> {
        let mut rides = self.rides.lock().unwrap();
        if let Some(ride) = rides.get_mut(id) {
            ride.payment_status = status;
            ride.last_payment_id = Some(last_payment_id.to_string());
            ride.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<HashMap<String, Payment>>,
    /// Applied (payment_id, gateway_refund_id) pairs, mirroring the refund
    /// history table
    refund_history: Mutex<Vec<(String, String)>>,
}

impl InMemoryPaymentStore {
    /// Directly mutate a stored payment, for setting up crash/edge scenarios
    pub fn mutate(&self, id: &str, f: impl FnOnce(&mut Payment)) {
        let mut payments = self.payments.lock().unwrap();
        if let Some(p) = payments.get_mut(id) {
            f(p);
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_pending_unique(
        &self,
        payment: Payment,
        freshness: ChronoDuration,
    ) -> Result<(Payment, bool)> {
        let mut payments = self.payments.lock().unwrap();
        let cutoff = Utc::now() - freshness;
        if let Some(existing) = payments
            .values()
            .filter(|p| {
                p.ride_id == payment.ride_id
                    && p.state == PaymentState::Pending
                    && p.created_at >= cutoff
            })
            .max_by_key(|p| p.created_at)
        {
            return Ok((existing.clone(), false));
        }
        payments.insert(payment.id.clone(), payment.clone());
        Ok((payment, true))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        Ok(self.payments.lock().unwrap().get(id).cloned())
    }

    async fn find_by_order_ref(&self, order_ref: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_order_ref == order_ref)
            .cloned())
    }

    async fn find_by_txn_id(&self, gateway_txn_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_txn_id.as_deref() == Some(gateway_txn_id))
            .cloned())
    }

    async fn find_fresh_pending_for_ride(
        &self,
        ride_id: &str,
        freshness: ChronoDuration,
    ) -> Result<Option<Payment>> {
        let cutoff = Utc::now() - freshness;
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                p.ride_id == ride_id && p.state == PaymentState::Pending && p.created_at >= cutoff
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_completed_for_ride(&self, ride_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .find(|p| {
                p.ride_id == ride_id
                    && matches!(p.state, PaymentState::Completed | PaymentState::Refunded)
            })
            .cloned())
    }

    async fn complete_if_pending(&self, id: &str, gateway_txn_id: &str) -> Result<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(id) {
            Some(p) if p.state == PaymentState::Pending => {
                p.state = PaymentState::Completed;
                p.gateway_txn_id = Some(gateway_txn_id.to_string());
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_if_pending(&self, id: &str) -> Result<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(id) {
            Some(p) if p.state == PaymentState::Pending => {
                p.state = PaymentState::Failed;
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_refund(&self, id: &str, update: &RefundUpdate) -> Result<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(id) {
            Some(p)
                if p.state == PaymentState::Completed
                    && p.refunded_amount_minor == update.expected_prior_refunded_minor =>
            {
                p.state = update.new_state;
                p.refunded_amount_minor = update.new_refunded_minor;
                p.refund_reason = Some(update.reason.clone());
                p.gateway_refund_id = Some(update.gateway_refund_id.clone());
                p.refunded_at = Some(Utc::now());
                p.updated_at = Utc::now();
                self.refund_history
                    .lock()
                    .unwrap()
                    .push((id.to_string(), update.gateway_refund_id.clone()));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refund_applied(&self, id: &str, gateway_refund_id: &str) -> Result<bool> {
        Ok(self
            .refund_history
            .lock()
            .unwrap()
            .iter()
            .any(|(p, r)| p == id && r == gateway_refund_id))
    }

    async fn mark_settled(&self, id: &str) -> Result<bool> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(id) {
            Some(p)
                if matches!(p.state, PaymentState::Completed | PaymentState::Refunded)
                    && p.settled_at.is_none() =>
            {
                p.settled_at = Some(Utc::now());
                p.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_completed_unsettled(&self, grace: ChronoDuration) -> Result<Vec<Payment>> {
        let cutoff = Utc::now() - grace;
        Ok(self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                p.state == PaymentState::Completed
                    && p.settled_at.is_none()
                    && p.updated_at < cutoff
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWalletStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl InMemoryWalletStore {
    fn append(&self, input: NewLedgerEntry, signed_amount: i64) -> Result<AppendOutcome> {
        let mut entries = self.entries.lock().unwrap();

        if let Some(existing) = entries.iter().find(|e| e.reference == input.reference) {
            return Ok(AppendOutcome {
                entry: existing.clone(),
                duplicate: true,
            });
        }

        if signed_amount < 0 {
            let balance: i64 = entries
                .iter()
                .filter(|e| e.wallet_id == input.wallet_id)
                .map(|e| e.amount_minor)
                .sum();
            if balance < -signed_amount {
                return Err(AppError::insufficient_funds(format!(
                    "wallet {} balance {} < debit {}",
                    input.wallet_id, balance, -signed_amount
                )));
            }
        }

        let entry = input.into_entry(signed_amount);
        entries.push(entry.clone());
        Ok(AppendOutcome {
            entry,
            duplicate: false,
        })
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn credit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome> {
        let amount = entry.amount_minor;
        self.append(entry, amount)
    }

    async fn debit(&self, entry: NewLedgerEntry) -> Result<AppendOutcome> {
        let amount = entry.amount_minor;
        self.append(entry, -amount)
    }

    async fn balance(&self, wallet_id: &str) -> Result<i64> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .map(|e| e.amount_minor)
            .sum())
    }

    async fn entries(&self, wallet_id: &str, limit: u32, offset: u32) -> Result<Vec<LedgerEntry>> {
        let mut matched: Vec<LedgerEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Gateway double

/// Scripted gateway. Payment signatures are `sig:{order_ref}:{txn_id}`,
/// webhook signatures are the fixed string `whsig`, and webhook bodies are
/// plain JSON with a `kind` discriminant.
pub struct MockGateway {
    kind: GatewayKind,
    order_seq: AtomicU64,
    refund_seq: AtomicU64,
    pub fail_create: AtomicBool,
    pub fail_refund: AtomicBool,
}

impl MockGateway {
    pub fn new(kind: GatewayKind) -> Self {
        Self {
            kind,
            order_seq: AtomicU64::new(0),
            refund_seq: AtomicU64::new(0),
            fail_create: AtomicBool::new(false),
            fail_refund: AtomicBool::new(false),
        }
    }

    pub fn payment_signature(order_ref: &str, txn_id: &str) -> String {
        format!("sig:{}:{}", order_ref, txn_id)
    }

    pub const WEBHOOK_SIGNATURE: &'static str = "whsig";

    pub fn capture_body(order_ref: &str, txn_id: &str) -> Vec<u8> {
        serde_json::json!({
            "kind": "captured",
            "order_ref": order_ref,
            "txn_id": txn_id,
        })
        .to_string()
        .into_bytes()
    }

    pub fn failure_body(order_ref: &str) -> Vec<u8> {
        serde_json::json!({
            "kind": "failed",
            "order_ref": order_ref,
        })
        .to_string()
        .into_bytes()
    }

    pub fn refund_body(txn_id: &str, refund_id: &str, amount_minor: i64) -> Vec<u8> {
        serde_json::json!({
            "kind": "refund_processed",
            "txn_id": txn_id,
            "refund_id": refund_id,
            "amount_minor": amount_minor,
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn create_order(&self, request: CreateOrderRequest) -> Result<GatewayOrder> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::gateway("order creation unavailable"));
        }
        let n = self.order_seq.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder {
            order_ref: format!("order_{}", n),
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }

    fn verify_payment_signature(
        &self,
        order_ref: &str,
        gateway_txn_id: &str,
        signature: &str,
    ) -> Result<()> {
        if signature == Self::payment_signature(order_ref, gateway_txn_id) {
            Ok(())
        } else {
            Err(AppError::signature_mismatch("payment signature mismatch"))
        }
    }

    fn parse_webhook(&self, raw_body: &[u8], signature: &str) -> Result<WebhookEvent> {
        if signature != Self::WEBHOOK_SIGNATURE {
            return Err(AppError::signature_mismatch("webhook signature mismatch"));
        }
        let raw: serde_json::Value = serde_json::from_slice(raw_body)?;
        let kind = match raw["kind"].as_str() {
            Some("captured") => WebhookEventKind::Captured,
            Some("failed") => WebhookEventKind::Failed,
            Some("refund_processed") => WebhookEventKind::RefundProcessed,
            _ => WebhookEventKind::Unhandled,
        };
        Ok(WebhookEvent {
            kind,
            order_ref: raw["order_ref"].as_str().map(str::to_string),
            gateway_txn_id: raw["txn_id"].as_str().map(str::to_string),
            refund_id: raw["refund_id"].as_str().map(str::to_string),
            amount_minor: raw["amount_minor"].as_i64(),
            raw,
        })
    }

    async fn refund(
        &self,
        _gateway_txn_id: &str,
        _amount_minor: i64,
        _reason: &str,
    ) -> Result<GatewayRefund> {
        if self.fail_refund.load(Ordering::SeqCst) {
            return Err(AppError::gateway("refund endpoint unavailable"));
        }
        let n = self.refund_seq.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayRefund {
            refund_id: format!("rfnd_{}", n),
            status: "processed".to_string(),
        })
    }
}

/// Notifier double capturing emitted events
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<PaymentEvent>>,
}

impl RecordingNotifier {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: PaymentEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Wiring

/// Fully wired in-process service stack
pub struct Harness {
    pub payment_store: Arc<InMemoryPaymentStore>,
    pub wallet_store: Arc<InMemoryWalletStore>,
    pub ride_store: Arc<InMemoryRideStore>,
    pub gateway: Arc<MockGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub rides: Arc<RideService>,
    pub orders: Arc<OrderService>,
    pub verification: Arc<VerificationService>,
    pub settlement: Arc<SettlementService>,
    pub refunds: Arc<RefundService>,
    pub reconciler: Arc<WebhookReconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(dec!(0.20), ChronoDuration::zero())
    }

    pub fn with_grace(reconciliation_grace: ChronoDuration) -> Self {
        Self::build(dec!(0.20), reconciliation_grace)
    }

    pub fn with_commission_rate(commission_rate: Decimal) -> Self {
        Self::build(commission_rate, ChronoDuration::zero())
    }

    fn build(commission_rate: Decimal, reconciliation_grace: ChronoDuration) -> Self {
        let payment_store = Arc::new(InMemoryPaymentStore::default());
        let wallet_store = Arc::new(InMemoryWalletStore::default());
        let ride_store = Arc::new(InMemoryRideStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let gateway = Arc::new(MockGateway::new(GatewayKind::Razorpay));

        let mut registry = GatewayRegistry::new();
        registry.register(gateway.clone());
        let registry = Arc::new(registry);

        let rides = Arc::new(RideService::new(
            ride_store.clone(),
            wallet_store.clone(),
            3000,
        ));
        let calculator = EarningsCalculator::new(commission_rate).unwrap();
        let settlement = Arc::new(SettlementService::new(
            payment_store.clone(),
            wallet_store.clone(),
            ride_store.clone(),
            notifier.clone(),
            calculator,
            reconciliation_grace,
        ));
        let orders = Arc::new(OrderService::new(
            payment_store.clone(),
            ride_store.clone(),
            registry.clone(),
            ChronoDuration::minutes(15),
        ));
        let verification = Arc::new(VerificationService::new(
            payment_store.clone(),
            registry.clone(),
            settlement.clone(),
            notifier.clone(),
        ));
        let refunds = Arc::new(RefundService::new(
            payment_store.clone(),
            wallet_store.clone(),
            ride_store.clone(),
            registry.clone(),
            notifier.clone(),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            payment_store.clone(),
            registry.clone(),
            settlement.clone(),
            refunds.clone(),
            notifier.clone(),
        ));

        Self {
            payment_store,
            wallet_store,
            ride_store,
            gateway,
            notifier,
            rides,
            orders,
            verification,
            settlement,
            refunds,
            reconciler,
        }
    }

    /// Insert a ride already in progress with a driver assigned
    pub async fn seed_ride(&self, rider_id: &str, driver_id: &str, fare_minor: i64) -> Ride {
        let mut ride = Ride::new(
            rider_id.to_string(),
            (12.93, 77.61),
            (12.97, 77.59),
            fare_minor,
            Currency::INR,
        )
        .unwrap();
        ride.driver_id = Some(driver_id.to_string());
        ride.apply(RideEvent::DriverMatched).unwrap();
        ride.apply(RideEvent::DriverArriving).unwrap();
        ride.apply(RideEvent::DriverArrived).unwrap();
        ride.apply(RideEvent::TripStarted).unwrap();
        ride.apply(RideEvent::TripCompleted).unwrap();
        self.ride_store.insert(&ride).await.unwrap();
        ride
    }

    /// Open an order and complete it through client verification
    pub async fn completed_payment(&self, ride: &Ride, method: PaymentMethod) -> Payment {
        let payment = self
            .orders
            .create_order(
                &ride.rider_id,
                &ride.id,
                ride.fare_minor,
                method,
                GatewayKind::Razorpay,
            )
            .await
            .unwrap();

        let txn_id = format!("txn_{}", payment.id);
        let signature = MockGateway::payment_signature(&payment.gateway_order_ref, &txn_id);
        self.verification
            .verify(&ride.rider_id, &payment.gateway_order_ref, &txn_id, &signature)
            .await
            .unwrap()
    }

    /// Preload a rider wallet via a topup credit
    pub async fn fund_wallet(&self, wallet_id: &str, amount_minor: i64) {
        use ridepay::modules::wallets::models::{EntryCategory, OwnerKind};
        let entry = NewLedgerEntry::new(
            wallet_id,
            OwnerKind::Rider,
            amount_minor,
            EntryCategory::Topup,
            format!("topup:seed:{}", wallet_id),
        )
        .unwrap();
        self.wallet_store.credit(entry).await.unwrap();
    }
}
