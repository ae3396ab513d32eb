use super::super::models::Payment;
use super::super::repositories::PaymentStore;
use crate::core::events::{Notifier, PaymentEvent};
use crate::core::money::round_fraction;
use crate::core::{AppError, Result};
use crate::modules::rides::models::RidePaymentStatus;
use crate::modules::rides::repositories::RideStore;
use crate::modules::wallets::models::{
    EntryCategory, NewLedgerEntry, OwnerKind, PLATFORM_WALLET_ID,
};
use crate::modules::wallets::repositories::WalletStore;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Commission/earning split for one completed payment.
/// `commission + earning == amount` always holds exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarningsSplit {
    pub commission_minor: i64,
    pub earning_minor: i64,
}

/// Computes the platform commission and the driver earning for a payment.
/// The earning is derived by subtraction, not rounded independently.
#[derive(Debug, Clone)]
pub struct EarningsCalculator {
    commission_rate: Decimal,
}

impl EarningsCalculator {
    pub fn new(commission_rate: Decimal) -> Result<Self> {
        if commission_rate < Decimal::ZERO || commission_rate >= Decimal::ONE {
            return Err(AppError::validation("Commission rate must be in [0, 1)"));
        }
        Ok(Self { commission_rate })
    }

    pub fn split(&self, amount_minor: i64) -> EarningsSplit {
        let commission_minor = round_fraction(amount_minor, self.commission_rate);
        EarningsSplit {
            commission_minor,
            earning_minor: amount_minor - commission_minor,
        }
    }
}

/// Applies the side effects of a payment reaching Completed: wallet charge
/// for wallet-funded rides, driver earning and platform commission ledger
/// credits, ride payment status, and the realtime success event.
///
/// Only the writer that won the `complete_if_pending` conditional write calls
/// `settle`; the ledger appends are additionally idempotent on their
/// references so the reconciliation pass can safely re-run a settlement that
/// crashed midway.
pub struct SettlementService {
    payment_store: Arc<dyn PaymentStore>,
    wallet_store: Arc<dyn WalletStore>,
    ride_store: Arc<dyn RideStore>,
    notifier: Arc<dyn Notifier>,
    calculator: EarningsCalculator,
    reconciliation_grace: ChronoDuration,
}

impl SettlementService {
    pub fn new(
        payment_store: Arc<dyn PaymentStore>,
        wallet_store: Arc<dyn WalletStore>,
        ride_store: Arc<dyn RideStore>,
        notifier: Arc<dyn Notifier>,
        calculator: EarningsCalculator,
        reconciliation_grace: ChronoDuration,
    ) -> Self {
        Self {
            payment_store,
            wallet_store,
            ride_store,
            notifier,
            calculator,
            reconciliation_grace,
        }
    }

    /// Apply all completion side effects for `payment`, then mark it settled
    pub async fn settle(&self, payment: &Payment) -> Result<()> {
        let ride = self
            .ride_store
            .find_by_id(&payment.ride_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Ride '{}' not found", payment.ride_id)))?;

        let driver_id = ride.driver_id.as_deref().ok_or_else(|| {
            AppError::internal(format!(
                "Payment {} completed for ride {} without an assigned driver",
                payment.id, payment.ride_id
            ))
        })?;

        // Wallet-funded rides are charged from the rider's wallet at
        // settlement time
        if payment.is_wallet_funded() {
            let charge = NewLedgerEntry::new(
                &payment.rider_id,
                OwnerKind::Rider,
                payment.amount_minor,
                EntryCategory::RidePayment,
                format!("{}:charge", payment.id),
            )?
            .with_payment(&payment.id);
            self.wallet_store.debit(charge).await?;
        }

        let split = self.calculator.split(payment.amount_minor);
        // The first ledger leg that actually appends decides whether this run
        // is the first application; either leg may be empty after rounding
        let mut first_application = None;

        if split.earning_minor > 0 {
            let earning = NewLedgerEntry::new(
                driver_id,
                OwnerKind::Driver,
                split.earning_minor,
                EntryCategory::RidePayment,
                format!("{}:earning", payment.id),
            )?
            .with_payment(&payment.id);
            let outcome = self.wallet_store.credit(earning).await?;
            first_application.get_or_insert(!outcome.duplicate);
        }

        if split.commission_minor > 0 {
            let commission = NewLedgerEntry::new(
                PLATFORM_WALLET_ID,
                OwnerKind::Platform,
                split.commission_minor,
                EntryCategory::Commission,
                format!("{}:commission", payment.id),
            )?
            .with_payment(&payment.id);
            let outcome = self.wallet_store.credit(commission).await?;
            first_application.get_or_insert(!outcome.duplicate);
        }

        self.ride_store
            .set_payment_status(&payment.ride_id, RidePaymentStatus::Paid, &payment.id)
            .await?;

        // A reconciliation re-run over already-applied entries skips the
        // duplicate notification
        if first_application.unwrap_or(false) {
            self.notifier
                .notify(PaymentEvent::PaymentSuccess {
                    payment_id: payment.id.clone(),
                    amount_minor: payment.amount_minor,
                    user_id: payment.rider_id.clone(),
                })
                .await;
        }

        self.payment_store.mark_settled(&payment.id).await?;

        info!(
            payment_id = %payment.id,
            ride_id = %payment.ride_id,
            earning_minor = split.earning_minor,
            commission_minor = split.commission_minor,
            "Payment settled"
        );

        Ok(())
    }

    /// One reconciliation sweep: re-apply settlement for completed payments
    /// whose side effects were never marked applied (crash between the
    /// terminal conditional write and the ledger appends)
    pub async fn run_reconciliation(&self) -> Result<usize> {
        let stuck = self
            .payment_store
            .find_completed_unsettled(self.reconciliation_grace)
            .await?;

        let mut recovered = 0;
        for payment in &stuck {
            match self.settle(payment).await {
                Ok(()) => {
                    warn!(
                        payment_id = %payment.id,
                        "Recovered completed payment with missing settlement"
                    );
                    recovered += 1;
                }
                Err(e) => {
                    error!(
                        payment_id = %payment.id,
                        error = %e,
                        "Reconciliation failed for payment"
                    );
                }
            }
        }

        Ok(recovered)
    }

    /// Background reconciliation loop; spawn as a tokio task in main
    pub async fn start_reconciliation_loop(self: Arc<Self>, every: Duration) {
        info!(
            interval_secs = every.as_secs(),
            "Starting settlement reconciliation loop"
        );

        let mut ticker = interval(every);
        loop {
            ticker.tick().await;

            match self.run_reconciliation().await {
                Ok(recovered) => {
                    if recovered > 0 {
                        info!(recovered = recovered, "Reconciliation sweep recovered payments");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation sweep failed");
                }
            }
        }
    }
}
