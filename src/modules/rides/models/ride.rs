use crate::core::{AppError, Currency, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Ride lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RideState {
    Requested,
    Matched,
    Arriving,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, RideState::Completed | RideState::Cancelled)
    }
}

impl std::fmt::Display for RideState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RideState::Requested => "requested",
            RideState::Matched => "matched",
            RideState::Arriving => "arriving",
            RideState::Arrived => "arrived",
            RideState::InProgress => "in_progress",
            RideState::Completed => "completed",
            RideState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Reasons a rider may cancel, each mapped to the cancellation-fee policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderCancelReason {
    ChangedMind,
    DriverTooFar,
    WrongPickupLocation,
    FareTooHigh,
    Other,
}

/// Reasons a driver may cancel. `ReportedIncident` is the only reason that
/// can abort a ride already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverCancelReason {
    RiderNoShow,
    VehicleBreakdown,
    WrongAddress,
    ReportedIncident,
    Other,
}

/// Who cancelled, with their reason taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actor", content = "reason", rename_all = "snake_case")]
pub enum CancellationActor {
    Rider(RiderCancelReason),
    Driver(DriverCancelReason),
}

/// Events that drive the ride state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEvent {
    DriverMatched,
    DriverArriving,
    DriverArrived,
    TripStarted,
    TripCompleted,
    Cancel(CancellationActor),
}

/// Returns the next state for `(current, event)` or `InvalidStateTransition`.
///
/// Forward path: requested -> matched -> arriving -> arrived -> in_progress
/// -> completed. Any state before in_progress may cancel; in_progress may
/// only exit to completed, or to cancelled via a driver-reported incident.
pub fn transition(current: RideState, event: RideEvent) -> Result<RideState> {
    use RideEvent::*;
    use RideState::*;

    let next = match (current, event) {
        (Requested, DriverMatched) => Matched,
        (Matched, DriverArriving) => Arriving,
        (Arriving, DriverArrived) => Arrived,
        (Arrived, TripStarted) => InProgress,
        (InProgress, TripCompleted) => Completed,
        (Requested | Matched | Arriving | Arrived, Cancel(_)) => Cancelled,
        (InProgress, Cancel(CancellationActor::Driver(DriverCancelReason::ReportedIncident))) => {
            Cancelled
        }
        (state, event) => {
            return Err(AppError::invalid_transition(format!(
                "ride in state '{}' cannot accept event {:?}",
                state, event
            )))
        }
    };

    Ok(next)
}

/// Flat cancellation fee (minor units) owed for a cancellation in `state`.
///
/// Only riders pay, and only once the driver is already on the way or
/// waiting. Driver cancellations are always free for the rider.
pub fn cancellation_fee_minor(
    state: RideState,
    actor: CancellationActor,
    flat_fee_minor: i64,
) -> i64 {
    match (state, actor) {
        (RideState::Arriving | RideState::Arrived, CancellationActor::Rider(_)) => flat_fee_minor,
        _ => 0,
    }
}

/// Payment status carried on the ride record, updated when its payment
/// reaches a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RidePaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

/// A trip record moving through the lifecycle state machine
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ride {
    pub id: String,
    pub rider_id: String,
    pub driver_id: Option<String>,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub drop_lat: f64,
    pub drop_lng: f64,
    /// Quoted fare in minor currency units
    pub fare_minor: i64,
    pub currency: Currency,
    pub state: RideState,
    pub payment_status: RidePaymentStatus,
    /// Current/last payment opened for this ride
    pub last_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    pub fn new(
        rider_id: String,
        pickup: (f64, f64),
        drop: (f64, f64),
        fare_minor: i64,
        currency: Currency,
    ) -> Result<Self> {
        if fare_minor <= 0 {
            return Err(AppError::validation("Fare must be positive"));
        }
        if rider_id.trim().is_empty() {
            return Err(AppError::validation("Rider ID cannot be empty"));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            rider_id,
            driver_id: None,
            pickup_lat: pickup.0,
            pickup_lng: pickup.1,
            drop_lat: drop.0,
            drop_lng: drop.1,
            fare_minor,
            currency,
            state: RideState::Requested,
            payment_status: RidePaymentStatus::Unpaid,
            last_payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply an event, mutating the ride to the next state
    pub fn apply(&mut self, event: RideEvent) -> Result<RideState> {
        let next = transition(self.state, event)?;
        self.state = next;
        self.updated_at = Utc::now();
        Ok(next)
    }
}
