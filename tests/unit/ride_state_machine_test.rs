//! Property tests for the ride lifecycle state machine, plus lifecycle
//! service behavior over the store seam.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::Harness;
use proptest::prelude::*;
use ridepay::core::Currency;
use ridepay::modules::wallets::models::PLATFORM_WALLET_ID;
use ridepay::modules::wallets::repositories::WalletStore;
use ridepay::AppError;
use ridepay::modules::rides::models::{
    transition, CancellationActor, DriverCancelReason, RideEvent, RideState, RiderCancelReason,
};

fn events() -> impl Strategy<Value = RideEvent> {
    prop_oneof![
        Just(RideEvent::DriverMatched),
        Just(RideEvent::DriverArriving),
        Just(RideEvent::DriverArrived),
        Just(RideEvent::TripStarted),
        Just(RideEvent::TripCompleted),
        Just(RideEvent::Cancel(CancellationActor::Rider(
            RiderCancelReason::ChangedMind
        ))),
        Just(RideEvent::Cancel(CancellationActor::Rider(
            RiderCancelReason::FareTooHigh
        ))),
        Just(RideEvent::Cancel(CancellationActor::Driver(
            DriverCancelReason::RiderNoShow
        ))),
        Just(RideEvent::Cancel(CancellationActor::Driver(
            DriverCancelReason::ReportedIncident
        ))),
    ]
}

/// Rank of each state on the forward path; terminal states are unranked
fn forward_rank(state: RideState) -> Option<u8> {
    match state {
        RideState::Requested => Some(0),
        RideState::Matched => Some(1),
        RideState::Arriving => Some(2),
        RideState::Arrived => Some(3),
        RideState::InProgress => Some(4),
        RideState::Completed | RideState::Cancelled => None,
    }
}

proptest! {
    /// Applying any event sequence never skips a state on the forward path
    /// and never leaves a terminal state
    #[test]
    fn no_skips_and_terminals_absorb(seq in proptest::collection::vec(events(), 0..20)) {
        let mut state = RideState::Requested;

        for event in seq {
            let before = state;
            match transition(state, event) {
                Ok(next) => {
                    prop_assert!(!before.is_terminal(), "terminal state accepted an event");

                    match (forward_rank(before), forward_rank(next)) {
                        // A forward step advances by exactly one
                        (Some(b), Some(n)) => prop_assert_eq!(n, b + 1),
                        // Entering a terminal state is always allowed from a
                        // ranked state
                        (Some(_), None) => {}
                        (None, _) => prop_assert!(false, "transition out of terminal state"),
                    }
                    state = next;
                }
                Err(_) => {
                    // Rejected events leave the state untouched
                    prop_assert_eq!(state, before);
                }
            }
        }
    }

    /// An in-progress trip only ends through completion or a driver-reported
    /// incident
    #[test]
    fn in_progress_exits_are_restricted(event in events()) {
        match transition(RideState::InProgress, event) {
            Ok(RideState::Completed) => prop_assert_eq!(event, RideEvent::TripCompleted),
            Ok(RideState::Cancelled) => prop_assert_eq!(
                event,
                RideEvent::Cancel(CancellationActor::Driver(
                    DriverCancelReason::ReportedIncident
                ))
            ),
            Ok(other) => prop_assert!(false, "unexpected in_progress exit to {:?}", other),
            Err(_) => {}
        }
    }

    /// Cancellation is accepted from every non-terminal state before the trip
    /// starts, regardless of actor
    #[test]
    fn pre_trip_cancellation_always_allowed(
        state in prop_oneof![
            Just(RideState::Requested),
            Just(RideState::Matched),
            Just(RideState::Arriving),
            Just(RideState::Arrived),
        ],
        actor in prop_oneof![
            Just(CancellationActor::Rider(RiderCancelReason::Other)),
            Just(CancellationActor::Driver(DriverCancelReason::Other)),
        ],
    ) {
        prop_assert_eq!(
            transition(state, RideEvent::Cancel(actor)).unwrap(),
            RideState::Cancelled
        );
    }
}

#[tokio::test]
async fn lifecycle_through_service() {
    let h = Harness::new();
    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();
    assert_eq!(ride.state, RideState::Requested);

    let ride = h.rides.assign_driver(&ride.id, "driver-1").await.unwrap();
    assert_eq!(ride.state, RideState::Matched);
    assert_eq!(ride.driver_id.as_deref(), Some("driver-1"));

    // A second matching attempt loses the conditional write
    let err = h.rides.assign_driver(&ride.id, "driver-2").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));

    let ride = h.rides.advance(&ride.id, RideEvent::DriverArriving).await.unwrap();
    let ride = h.rides.advance(&ride.id, RideEvent::DriverArrived).await.unwrap();
    let ride = h.rides.advance(&ride.id, RideEvent::TripStarted).await.unwrap();
    let ride = h.rides.advance(&ride.id, RideEvent::TripCompleted).await.unwrap();
    assert_eq!(ride.state, RideState::Completed);

    // Skipping states is rejected
    let err = h.rides.advance(&ride.id, RideEvent::TripStarted).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn rider_cancellation_after_arrival_charges_fee() {
    let h = Harness::new();
    h.fund_wallet("rider-1", 5000).await;

    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();
    h.rides.assign_driver(&ride.id, "driver-1").await.unwrap();
    h.rides.advance(&ride.id, RideEvent::DriverArriving).await.unwrap();

    let cancelled = h
        .rides
        .cancel(
            "rider-1",
            &ride.id,
            CancellationActor::Rider(RiderCancelReason::ChangedMind),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.state, RideState::Cancelled);

    assert_eq!(h.wallet_store.balance("rider-1").await.unwrap(), 2000);
    assert_eq!(
        h.wallet_store.balance(PLATFORM_WALLET_ID).await.unwrap(),
        3000
    );
}

#[tokio::test]
async fn early_rider_cancellation_is_free() {
    let h = Harness::new();
    h.fund_wallet("rider-1", 5000).await;

    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();
    h.rides.assign_driver(&ride.id, "driver-1").await.unwrap();

    h.rides
        .cancel(
            "rider-1",
            &ride.id,
            CancellationActor::Rider(RiderCancelReason::DriverTooFar),
        )
        .await
        .unwrap();

    assert_eq!(h.wallet_store.balance("rider-1").await.unwrap(), 5000);
}

#[tokio::test]
async fn driver_cancellation_never_charges_the_rider() {
    let h = Harness::new();
    h.fund_wallet("rider-1", 5000).await;

    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();
    h.rides.assign_driver(&ride.id, "driver-1").await.unwrap();
    h.rides.advance(&ride.id, RideEvent::DriverArriving).await.unwrap();
    h.rides.advance(&ride.id, RideEvent::DriverArrived).await.unwrap();

    h.rides
        .cancel(
            "driver-1",
            &ride.id,
            CancellationActor::Driver(DriverCancelReason::RiderNoShow),
        )
        .await
        .unwrap();

    assert_eq!(h.wallet_store.balance("rider-1").await.unwrap(), 5000);
}

#[tokio::test]
async fn uncovered_fee_defers_without_blocking_cancellation() {
    let h = Harness::new();

    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();
    h.rides.assign_driver(&ride.id, "driver-1").await.unwrap();
    h.rides.advance(&ride.id, RideEvent::DriverArriving).await.unwrap();

    // Empty wallet: the cancellation still lands, the fee is deferred
    let cancelled = h
        .rides
        .cancel(
            "rider-1",
            &ride.id,
            CancellationActor::Rider(RiderCancelReason::ChangedMind),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.state, RideState::Cancelled);
    assert_eq!(h.wallet_store.balance("rider-1").await.unwrap(), 0);
    assert_eq!(h.wallet_store.balance(PLATFORM_WALLET_ID).await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_authorization() {
    let h = Harness::new();
    let ride = h
        .rides
        .create("rider-1", (12.93, 77.61), (12.97, 77.59), 500, Currency::INR)
        .await
        .unwrap();

    // A stranger cannot cancel as the rider
    let err = h
        .rides
        .cancel(
            "rider-2",
            &ride.id,
            CancellationActor::Rider(RiderCancelReason::Other),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    // No driver assigned yet, so nobody can cancel as the driver
    let err = h
        .rides
        .cancel(
            "driver-1",
            &ride.id,
            CancellationActor::Driver(DriverCancelReason::Other),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}
