pub mod ride;

pub use ride::{
    cancellation_fee_minor, transition, CancellationActor, DriverCancelReason, Ride, RideEvent,
    RidePaymentStatus, RideState, RiderCancelReason,
};
