pub mod ride_repository;

pub use ride_repository::{MySqlRideStore, RideStore};
