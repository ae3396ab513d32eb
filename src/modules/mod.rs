pub mod gateways;
pub mod payments;
pub mod rides;
pub mod wallets;
