pub mod wallet_controller;
