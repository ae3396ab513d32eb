pub mod config;
pub mod core;
pub mod modules;

pub use config::Config;
pub use core::{AppError, Result};
