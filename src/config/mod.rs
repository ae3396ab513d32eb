use crate::core::{AppError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub razorpay: GatewayConfig,
    pub stripe: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
    /// Platform cut of each completed ride payment, e.g. 0.20
    pub commission_rate: Decimal,
    /// A pending payment younger than this is reused instead of opening a new
    /// gateway order for the same ride
    pub pending_order_freshness_secs: u64,
    /// Flat fee (minor units) for rider cancellations after the driver is
    /// already arriving or arrived
    pub rider_cancellation_fee_minor: i64,
    /// Completed payments older than this without ledger entries are picked
    /// up by the settlement reconciliation pass
    pub reconciliation_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                commission_rate: Decimal::from_str(
                    &env::var("COMMISSION_RATE").unwrap_or_else(|_| "0.20".to_string()),
                )
                .map_err(|_| AppError::Configuration("Invalid COMMISSION_RATE".to_string()))?,
                pending_order_freshness_secs: env::var("PENDING_ORDER_FRESHNESS_SECS")
                    .unwrap_or_else(|_| "900".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid PENDING_ORDER_FRESHNESS_SECS".to_string())
                    })?,
                rider_cancellation_fee_minor: env::var("RIDER_CANCELLATION_FEE_MINOR")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RIDER_CANCELLATION_FEE_MINOR".to_string())
                    })?,
                reconciliation_grace_secs: env::var("RECONCILIATION_GRACE_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RECONCILIATION_GRACE_SECS".to_string())
                    })?,
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            razorpay: GatewayConfig {
                key_id: env::var("RAZORPAY_KEY_ID")
                    .map_err(|_| AppError::Configuration("RAZORPAY_KEY_ID not set".to_string()))?,
                key_secret: env::var("RAZORPAY_KEY_SECRET").map_err(|_| {
                    AppError::Configuration("RAZORPAY_KEY_SECRET not set".to_string())
                })?,
                webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET").map_err(|_| {
                    AppError::Configuration("RAZORPAY_WEBHOOK_SECRET not set".to_string())
                })?,
                base_url: env::var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
                timeout_ms: env::var("RAZORPAY_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .map_err(|_| {
                        AppError::Configuration("Invalid RAZORPAY_TIMEOUT_MS".to_string())
                    })?,
            },
            stripe: GatewayConfig {
                key_id: env::var("STRIPE_PUBLISHABLE_KEY").unwrap_or_default(),
                key_secret: env::var("STRIPE_SECRET_KEY").map_err(|_| {
                    AppError::Configuration("STRIPE_SECRET_KEY not set".to_string())
                })?,
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| {
                    AppError::Configuration("STRIPE_WEBHOOK_SECRET not set".to_string())
                })?,
                base_url: env::var("STRIPE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
                timeout_ms: env::var("STRIPE_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .map_err(|_| AppError::Configuration("Invalid STRIPE_TIMEOUT_MS".to_string()))?,
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.app.commission_rate < Decimal::ZERO || self.app.commission_rate >= Decimal::ONE {
            return Err(AppError::Configuration(
                "Commission rate must be in [0, 1)".to_string(),
            ));
        }

        if self.app.pending_order_freshness_secs == 0 {
            return Err(AppError::Configuration(
                "Pending order freshness window must be greater than 0".to_string(),
            ));
        }

        if self.app.rider_cancellation_fee_minor < 0 {
            return Err(AppError::Configuration(
                "Cancellation fee cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}
