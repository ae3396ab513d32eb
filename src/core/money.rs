use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported currencies. All amounts in this system are integer minor units
/// (paise for INR, cents for USD); `Currency` only carries display rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(3)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indian Rupee (100 paise)
    INR,
    /// US Dollar (100 cents)
    USD,
}

impl Currency {
    /// Minor units per major unit
    pub fn minor_per_major(&self) -> i64 {
        match self {
            Currency::INR | Currency::USD => 100,
        }
    }

    /// Formats a minor-unit amount for display in major units
    pub fn format_minor(&self, amount_minor: i64) -> String {
        let per = self.minor_per_major();
        format!(
            "{} {}.{:02}",
            self,
            amount_minor / per,
            (amount_minor % per).abs()
        )
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::INR => write!(f, "INR"),
            Currency::USD => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            _ => Err(format!("Invalid currency: {}", s)),
        }
    }
}

/// Rounds `amount_minor × rate` to whole minor units (banker's rounding).
///
/// Used for the commission split: callers derive the counterpart by
/// subtraction so the two parts always sum to the original amount.
pub fn round_fraction(amount_minor: i64, rate: Decimal) -> i64 {
    (Decimal::from(amount_minor) * rate)
        .round()
        .to_i64()
        .unwrap_or(0)
}
