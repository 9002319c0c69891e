//! Prices in decimal arithmetic and their conversion to processor minor units.

use core::fmt;
use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors converting a price for the payment processor.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Negative amounts cannot be charged.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount does not fit the processor's integer range.
    #[error("amount is too large")]
    Overflow,
    /// Unknown ISO 4217 code.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Amount in the smallest currency unit (cents for USD).
    ///
    /// Rounds half away from zero, so `19.995` becomes `2000`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for negative amounts and
    /// `PriceError::Overflow` when the result does not fit in an `i64`.
    pub fn to_minor_units(&self) -> Result<i64, PriceError> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(PriceError::Negative);
        }

        self.amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(PriceError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(PriceError::Overflow)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:.2}",
            self.currency_code.symbol(),
            self.amount.round_dp(2)
        )
    }
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Lowercase code as the payment processor expects it.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
            Self::CAD => "cad",
            Self::AUD => "aud",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }
}

impl FromStr for CurrencyCode {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::USD),
            "eur" => Ok(Self::EUR),
            "gbp" => Ok(Self::GBP),
            "cad" => Ok(Self::CAD),
            "aud" => Ok(Self::AUD),
            other => Err(PriceError::UnsupportedCurrency(other.to_owned())),
        }
    }
}
