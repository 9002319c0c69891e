//! Payment intent status as reported by the payment processor.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a processor payment intent.
///
/// Only [`PaymentStatus::Succeeded`] means money has been collected. Any
/// status the processor adds later deserialises as `Unknown` rather than
/// failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Whether the payment has been collected.
    #[must_use]
    pub const fn is_succeeded(self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Wire name, as stored in the `payment` table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored wire name; unrecognised names map to `Unknown`.
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "processing" => Self::Processing,
            "requires_capture" => Self::RequiresCapture,
            "canceled" => Self::Canceled,
            "succeeded" => Self::Succeeded,
            _ => Self::Unknown,
        }
    }
}
