//! The checkout wizard.
//!
//! A linear four-step flow: cart review, address entry, payment method
//! selection, confirmation. The wizard only tracks where the shopper is and
//! what they typed; it never touches the cart or the payment processor.
//! Callers pass in the cart size when advancing and decide themselves when a
//! payment is good enough to [`confirm`](CheckoutWizard::confirm).

use serde::{Deserialize, Serialize};

/// Reasons a wizard transition is refused.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("Your cart is empty")]
    EmptyCart,
    #[error("Please enter a delivery address")]
    BlankAddress,
    #[error("Please select a payment method")]
    NoPaymentMethod,
    #[error("This order has already been confirmed")]
    AlreadyConfirmed,
    #[error("Checkout is not at the payment step")]
    NotAtPaymentStep,
    #[error("Already at the first step")]
    AtFirstStep,
}

/// Wizard step. Serialises as its number (1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum CheckoutStep {
    #[default]
    Cart,
    Address,
    Payment,
    Confirmed,
}

impl CheckoutStep {
    /// Step number as shown to the shopper.
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Cart => 1,
            Self::Address => 2,
            Self::Payment => 3,
            Self::Confirmed => 4,
        }
    }

    /// Step for a number, if in range.
    #[must_use]
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Cart),
            2 => Some(Self::Address),
            3 => Some(Self::Payment),
            4 => Some(Self::Confirmed),
            _ => None,
        }
    }

    const fn previous(self) -> Option<Self> {
        match self {
            Self::Cart | Self::Confirmed => None,
            Self::Address => Some(Self::Cart),
            Self::Payment => Some(Self::Address),
        }
    }
}

impl Serialize for CheckoutStep {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for CheckoutStep {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let n = u8::deserialize(deserializer)?;
        Self::from_number(n)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid checkout step {n}")))
    }
}

/// How the shopper pays.
///
/// Wire names are the values the storefront client has always sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "COD")]
    CashOnDelivery,
    #[serde(rename = "Stripe")]
    Card,
}

/// Checkout progress for one shopper.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutWizard {
    pub step: CheckoutStep,
    pub address: String,
    pub payment_method: Option<PaymentMethod>,
}

impl CheckoutWizard {
    /// A wizard at step 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the delivery address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AlreadyConfirmed` after confirmation.
    pub fn set_address(&mut self, address: impl Into<String>) -> Result<(), CheckoutError> {
        self.ensure_open()?;
        self.address = address.into();
        Ok(())
    }

    /// Choose a payment method.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AlreadyConfirmed` after confirmation.
    pub fn set_payment_method(&mut self, method: PaymentMethod) -> Result<(), CheckoutError> {
        self.ensure_open()?;
        self.payment_method = Some(method);
        Ok(())
    }

    /// Move one step forward.
    ///
    /// Leaving the cart step needs at least one item, leaving the address
    /// step needs a non-blank address and leaving the payment step needs a
    /// payment method.
    ///
    /// # Errors
    ///
    /// Returns the guard that failed, or `AlreadyConfirmed` at the last step.
    pub fn advance(&mut self, cart_item_count: u32) -> Result<CheckoutStep, CheckoutError> {
        self.step = match self.step {
            CheckoutStep::Cart if cart_item_count == 0 => return Err(CheckoutError::EmptyCart),
            CheckoutStep::Cart => CheckoutStep::Address,
            CheckoutStep::Address if self.address.trim().is_empty() => {
                return Err(CheckoutError::BlankAddress);
            }
            CheckoutStep::Address => CheckoutStep::Payment,
            CheckoutStep::Payment if self.payment_method.is_none() => {
                return Err(CheckoutError::NoPaymentMethod);
            }
            CheckoutStep::Payment => CheckoutStep::Confirmed,
            CheckoutStep::Confirmed => return Err(CheckoutError::AlreadyConfirmed),
        };
        Ok(self.step)
    }

    /// Move one step back.
    ///
    /// # Errors
    ///
    /// Returns `AtFirstStep` at step 1 and `AlreadyConfirmed` once confirmed.
    pub fn back(&mut self) -> Result<CheckoutStep, CheckoutError> {
        self.ensure_open()?;
        self.step = self.step.previous().ok_or(CheckoutError::AtFirstStep)?;
        Ok(self.step)
    }

    /// Enter the confirmed step once payment has been settled.
    ///
    /// # Errors
    ///
    /// Returns `NotAtPaymentStep` unless the wizard is at step 3 with a
    /// payment method chosen.
    pub fn confirm(&mut self) -> Result<PaymentMethod, CheckoutError> {
        self.ensure_open()?;
        if self.step != CheckoutStep::Payment {
            return Err(CheckoutError::NotAtPaymentStep);
        }
        let method = self.payment_method.ok_or(CheckoutError::NoPaymentMethod)?;
        self.step = CheckoutStep::Confirmed;
        Ok(method)
    }

    /// Start over: step 1, no address, no payment method.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether the order has been confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.step == CheckoutStep::Confirmed
    }

    const fn ensure_open(&self) -> Result<(), CheckoutError> {
        match self.step {
            CheckoutStep::Confirmed => Err(CheckoutError::AlreadyConfirmed),
            _ => Ok(()),
        }
    }
}
