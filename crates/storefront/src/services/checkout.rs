//! Checkout flow.
//!
//! The wizard for each shopper lives in their session under
//! [`session_keys::CHECKOUT`]; it is never written to the database. Confirming
//! an order settles the payment, deletes the cart and resets the wizard.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::{CheckoutError, CheckoutStep, CheckoutWizard, PaymentMethod, UserId};

use super::cart::{CartService, CartServiceError};
use super::payments::{PaymentError, PaymentService};
use crate::models::session_keys;

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutServiceError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// `next` was called on the payment step, which only `confirm` may leave.
    #[error("Confirm the order to continue")]
    ConfirmRequired,

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Cart(#[from] CartServiceError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Wizard state plus a summary of the cart it is checking out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    #[serde(flatten)]
    pub wizard: CheckoutWizard,
    pub item_count: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
}

/// A placed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub method: PaymentMethod,
    pub step: CheckoutStep,
}

/// Checkout operations for one session.
pub struct CheckoutService<'a> {
    session: &'a Session,
    carts: CartService<'a>,
    payments: PaymentService<'a>,
    cod_delay: Duration,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        session: &'a Session,
        carts: CartService<'a>,
        payments: PaymentService<'a>,
        cod_delay: Duration,
    ) -> Self {
        Self {
            session,
            carts,
            payments,
            cod_delay,
        }
    }

    /// Current wizard and cart summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or cart store fails.
    pub async fn state(&self, user_id: UserId) -> Result<CheckoutState, CheckoutServiceError> {
        let wizard = load_wizard(self.session).await?;
        let cart = self.carts.get(user_id).await?;
        Ok(CheckoutState {
            wizard,
            item_count: cart.item_count(),
            subtotal: cart.subtotal(),
        })
    }

    /// Store the delivery address.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AlreadyConfirmed` after confirmation.
    pub async fn set_address(&self, address: String) -> Result<CheckoutWizard, CheckoutServiceError> {
        self.update(|wizard| wizard.set_address(address)).await
    }

    /// Store the chosen payment method.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AlreadyConfirmed` after confirmation.
    pub async fn set_payment_method(
        &self,
        method: PaymentMethod,
    ) -> Result<CheckoutWizard, CheckoutServiceError> {
        self.update(|wizard| wizard.set_payment_method(method)).await
    }

    /// Move to the next step.
    ///
    /// # Errors
    ///
    /// Returns the failed guard, or `ConfirmRequired` on the payment step.
    #[instrument(skip(self))]
    pub async fn next(&self, user_id: UserId) -> Result<CheckoutWizard, CheckoutServiceError> {
        let mut wizard = load_wizard(self.session).await?;
        if wizard.step == CheckoutStep::Payment {
            return Err(CheckoutServiceError::ConfirmRequired);
        }

        let cart = self.carts.get(user_id).await?;
        wizard.advance(cart.item_count())?;
        save_wizard(self.session, &wizard).await?;
        Ok(wizard)
    }

    /// Move to the previous step.
    ///
    /// # Errors
    ///
    /// Returns `AtFirstStep` on step 1.
    pub async fn back(&self) -> Result<CheckoutWizard, CheckoutServiceError> {
        self.update(|wizard| wizard.back().map(|_| ())).await
    }

    /// Place the order.
    ///
    /// Cash on delivery waits a fixed delay. Card payments must be verified
    /// with the processor through `payment_intent_id`, and each intent pays
    /// for one order only. On success the cart is deleted and the wizard
    /// reset.
    ///
    /// # Errors
    ///
    /// Returns `NotAtPaymentStep`, `EmptyCart`, or the payment verification
    /// failure. Nothing is changed on error.
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        user_id: UserId,
        payment_intent_id: Option<&str>,
    ) -> Result<Confirmation, CheckoutServiceError> {
        let mut wizard = load_wizard(self.session).await?;
        let method = wizard.clone().confirm()?;

        let cart = self.carts.get(user_id).await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }

        match method {
            PaymentMethod::CashOnDelivery => {
                tokio::time::sleep(self.cod_delay).await;
            }
            PaymentMethod::Card => {
                let id = payment_intent_id
                    .filter(|id| !id.trim().is_empty())
                    .ok_or(PaymentError::MissingIntent)?;
                self.payments.verify_card_payment(&cart, id).await?;
                self.payments.consume(id).await?;
            }
        }

        wizard.confirm()?;
        let step = wizard.step;
        self.carts.clear(user_id).await?;
        reset_wizard(self.session).await?;

        tracing::info!(%user_id, ?method, "Order confirmed");
        Ok(Confirmation { method, step })
    }

    async fn update(
        &self,
        apply: impl FnOnce(&mut CheckoutWizard) -> Result<(), CheckoutError>,
    ) -> Result<CheckoutWizard, CheckoutServiceError> {
        let mut wizard = load_wizard(self.session).await?;
        apply(&mut wizard)?;
        save_wizard(self.session, &wizard).await?;
        Ok(wizard)
    }
}

/// The session's wizard, or a fresh one.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn load_wizard(session: &Session) -> Result<CheckoutWizard, tower_sessions::session::Error> {
    Ok(session
        .get::<CheckoutWizard>(session_keys::CHECKOUT)
        .await?
        .unwrap_or_default())
}

async fn save_wizard(
    session: &Session,
    wizard: &CheckoutWizard,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CHECKOUT, wizard).await
}

/// Put the wizard back at step 1 with no address or payment method.
///
/// # Errors
///
/// Returns an error if the session store fails.
pub async fn reset_wizard(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CheckoutWizard>(session_keys::CHECKOUT)
        .await?;
    Ok(())
}
