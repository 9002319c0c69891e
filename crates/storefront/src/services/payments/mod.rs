//! Card payments through the payment processor.
//!
//! The browser only ever sees a client secret. Whether a card payment went
//! through is decided here, from data the processor vouched for: a signed
//! webhook already recorded in the [`PaymentStore`], or a fresh lookup of the
//! intent through the [`PaymentGateway`].

pub mod stripe;
pub mod webhook;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use mercato_core::{Cart, CurrencyCode, PaymentStatus, Price, PriceError, UserId};

use crate::db::{PaymentStore, RepositoryError};
use crate::models::PaymentRecord;

pub use stripe::StripeClient;
pub use webhook::{SignatureError, WebhookEvent};

/// Errors from payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Amount is required")]
    AmountRequired,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Amount does not match the cart total")]
    AmountMismatch { expected: i64, actual: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] PriceError),

    #[error("A payment intent is required for card payments")]
    MissingIntent,

    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    #[error("Payment has not succeeded (status: {})", .0.as_str())]
    NotSucceeded(PaymentStatus),

    #[error("Payment does not belong to this user")]
    WrongOwner,

    #[error("Payment already used")]
    AlreadyUsed,

    #[error("invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("invalid webhook payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payment processor error: {0}")]
    Processor(String),

    #[error("payment processor request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A processor payment intent, as returned by its API and inside webhooks.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Owner recorded in the intent's metadata.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata.get("user_id").and_then(|v| v.parse().ok())
    }

    fn to_record(&self) -> PaymentRecord {
        PaymentRecord {
            payment_intent_id: self.id.clone(),
            user_id: self.user_id(),
            amount_minor: self.amount,
            currency: self.currency.to_lowercase(),
            status: self.status,
            updated_at: Utc::now(),
            consumed_at: None,
        }
    }
}

/// Payment processor operations the storefront needs.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a card payment intent tagged with the paying user.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        user_id: UserId,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Fetch the current state of an intent.
    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError>;
}

/// Payment workflows over a gateway and a payment store.
pub struct PaymentService<'a> {
    gateway: &'a dyn PaymentGateway,
    payments: &'a dyn PaymentStore,
    currency: CurrencyCode,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(
        gateway: &'a dyn PaymentGateway,
        payments: &'a dyn PaymentStore,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            gateway,
            payments,
            currency,
        }
    }

    /// Create an intent for `amount`, which must equal the cart subtotal.
    ///
    /// # Errors
    ///
    /// Returns `AmountRequired` for a missing or zero amount, `EmptyCart`,
    /// `AmountMismatch` when the amount differs from the cart subtotal, or
    /// the gateway's error.
    #[instrument(skip(self, cart), fields(user_id = %cart.user_id))]
    pub async fn create_intent(
        &self,
        cart: &Cart,
        amount: Option<Decimal>,
    ) -> Result<PaymentIntent, PaymentError> {
        let amount = amount
            .filter(|a| !a.is_zero())
            .ok_or(PaymentError::AmountRequired)?;
        if cart.is_empty() {
            return Err(PaymentError::EmptyCart);
        }

        let actual = Price::new(amount, self.currency).to_minor_units()?;
        let expected = self.cart_total(cart)?;
        if actual != expected {
            return Err(PaymentError::AmountMismatch { expected, actual });
        }

        let intent = self
            .gateway
            .create_intent(actual, self.currency, cart.user_id)
            .await?;

        // Owner is known from the start, before any webhook arrives
        let mut record = intent.to_record();
        record.user_id = Some(cart.user_id);
        self.payments.record(&record).await?;

        Ok(intent)
    }

    /// Record the intent carried by a verified webhook event.
    ///
    /// Returns the stored record, or `None` for event types that carry no
    /// payment intent.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Repository` if the store fails.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind))]
    pub async fn record_event(
        &self,
        event: &WebhookEvent,
    ) -> Result<Option<PaymentRecord>, PaymentError> {
        let Some(intent) = event.payment_intent() else {
            tracing::debug!("Ignoring webhook event");
            return Ok(None);
        };

        let record = intent.to_record();
        self.payments.record(&record).await?;
        tracing::info!(
            payment_intent_id = %record.payment_intent_id,
            status = record.status.as_str(),
            "Payment intent updated from webhook"
        );
        Ok(Some(record))
    }

    /// Decide whether a card payment settles `cart`.
    ///
    /// The intent must have succeeded, belong to the cart's owner and be for
    /// exactly the cart subtotal in the store currency. A stored record that
    /// has not succeeded yet is refreshed from the processor.
    ///
    /// # Errors
    ///
    /// Returns `WrongOwner`, `NotSucceeded`, `AlreadyUsed` or
    /// `AmountMismatch` when the payment does not settle the cart.
    #[instrument(skip(self, cart), fields(user_id = %cart.user_id))]
    pub async fn verify_card_payment(
        &self,
        cart: &Cart,
        payment_intent_id: &str,
    ) -> Result<PaymentRecord, PaymentError> {
        let stored = self.payments.find(payment_intent_id).await?;

        let record = match stored {
            Some(record) if record.status.is_succeeded() => record,
            stored => {
                let intent = self.gateway.retrieve_intent(payment_intent_id).await?;
                let mut fresh = intent.to_record();
                if let Some(stored) = stored {
                    fresh.user_id = fresh.user_id.or(stored.user_id);
                    fresh.consumed_at = stored.consumed_at;
                }
                self.payments.record(&fresh).await?;
                fresh
            }
        };

        if record.user_id != Some(cart.user_id) {
            tracing::warn!(
                payment_intent_id,
                owner = ?record.user_id,
                "Payment intent presented by another user"
            );
            return Err(PaymentError::WrongOwner);
        }

        if !record.status.is_succeeded() {
            return Err(PaymentError::NotSucceeded(record.status));
        }

        if record.consumed_at.is_some() {
            tracing::warn!(payment_intent_id, "Payment intent presented again");
            return Err(PaymentError::AlreadyUsed);
        }

        let expected = self.cart_total(cart)?;
        if record.amount_minor != expected || record.currency != self.currency_code() {
            return Err(PaymentError::AmountMismatch {
                expected,
                actual: record.amount_minor,
            });
        }

        Ok(record)
    }

    /// Claim a verified payment for one order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyUsed` if another order claimed it first.
    pub async fn consume(&self, payment_intent_id: &str) -> Result<(), PaymentError> {
        if self.payments.consume(payment_intent_id).await? {
            Ok(())
        } else {
            Err(PaymentError::AlreadyUsed)
        }
    }

    fn cart_total(&self, cart: &Cart) -> Result<i64, PaymentError> {
        Ok(Price::new(cart.subtotal(), self.currency).to_minor_units()?)
    }

    fn currency_code(&self) -> String {
        self.currency.code().to_lowercase()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use mercato_core::{NewCartItem, ProductId};

    use super::*;
    use crate::db::InMemoryPaymentStore;

    /// Gateway whose intents are kept in a map the test controls.
    #[derive(Default)]
    struct FakeGateway {
        intents: Mutex<HashMap<String, PaymentIntent>>,
    }

    impl FakeGateway {
        fn set_status(&self, id: &str, status: PaymentStatus) {
            if let Some(intent) = self.intents.lock().unwrap().get_mut(id) {
                intent.status = status;
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_intent(
            &self,
            amount_minor: i64,
            currency: CurrencyCode,
            user_id: UserId,
        ) -> Result<PaymentIntent, PaymentError> {
            let mut intents = self.intents.lock().unwrap();
            let id = format!("pi_{}", intents.len() + 1);
            let intent = PaymentIntent {
                id: id.clone(),
                client_secret: Some(format!("{id}_secret")),
                amount: amount_minor,
                currency: currency.code().to_lowercase(),
                status: PaymentStatus::RequiresPaymentMethod,
                metadata: HashMap::from([("user_id".to_string(), user_id.to_string())]),
            };
            intents.insert(id, intent.clone());
            Ok(intent)
        }

        async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
            self.intents
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| PaymentError::IntentNotFound(id.to_string()))
        }
    }

    fn cart(user: i32) -> Cart {
        let mut cart = Cart::new(UserId::new(user));
        cart.add(NewCartItem {
            product_id: ProductId::new(1),
            title: "Lamp".into(),
            price: Decimal::new(1999, 2),
            thumbnail: String::new(),
            quantity: Some(2),
        })
        .unwrap();
        cart
    }

    fn amount(s: &str) -> Option<Decimal> {
        Some(s.parse().unwrap())
    }

    #[tokio::test]
    async fn create_intent_requires_amount() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);

        assert!(matches!(
            service.create_intent(&cart(1), None).await,
            Err(PaymentError::AmountRequired)
        ));
        assert!(matches!(
            service.create_intent(&cart(1), Some(Decimal::ZERO)).await,
            Err(PaymentError::AmountRequired)
        ));
    }

    #[tokio::test]
    async fn create_intent_checks_cart_total() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);

        let err = service
            .create_intent(&cart(1), amount("1.00"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::AmountMismatch {
                expected: 3998,
                actual: 100
            }
        ));

        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();
        assert_eq!(intent.amount, 3998);
        assert_eq!(intent.user_id(), Some(UserId::new(1)));
        assert!(store.find(&intent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unpaid_intent_is_rejected() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);
        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();

        let err = service
            .verify_card_payment(&cart(1), &intent.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::NotSucceeded(PaymentStatus::RequiresPaymentMethod)
        ));
    }

    #[tokio::test]
    async fn succeeded_intent_is_refreshed_and_accepted() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);
        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();

        gateway.set_status(&intent.id, PaymentStatus::Succeeded);
        let record = service
            .verify_card_payment(&cart(1), &intent.id)
            .await
            .unwrap();

        assert!(record.status.is_succeeded());
        assert!(
            store
                .find(&intent.id)
                .await
                .unwrap()
                .unwrap()
                .status
                .is_succeeded()
        );
    }

    #[tokio::test]
    async fn another_users_intent_is_rejected() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);
        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();
        gateway.set_status(&intent.id, PaymentStatus::Succeeded);

        assert!(matches!(
            service.verify_card_payment(&cart(2), &intent.id).await,
            Err(PaymentError::WrongOwner)
        ));
    }

    #[tokio::test]
    async fn cart_changed_after_payment_is_rejected() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);
        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();
        gateway.set_status(&intent.id, PaymentStatus::Succeeded);

        let mut bigger = cart(1);
        bigger.apply_change(ProductId::new(1), 1).unwrap();

        assert!(matches!(
            service.verify_card_payment(&bigger, &intent.id).await,
            Err(PaymentError::AmountMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn consumed_intent_cannot_settle_another_cart() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);
        let intent = service
            .create_intent(&cart(1), amount("39.98"))
            .await
            .unwrap();
        gateway.set_status(&intent.id, PaymentStatus::Succeeded);

        service
            .verify_card_payment(&cart(1), &intent.id)
            .await
            .unwrap();
        service.consume(&intent.id).await.unwrap();

        assert!(matches!(
            service.verify_card_payment(&cart(1), &intent.id).await,
            Err(PaymentError::AlreadyUsed)
        ));
        assert!(matches!(
            service.consume(&intent.id).await,
            Err(PaymentError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn webhook_event_records_status() {
        let gateway = FakeGateway::default();
        let store = InMemoryPaymentStore::default();
        let service = PaymentService::new(&gateway, &store, CurrencyCode::USD);

        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_webhook",
                "amount": 3998,
                "currency": "usd",
                "status": "succeeded",
                "metadata": {"user_id": "1"}
            }}
        }))
        .unwrap();

        let record = service.record_event(&event).await.unwrap().unwrap();
        assert_eq!(record.user_id, Some(UserId::new(1)));

        // Already succeeded in the store, so no gateway lookup is needed
        let verified = service
            .verify_card_payment(&cart(1), "pi_webhook")
            .await
            .unwrap();
        assert_eq!(verified.amount_minor, 3998);
    }
}
