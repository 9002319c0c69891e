//! In-memory stores.
//!
//! Used by the test suites and handy for running the API without a database.
//! They follow the same contracts as the `PostgreSQL` stores, including the
//! unique email constraint.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use mercato_core::{Cart, Email, UserId};

use super::{CartStore, PaymentStore, RepositoryError, UserStore};
use crate::models::{PaymentRecord, User};

#[derive(Default)]
struct UserTable {
    next_id: i32,
    rows: Vec<(User, String)>,
}

/// Users held in a vector behind a lock.
#[derive(Default)]
pub struct InMemoryUserStore {
    table: RwLock<UserTable>,
}

impl InMemoryUserStore {
    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Whether no user has been stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .find(|(user, _)| &user.email == email)
            .cloned())
    }

    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError> {
        let mut table = self.table.write().await;
        if table.rows.iter().any(|(user, _)| &user.email == email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        table.next_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId::new(table.next_id),
            email: email.clone(),
            created_at: now,
            updated_at: now,
        };
        table.rows.push((user.clone(), password_hash.to_owned()));
        Ok(user)
    }
}

/// Cart documents in a map keyed by user id.
#[derive(Default)]
pub struct InMemoryCartStore {
    carts: RwLock<HashMap<UserId, Cart>>,
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn find(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError> {
        self.carts.write().await.insert(cart.user_id, cart.clone());
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.carts.write().await.remove(&user_id).is_some())
    }
}

/// Payment records in a map keyed by intent id.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: RwLock<HashMap<String, PaymentRecord>>,
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn record(&self, payment: &PaymentRecord) -> Result<(), RepositoryError> {
        let mut payments = self.payments.write().await;
        let mut next = payment.clone();
        if let Some(existing) = payments.get(&payment.payment_intent_id) {
            next.user_id = existing.user_id.or(payment.user_id);
            next.consumed_at = existing.consumed_at;
            if existing.status.is_succeeded() {
                next.status = existing.status;
            }
        }
        payments.insert(next.payment_intent_id.clone(), next);
        Ok(())
    }

    async fn find(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        Ok(self.payments.read().await.get(payment_intent_id).cloned())
    }

    async fn consume(&self, payment_intent_id: &str) -> Result<bool, RepositoryError> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(payment_intent_id) {
            Some(record) if record.consumed_at.is_none() => {
                record.consumed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mercato_core::{NewCartItem, PaymentStatus, ProductId};
    use rust_decimal::Decimal;

    use super::*;

    fn email(s: &str) -> Email {
        Email::parse(s).unwrap()
    }

    #[tokio::test]
    async fn user_emails_are_unique() {
        let store = InMemoryUserStore::default();
        store.create(&email("a@shop.test"), "hash").await.unwrap();
        let second = store.create(&email("a@shop.test"), "other").await;

        assert!(matches!(second, Err(RepositoryError::Conflict(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn user_ids_are_sequential() {
        let store = InMemoryUserStore::default();
        let a = store.create(&email("a@shop.test"), "h").await.unwrap();
        let b = store.create(&email("b@shop.test"), "h").await.unwrap();
        assert_eq!(a.id, UserId::new(1));
        assert_eq!(b.id, UserId::new(2));

        let (found, hash) = store
            .find_by_email(&email("b@shop.test"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.id);
        assert_eq!(hash, "h");
    }

    #[tokio::test]
    async fn cart_save_replaces_document() {
        let store = InMemoryCartStore::default();
        let user = UserId::new(3);
        let mut cart = Cart::new(user);
        cart.add(NewCartItem {
            product_id: ProductId::new(1),
            title: "Mug".into(),
            price: Decimal::new(1250, 2),
            thumbnail: String::new(),
            quantity: None,
        })
        .unwrap();

        store.save(&cart).await.unwrap();
        cart.clear();
        store.save(&cart).await.unwrap();

        assert!(store.find(user).await.unwrap().unwrap().is_empty());
        assert!(store.delete(user).await.unwrap());
        assert!(!store.delete(user).await.unwrap());
        assert!(store.find(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn payment_owner_survives_later_events() {
        let store = InMemoryPaymentStore::default();
        let mut record = PaymentRecord {
            payment_intent_id: "pi_1".into(),
            user_id: Some(UserId::new(1)),
            amount_minor: 1999,
            currency: "usd".into(),
            status: PaymentStatus::Processing,
            updated_at: Utc::now(),
            consumed_at: None,
        };
        store.record(&record).await.unwrap();

        record.user_id = None;
        record.status = PaymentStatus::Succeeded;
        store.record(&record).await.unwrap();

        let stored = store.find("pi_1").await.unwrap().unwrap();
        assert_eq!(stored.user_id, Some(UserId::new(1)));
        assert!(stored.status.is_succeeded());

        record.status = PaymentStatus::Processing;
        store.record(&record).await.unwrap();
        assert!(store.find("pi_1").await.unwrap().unwrap().status.is_succeeded());
    }

    #[tokio::test]
    async fn payment_is_consumed_once() {
        let store = InMemoryPaymentStore::default();
        assert!(!store.consume("pi_missing").await.unwrap());

        store
            .record(&PaymentRecord {
                payment_intent_id: "pi_2".into(),
                user_id: Some(UserId::new(1)),
                amount_minor: 500,
                currency: "usd".into(),
                status: PaymentStatus::Succeeded,
                updated_at: Utc::now(),
                consumed_at: None,
            })
            .await
            .unwrap();

        assert!(store.consume("pi_2").await.unwrap());
        assert!(!store.consume("pi_2").await.unwrap());

        // A later webhook does not free the intent again
        let mut again = store.find("pi_2").await.unwrap().unwrap();
        again.consumed_at = None;
        store.record(&again).await.unwrap();
        assert!(store.find("pi_2").await.unwrap().unwrap().consumed_at.is_some());
    }
}
