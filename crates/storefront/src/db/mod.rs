//! Persistence for the storefront.
//!
//! # Database: `mercato`
//!
//! ## Tables
//!
//! - `mercato.user` - Accounts (email + Argon2 password hash)
//! - `mercato.cart` - One cart document per user, items stored as JSONB
//! - `mercato.payment` - Webhook-verified payment intent statuses
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! Handlers never talk to `sqlx` directly: they go through the [`UserStore`],
//! [`CartStore`] and [`PaymentStore`] traits, which have `PostgreSQL`
//! implementations for the server and in-memory ones in [`memory`] for tests
//! and local runs.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p mercato-cli -- migrate
//! ```

pub mod carts;
pub mod memory;
pub mod payments;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use mercato_core::{Cart, Email, UserId};

use crate::models::{PaymentRecord, User};

pub use carts::PgCartStore;
pub use memory::{InMemoryCartStore, InMemoryPaymentStore, InMemoryUserStore};
pub use payments::PgPaymentStore;
pub use users::PgUserStore;

/// Errors raised by the stores.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored data could not be turned back into a domain value.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Account storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user and their password hash by email.
    async fn find_by_email(&self, email: &Email)
    -> Result<Option<(User, String)>, RepositoryError>;

    /// Insert a new user.
    ///
    /// Returns `RepositoryError::Conflict` when the email is taken.
    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError>;
}

/// Cart document storage, keyed by user id.
///
/// Writes replace the whole document; there is no locking between a load
/// and the following save.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Load the cart for `user_id`.
    async fn find(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Insert or replace the cart document.
    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError>;

    /// Delete the cart document. Returns whether one existed.
    async fn delete(&self, user_id: UserId) -> Result<bool, RepositoryError>;

    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Verified payment intent storage.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert or update the record for an intent.
    async fn record(&self, payment: &PaymentRecord) -> Result<(), RepositoryError>;

    /// Look up the record for an intent.
    async fn find(&self, payment_intent_id: &str)
    -> Result<Option<PaymentRecord>, RepositoryError>;

    /// Mark an intent as used by an order.
    ///
    /// Returns `false` when it was already used or is unknown. Of two
    /// concurrent calls for the same intent, at most one returns `true`.
    async fn consume(&self, payment_intent_id: &str) -> Result<bool, RepositoryError>;
}

/// The set of stores the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub carts: Arc<dyn CartStore>,
    pub payments: Arc<dyn PaymentStore>,
}

impl Stores {
    /// `PostgreSQL`-backed stores sharing one pool.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            carts: Arc::new(PgCartStore::new(pool.clone())),
            payments: Arc::new(PgPaymentStore::new(pool.clone())),
        }
    }

}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map unique and foreign-key violations to their repository errors.
pub(crate) fn map_write_error(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            return RepositoryError::Conflict(format!("{what} already exists"));
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound(format!("{what} references a missing row"));
        }
    }
    RepositoryError::Database(err)
}
