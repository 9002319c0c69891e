//! User management commands.
//!
//! # Usage
//!
//! ```bash
//! mercato-cli user create -e shopper@example.com -p 'correct horse battery'
//! ```
//!
//! Accounts go through the same validation and hashing as signups on the
//! storefront.

use thiserror::Error;

use mercato_storefront::db::PgUserStore;
use mercato_storefront::services::auth::{AuthError, AuthService};

use super::{ConnectError, connect};

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Could not create user: {0}")]
    Auth(#[from] AuthError),
}

/// Create a user, returning its id.
pub async fn create(email: &str, password: &str) -> Result<i32, UserError> {
    let pool = connect().await?;
    let users = PgUserStore::new(pool);

    tracing::info!("Creating user: {}", email);
    let user = AuthService::new(&users).signup(email, password).await?;

    tracing::info!("User created successfully! ID: {}, Email: {}", user.id, user.email);
    Ok(user.id.as_i32())
}
