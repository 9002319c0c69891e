//! Cart inspection commands.
//!
//! # Usage
//!
//! ```bash
//! mercato-cli cart show -u 42
//! ```

use thiserror::Error;

use mercato_core::UserId;
use mercato_storefront::db::{CartStore, PgCartStore, RepositoryError};

use super::{ConnectError, connect};

#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Could not load cart: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not encode cart: {0}")]
    Json(#[from] serde_json::Error),
}

/// Print the stored cart for `user_id` as JSON.
pub async fn show(user_id: i32) -> Result<(), CartError> {
    let pool = connect().await?;
    let carts = PgCartStore::new(pool);
    let user_id = UserId::new(user_id);

    let Some(cart) = carts.find(user_id).await? else {
        tracing::info!("User {} has no cart", user_id);
        return Ok(());
    };

    tracing::info!(
        "Cart for user {}: {} items, subtotal {}",
        user_id,
        cart.item_count(),
        cart.subtotal()
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&cart)?);
    }
    Ok(())
}
