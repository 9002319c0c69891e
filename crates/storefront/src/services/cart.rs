//! Cart service.
//!
//! Every mutation loads the user's cart document, applies the change with
//! the `mercato_core::Cart` rules and saves the whole document back. Nothing
//! serialises two requests for the same user, so concurrent writes can lose
//! an update.

use thiserror::Error;
use tracing::instrument;

use mercato_core::{AddOutcome, Cart, CartError, NewCartItem, ProductId, QuantityChange, UserId};

use crate::db::{CartStore, RepositoryError};

/// Errors returned by the cart service.
#[derive(Debug, Error)]
pub enum CartServiceError {
    /// The user has no stored cart.
    #[error("cart not found")]
    CartNotFound,

    /// The mutation was rejected by the cart rules.
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Cart operations for one store.
pub struct CartService<'a> {
    carts: &'a dyn CartStore,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(carts: &'a dyn CartStore) -> Self {
        Self { carts }
    }

    /// The user's cart, or an empty one when none is stored.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if the store fails.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Cart, CartServiceError> {
        Ok(self
            .carts
            .find(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id)))
    }

    /// Add a product, creating the cart on first use.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Cart` for an invalid quantity or price.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add(
        &self,
        user_id: UserId,
        item: NewCartItem,
    ) -> Result<AddOutcome, CartServiceError> {
        let mut cart = self.get(user_id).await?;
        let outcome = cart.add(item)?;
        self.carts.save(&cart).await?;

        tracing::debug!(?outcome, "Cart line added");
        Ok(outcome)
    }

    /// Change one line's quantity by `change`.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::CartNotFound` when the user has no cart and
    /// `CartError::ItemNotFound` when the product is not in it.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        user_id: UserId,
        product_id: ProductId,
        change: i64,
    ) -> Result<QuantityChange, CartServiceError> {
        let mut cart = self.existing(user_id).await?;
        let outcome = cart.apply_change(product_id, change)?;
        self.carts.save(&cart).await?;
        Ok(outcome)
    }

    /// Remove a product's line. Removing an absent product is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::CartNotFound` when the user has no cart.
    #[instrument(skip(self))]
    pub async fn remove(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, CartServiceError> {
        let mut cart = self.existing(user_id).await?;
        let removed = cart.remove(product_id);
        if removed {
            self.carts.save(&cart).await?;
        }
        Ok(removed)
    }

    /// Delete the user's cart document.
    ///
    /// # Errors
    ///
    /// Returns `CartServiceError::Repository` if the store fails.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<(), CartServiceError> {
        self.carts.delete(user_id).await?;
        Ok(())
    }

    async fn existing(&self, user_id: UserId) -> Result<Cart, CartServiceError> {
        self.carts
            .find(user_id)
            .await?
            .ok_or(CartServiceError::CartNotFound)
    }
}
