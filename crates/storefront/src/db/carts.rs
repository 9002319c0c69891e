//! `PostgreSQL` cart store.
//!
//! Each cart is one row holding the whole item list as a JSONB array, the
//! relational equivalent of a per-user document.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use mercato_core::{Cart, CartItem, UserId};

use super::{CartStore, RepositoryError, map_write_error};

/// Carts in `mercato.cart`.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn find(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query("SELECT items FROM mercato.cart WHERE user_id = $1")
            .bind(user_id.as_i32())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(items): Json<Vec<CartItem>> = row.try_get("items").map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid cart items for user {user_id}: {e}"))
        })?;

        Ok(Some(Cart::from_items(user_id, items)))
    }

    async fn save(&self, cart: &Cart) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO mercato.cart (user_id, items)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET
                items = EXCLUDED.items,
                updated_at = NOW()
            ",
        )
        .bind(cart.user_id.as_i32())
        .bind(Json(&cart.items))
        .execute(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "cart"))?;

        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM mercato.cart WHERE user_id = $1")
            .bind(user_id.as_i32())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
