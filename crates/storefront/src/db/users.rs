//! `PostgreSQL` user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use mercato_core::{Email, UserId};

use super::{RepositoryError, UserStore, map_write_error};
use crate::models::User;

/// Users in `mercato.user`.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, RepositoryError> {
    let email: String = row.try_get("email")?;
    let email = Email::parse(&email)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))?;

    Ok(User {
        id: UserId::new(row.try_get("id")?),
        email,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, created_at, updated_at
            FROM mercato.user
            WHERE email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let password_hash: String = row.try_get("password_hash")?;
        Ok(Some((user_from_row(&row)?, password_hash)))
    }

    async fn create(&self, email: &Email, password_hash: &str) -> Result<User, RepositoryError> {
        let row = sqlx::query(
            r"
            INSERT INTO mercato.user (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, created_at, updated_at
            ",
        )
        .bind(email.as_str())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "email"))?;

        user_from_row(&row)
    }
}
