//! `PostgreSQL` payment store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use mercato_core::{PaymentStatus, UserId};

use super::{PaymentStore, RepositoryError};
use crate::models::PaymentRecord;

/// Payment intents in `mercato.payment`.
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn record(&self, payment: &PaymentRecord) -> Result<(), RepositoryError> {
        // The owner never changes once known; a later event without metadata
        // keeps it. A succeeded intent stays succeeded and `consumed_at` is
        // only ever written by `consume`.
        sqlx::query(
            r"
            INSERT INTO mercato.payment
                (payment_intent_id, user_id, amount_minor, currency, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (payment_intent_id)
            DO UPDATE SET
                user_id = COALESCE(mercato.payment.user_id, EXCLUDED.user_id),
                amount_minor = EXCLUDED.amount_minor,
                currency = EXCLUDED.currency,
                status = CASE
                    WHEN mercato.payment.status = 'succeeded' THEN mercato.payment.status
                    ELSE EXCLUDED.status
                END,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&payment.payment_intent_id)
        .bind(payment.user_id.map(|id| id.as_i32()))
        .bind(payment.amount_minor)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT payment_intent_id, user_id, amount_minor, currency, status, updated_at,
                   consumed_at
            FROM mercato.payment
            WHERE payment_intent_id = $1
            ",
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        Ok(Some(PaymentRecord {
            payment_intent_id: row.try_get("payment_intent_id")?,
            user_id: row.try_get::<Option<i32>, _>("user_id")?.map(UserId::new),
            amount_minor: row.try_get("amount_minor")?,
            currency: row.try_get("currency")?,
            status: PaymentStatus::from_wire(&status),
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            consumed_at: row.try_get::<Option<DateTime<Utc>>, _>("consumed_at")?,
        }))
    }

    async fn consume(&self, payment_intent_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE mercato.payment
            SET consumed_at = NOW()
            WHERE payment_intent_id = $1 AND consumed_at IS NULL
            ",
        )
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
