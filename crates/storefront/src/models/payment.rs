//! Payment records.

use chrono::{DateTime, Utc};

use mercato_core::{PaymentStatus, UserId};

/// What the storefront knows about one payment intent.
///
/// Written only from verified processor data: signed webhooks or a direct
/// API lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    /// Processor intent id (`pi_...`).
    pub payment_intent_id: String,
    /// Owner, from the intent's `user_id` metadata.
    pub user_id: Option<UserId>,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
    pub status: PaymentStatus,
    pub updated_at: DateTime<Utc>,
    /// When an order was placed with this payment. Set at most once.
    pub consumed_at: Option<DateTime<Utc>>,
}
