//! User domain types.

use chrono::{DateTime, Utc};

use mercato_core::{Email, UserId};

/// A storefront user (domain type).
///
/// The password hash is deliberately not part of this type; stores hand it
/// out separately and only to the auth service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}
