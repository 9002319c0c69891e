//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Signup and login with Argon2 password hashes
//! - `cart` - Per-user cart document mutations
//! - `checkout` - Session-held checkout wizard and order confirmation
//! - `payments` - Payment intents, webhook verification, card settlement
//!
//! Services borrow the stores they need and are built per request from
//! [`AppState`](crate::state::AppState).

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod payments;
