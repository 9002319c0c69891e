//! Domain models for storefront.
//!
//! Types here are storefront-specific; cart and checkout types live in
//! `mercato-core`.

pub mod payment;
pub mod session;
pub mod user;

pub use payment::PaymentRecord;
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
