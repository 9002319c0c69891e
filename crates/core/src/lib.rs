//! Mercato Core - domain types for the storefront.
//!
//! This crate holds everything about carts, checkout and payments that can be
//! expressed without I/O:
//!
//! - [`types`] - Newtype ids, email addresses, prices and payment statuses
//! - [`cart`] - The per-user cart document and its quantity reconciliation
//! - [`checkout`] - The step-indexed checkout wizard
//!
//! The `storefront` crate persists these types and exposes them over HTTP;
//! nothing here touches a database or the network.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod checkout;
pub mod types;

pub use cart::{AddOutcome, Cart, CartError, CartItem, NewCartItem, QuantityChange};
pub use checkout::{CheckoutError, CheckoutStep, CheckoutWizard, PaymentMethod};
pub use types::*;
