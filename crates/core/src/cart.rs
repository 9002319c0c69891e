//! The per-user cart document.
//!
//! A [`Cart`] is an ordered list of line items keyed by user id. Every
//! mutation keeps two invariants:
//!
//! - at most one line per product id
//! - every stored quantity is at least 1
//!
//! Quantity changes that would bring a line to zero or below remove the line
//! instead, so a quantity can never go negative.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, UserId};

/// Errors raised by cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// No line with this product id.
    #[error("item {0} not found in cart")]
    ItemNotFound(ProductId),
    /// A quantity of zero was requested, or a quantity overflowed.
    #[error("quantity must be a positive integer")]
    InvalidQuantity,
    /// Negative unit price.
    #[error("price cannot be negative")]
    InvalidPrice,
}

/// One product entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    pub title: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub thumbnail: String,
    pub quantity: u32,
}

impl CartItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A product as submitted by a client adding it to the cart.
///
/// `quantity` defaults to 1 when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub title: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub quantity: Option<u32>,
}

impl NewCartItem {
    fn requested_quantity(&self) -> Result<u32, CartError> {
        match self.quantity {
            Some(0) => Err(CartError::InvalidQuantity),
            Some(q) => Ok(q),
            None => Ok(1),
        }
    }
}

/// What [`Cart::add`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new line was appended.
    Inserted,
    /// An existing line was incremented to `quantity`.
    Incremented { quantity: u32 },
}

/// What [`Cart::apply_change`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// The line now holds `quantity`.
    Updated { quantity: u32 },
    /// The quantity reached zero or below and the line was dropped.
    Removed,
}

/// The cart document for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
        }
    }

    /// Rebuild a cart from stored line items.
    ///
    /// Lines sharing a product id are merged into the first occurrence
    /// (quantities summed) and zero-quantity lines are dropped, so documents
    /// written by older clients load with the usual invariants.
    #[must_use]
    pub fn from_items(user_id: UserId, items: Vec<CartItem>) -> Self {
        let mut merged: Vec<CartItem> = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity == 0 {
                continue;
            }
            match merged.iter_mut().find(|m| m.product_id == item.product_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => merged.push(item),
            }
        }
        Self {
            user_id,
            items: merged,
        }
    }

    /// Add a product.
    ///
    /// An existing line for the same product is incremented by the requested
    /// quantity; otherwise a new line is appended.
    ///
    /// # Errors
    ///
    /// Returns `CartError::InvalidQuantity` for an explicit quantity of zero
    /// and `CartError::InvalidPrice` for a negative price.
    pub fn add(&mut self, item: NewCartItem) -> Result<AddOutcome, CartError> {
        let quantity = item.requested_quantity()?;
        if item.price.is_sign_negative() && !item.price.is_zero() {
            return Err(CartError::InvalidPrice);
        }

        if let Some(existing) = self.line_mut(item.product_id) {
            existing.quantity = existing
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::InvalidQuantity)?;
            return Ok(AddOutcome::Incremented {
                quantity: existing.quantity,
            });
        }

        self.items.push(CartItem {
            product_id: item.product_id,
            title: item.title,
            price: item.price,
            thumbnail: item.thumbnail,
            quantity,
        });
        Ok(AddOutcome::Inserted)
    }

    /// Add a signed delta to one line's quantity.
    ///
    /// # Errors
    ///
    /// Returns `CartError::ItemNotFound` when no line matches `product_id`,
    /// and `CartError::InvalidQuantity` if the result overflows.
    pub fn apply_change(
        &mut self,
        product_id: ProductId,
        delta: i64,
    ) -> Result<QuantityChange, CartError> {
        let line = self
            .line_mut(product_id)
            .ok_or(CartError::ItemNotFound(product_id))?;

        let next = i64::from(line.quantity).saturating_add(delta);
        if next <= 0 {
            self.remove(product_id);
            return Ok(QuantityChange::Removed);
        }

        line.quantity = u32::try_from(next).map_err(|_| CartError::InvalidQuantity)?;
        Ok(QuantityChange::Updated {
            quantity: line.quantity,
        })
    }

    /// Drop the line for `product_id`. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        self.items.len() != before
    }

    /// Empty the item list.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The line for `product_id`, if present.
    #[must_use]
    pub fn line(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: ProductId) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.product_id == product_id)
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |acc, item| acc.saturating_add(item.quantity))
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: i32, price: &str) -> NewCartItem {
        NewCartItem {
            product_id: ProductId::new(id),
            title: format!("Product {id}"),
            price: price.parse().unwrap(),
            thumbnail: format!("https://cdn.example.com/{id}.webp"),
            quantity: None,
        }
    }

    fn cart() -> Cart {
        Cart::new(UserId::new(1))
    }

    #[test]
    fn adding_same_product_twice_increments_one_line() {
        let mut cart = cart();
        assert_eq!(cart.add(product(5, "9.99")), Ok(AddOutcome::Inserted));
        assert_eq!(
            cart.add(product(5, "9.99")),
            Ok(AddOutcome::Incremented { quantity: 2 })
        );

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.line(ProductId::new(5)).unwrap().quantity, 2);
    }

    #[test]
    fn add_honours_requested_quantity() {
        let mut cart = cart();
        let mut item = product(1, "2.50");
        item.quantity = Some(3);
        cart.add(item).unwrap();
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn add_rejects_zero_quantity_and_negative_price() {
        let mut cart = cart();
        let mut zero = product(1, "1");
        zero.quantity = Some(0);
        assert_eq!(cart.add(zero), Err(CartError::InvalidQuantity));
        assert_eq!(cart.add(product(2, "-1")), Err(CartError::InvalidPrice));
        assert!(cart.is_empty());
    }

    #[test]
    fn decrementing_to_zero_removes_the_line() {
        let mut cart = cart();
        cart.add(product(7, "4")).unwrap();

        assert_eq!(
            cart.apply_change(ProductId::new(7), -1),
            Ok(QuantityChange::Removed)
        );
        assert!(cart.line(ProductId::new(7)).is_none());
    }

    #[test]
    fn large_negative_delta_removes_instead_of_going_negative() {
        let mut cart = cart();
        let mut item = product(7, "4");
        item.quantity = Some(2);
        cart.add(item).unwrap();

        assert_eq!(
            cart.apply_change(ProductId::new(7), -10),
            Ok(QuantityChange::Removed)
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn positive_delta_is_not_clamped() {
        let mut cart = cart();
        cart.add(product(3, "1")).unwrap();
        assert_eq!(
            cart.apply_change(ProductId::new(3), 41),
            Ok(QuantityChange::Updated { quantity: 42 })
        );
    }

    #[test]
    fn change_on_missing_item_fails() {
        let mut cart = cart();
        assert_eq!(
            cart.apply_change(ProductId::new(9), 1),
            Err(CartError::ItemNotFound(ProductId::new(9)))
        );
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let mut cart = cart();
        cart.add(product(1, "1")).unwrap();
        cart.add(product(2, "1")).unwrap();

        assert!(cart.remove(ProductId::new(1)));
        assert!(!cart.remove(ProductId::new(1)));
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn clear_empties_every_line() {
        let mut cart = cart();
        for id in 1..=4 {
            cart.add(product(id, "1")).unwrap();
        }
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.item_count(), 0);
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let mut cart = cart();
        let mut item = product(1, "9.99");
        item.quantity = Some(2);
        cart.add(item).unwrap();
        cart.add(product(2, "0.02")).unwrap();

        assert_eq!(cart.subtotal(), "20.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn from_items_merges_duplicate_lines() {
        let line = |id: i32, quantity: u32| CartItem {
            product_id: ProductId::new(id),
            title: "t".into(),
            price: Decimal::ONE,
            thumbnail: String::new(),
            quantity,
        };

        let cart = Cart::from_items(
            UserId::new(1),
            vec![line(1, 1), line(2, 1), line(1, 2), line(3, 0)],
        );

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.line(ProductId::new(1)).unwrap().quantity, 3);
        assert!(cart.line(ProductId::new(3)).is_none());
    }

    #[test]
    fn json_uses_camel_case_and_numeric_prices() {
        let mut cart = cart();
        cart.add(product(5, "9.99")).unwrap();

        let json = serde_json::to_value(&cart).unwrap();
        assert_eq!(json["userId"], 1);
        assert_eq!(json["items"][0]["productId"], 5);
        assert_eq!(json["items"][0]["price"], 9.99);
        assert_eq!(json["items"][0]["quantity"], 1);

        let back: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(back, cart);
    }
}
