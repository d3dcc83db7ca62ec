use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cornershop_core::{CartId, CartItemId, ProductId, UserId, format_currency};

use super::Product;

/// A shopping cart. Guest carts have no `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

impl CartItem {
    /// Unit price times quantity, or zero when the product was not embedded.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.product
            .as_ref()
            .map_or(Decimal::ZERO, |p| p.price * Decimal::from(self.quantity))
    }

    #[must_use]
    pub fn display_line_total(&self) -> String {
        format_currency(self.line_total())
    }
}

/// Sum of line totals.
#[must_use]
pub fn cart_subtotal(items: &[CartItem]) -> Decimal {
    items.iter().map(CartItem::line_total).sum()
}
