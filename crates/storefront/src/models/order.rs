use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cornershop_core::{OrderId, OrderItemId, OrderStatus, ProductId, UserId, format_currency};

use super::Product;

/// A placed order. Orders are created by checkout outside this application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    #[must_use]
    pub fn display_total(&self) -> String {
        format_currency(self.total)
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// A line of an order, priced at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

impl OrderItem {
    #[must_use]
    pub fn display_unit_price(&self) -> String {
        format_currency(self.unit_price)
    }

    #[must_use]
    pub fn display_line_total(&self) -> String {
        format_currency(self.unit_price * Decimal::from(self.quantity))
    }

    /// Product title, or a placeholder if the product was removed.
    #[must_use]
    pub fn title(&self) -> &str {
        self.product
            .as_ref()
            .map_or("Unavailable product", |p| p.title.as_str())
    }
}
