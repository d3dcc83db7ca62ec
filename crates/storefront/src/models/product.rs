use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use cornershop_core::{CategoryId, ProductId, format_currency};

use super::Category;

/// A catalog product. Read-only at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sku: String,
    pub category_id: Option<CategoryId>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Present when the query embeds `category`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl Product {
    /// Price formatted for display, e.g. `$19.90`.
    #[must_use]
    pub fn display_price(&self) -> String {
        format_currency(self.price)
    }

    /// Short description for listing cards.
    #[must_use]
    pub fn summary(&self) -> String {
        const MAX_CHARS: usize = 120;
        let text = self.description.as_deref().unwrap_or_default().trim();
        if text.chars().count() <= MAX_CHARS {
            return text.to_string();
        }
        let cut: String = text.chars().take(MAX_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}
