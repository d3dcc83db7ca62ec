use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use cornershop_core::{ProductId, Rating, ReviewId, UserId};

/// A product review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    #[must_use]
    pub fn author(&self) -> &str {
        self.author_name.as_deref().unwrap_or("Anonymous")
    }

    /// Filled and empty stars, e.g. `★★★☆☆`.
    #[must_use]
    pub fn stars(&self) -> String {
        let filled = usize::from(self.rating.get());
        format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
    }
}

/// A review to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub author_name: Option<String>,
}

/// Changes to a review. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Aggregate rating for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatingSummary {
    pub count: usize,
    /// Mean rating rounded to one decimal place; `None` without reviews.
    pub average: Option<Decimal>,
}

impl RatingSummary {
    #[must_use]
    pub fn from_reviews(reviews: &[Review]) -> Self {
        if reviews.is_empty() {
            return Self::default();
        }
        let total: Decimal = reviews
            .iter()
            .map(|r| Decimal::from(r.rating.get()))
            .sum();
        let average = (total / Decimal::from(reviews.len()))
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        Self {
            count: reviews.len(),
            average: Some(average),
        }
    }

    #[must_use]
    pub fn display_average(&self) -> String {
        self.average.map_or_else(|| "No ratings yet".to_string(), |a| format!("{a:.1} / 5"))
    }
}
