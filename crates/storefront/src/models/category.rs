use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cornershop_core::CategoryId;

/// A product category.
///
/// Members-only categories are only shown to signed-in visitors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub members_only: bool,
    pub created_at: DateTime<Utc>,
}
