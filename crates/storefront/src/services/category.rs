//! Category reads.

use tracing::instrument;

use cornershop_core::CategoryId;

use super::{Logged, ServiceError, first};
use crate::db::{Persistence, Select, Table, decode_rows};
use crate::models::Category;

/// All categories ordered by name.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_categories(db: &dyn Persistence) -> Result<Vec<Category>, ServiceError> {
    let rows = db
        .select(&Select::new(Table::Categories).order_by("name"))
        .await
        .logged("get_categories")?;
    decode_rows(Table::Categories, rows).logged("get_categories")
}

/// A single category.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_category(
    db: &dyn Persistence,
    id: CategoryId,
) -> Result<Option<Category>, ServiceError> {
    let rows = db
        .select(&Select::new(Table::Categories).eq("id", id).limit(1))
        .await
        .logged("get_category")?;
    first(Table::Categories, rows).logged("get_category")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::testing::seeded_store;

    #[tokio::test]
    async fn test_categories_sorted_by_name() {
        let store = seeded_store().await;
        let names: Vec<_> = get_categories(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Coffee", "Members Reserve", "Tea"]);
    }

    #[tokio::test]
    async fn test_get_category_missing_is_none() {
        let store = seeded_store().await;
        assert!(get_category(&store, CategoryId::new(404)).await.unwrap().is_none());
        let reserve = get_category(&store, CategoryId::new(3)).await.unwrap().unwrap();
        assert!(reserve.members_only);
    }
}
