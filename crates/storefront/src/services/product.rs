//! Catalog reads and search.

use tracing::instrument;

use cornershop_core::{CategoryId, ProductId};

use super::{Logged, ServiceError, first};
use crate::db::{Embed, Filter, Persistence, Select, Table, decode_rows};
use crate::models::Product;

/// Listing options. Every field is optional; the default lists everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub category: Option<CategoryId>,
    /// Case-insensitive substring match on the title.
    pub search: Option<String>,
    pub limit: Option<u32>,
}

impl ProductQuery {
    #[must_use]
    pub fn in_category(category: CategoryId) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    /// Search term with `LIKE` wildcards escaped, or `None` if blank.
    #[must_use]
    pub fn search_term(&self) -> Option<String> {
        let term = self.search.as_deref()?.trim();
        if term.is_empty() {
            return None;
        }
        let mut escaped = String::with_capacity(term.len());
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        Some(escaped)
    }
}

/// Products matching `query`, ordered by title.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_products(
    db: &dyn Persistence,
    query: &ProductQuery,
) -> Result<Vec<Product>, ServiceError> {
    let mut select = Select::new(Table::Products).order_by("title").order_by("id");
    if let Some(category) = query.category {
        select = select.eq("category_id", category);
    }
    if let Some(term) = query.search_term() {
        select = select.filter(Filter::ilike("title", format!("%{term}%")));
    }
    if let Some(limit) = query.limit {
        select = select.limit(limit);
    }

    let rows = db.select(&select).await.logged("get_products")?;
    decode_rows(Table::Products, rows).logged("get_products")
}

/// A single product with its category.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_product(
    db: &dyn Persistence,
    id: ProductId,
) -> Result<Option<Product>, ServiceError> {
    let select = Select::new(Table::Products)
        .eq("id", id)
        .embed(Embed::belongs_to("category", Table::Categories, "category_id"))
        .limit(1);
    let rows = db.select(&select).await.logged("get_product")?;
    first(Table::Products, rows).logged("get_product")
}

/// Products in one category, ordered by title.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
pub async fn get_products_by_category(
    db: &dyn Persistence,
    category: CategoryId,
) -> Result<Vec<Product>, ServiceError> {
    get_products(db, &ProductQuery::in_category(category)).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::{Insert, query::row};
    use crate::services::testing::seeded_store;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let store = seeded_store().await;
        let query = ProductQuery {
            search: Some("ROAST".to_string()),
            ..ProductQuery::default()
        };
        let titles: Vec<_> = get_products(&store, &query)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Dark Roast", "Light Roast"]);
    }

    #[test]
    fn test_search_term_escapes_wildcards() {
        let term = |search: &str| {
            ProductQuery {
                search: Some(search.to_string()),
                ..ProductQuery::default()
            }
            .search_term()
        };
        assert_eq!(term("  50% off "), Some("50\\% off".to_string()));
        assert_eq!(term("a_b\\c"), Some("a\\_b\\\\c".to_string()));
        assert_eq!(term("   "), None);
        assert_eq!(ProductQuery::default().search_term(), None);
    }

    #[tokio::test]
    async fn test_wildcards_in_search_are_literal_text() {
        let store = seeded_store().await;
        store
            .insert(&Insert::one(
                Table::Products,
                row([
                    ("title", json!("50% Off Sampler")),
                    ("price", json!("5.00")),
                    ("sku", json!("SAMPLER-50")),
                ]),
            ))
            .await
            .unwrap();
        store
            .insert(&Insert::one(
                Table::Products,
                row([
                    ("title", json!("Blend 501")),
                    ("price", json!("9.00")),
                    ("sku", json!("BLEND-501")),
                ]),
            ))
            .await
            .unwrap();

        let search = |q: &str| ProductQuery {
            search: Some(q.to_string()),
            ..ProductQuery::default()
        };
        let titles: Vec<_> = get_products(&store, &search("50%"))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["50% Off Sampler"]);

        assert!(get_products(&store, &search("R_ast")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_products_by_category_and_limit() {
        let store = seeded_store().await;
        let tea = get_products_by_category(&store, CategoryId::new(2)).await.unwrap();
        assert!(tea.iter().all(|p| p.category_id == Some(CategoryId::new(2))));
        assert_eq!(tea.len(), 1);

        let limited = get_products(
            &store,
            &ProductQuery {
                limit: Some(2),
                ..ProductQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_get_product_embeds_category() {
        let store = seeded_store().await;
        let product = get_product(&store, ProductId::new(1)).await.unwrap().unwrap();
        assert_eq!(product.category.clone().map(|c| c.name), Some("Coffee".to_string()));
        assert_eq!(product.display_price(), "$12.50");

        assert!(get_product(&store, ProductId::new(99)).await.unwrap().is_none());
    }
}
