//! Seed the catalog from a YAML file.
//!
//! Categories and products go through the storefront's persistence client,
//! so the same code seeds `PostgreSQL` and the in-memory store used in
//! tests. Rows that already exist (categories by name, products by SKU) are
//! skipped unless `--clear` is given.
//!
//! ```yaml
//! categories:
//!   - name: Coffee
//!     description: Beans and grounds
//!   - name: Members Reserve
//!     members_only: true
//! products:
//!   - title: Dark Roast
//!     price: "12.50"
//!     sku: COF-DARK
//!     category: Coffee
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info};

use cornershop_storefront::db::{
    Delete, Filter, FilterOp, Insert, PgPersistence, Persistence, RepositoryError, Select, Table,
    decode_row, decode_rows, query::row,
};
use cornershop_storefront::models::{Category, Product};

/// Catalog file contents.
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub members_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProductSeed {
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub sku: String,
    /// Category name, resolved against the file and the existing catalog.
    pub category: Option<String>,
    pub image_url: Option<String>,
}

/// Counts reported after seeding.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories_inserted: usize,
    pub products_inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("invalid catalog: {0} problem(s) found")]
    Invalid(usize),

    #[error("unknown category {category:?} for product {sku}")]
    UnknownCategory { sku: String, category: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Check a catalog before touching the database.
///
/// Returns one message per problem; an empty list means the file is usable.
#[must_use]
pub fn validate_catalog(catalog: &Catalog) -> Vec<String> {
    let mut problems = Vec::new();

    let mut names = HashSet::new();
    for category in &catalog.categories {
        if category.name.trim().is_empty() {
            problems.push("category with an empty name".to_string());
        } else if !names.insert(category.name.as_str()) {
            problems.push(format!("duplicate category {:?}", category.name));
        }
    }

    let mut skus = HashSet::new();
    for product in &catalog.products {
        if product.title.trim().is_empty() {
            problems.push(format!("product {} has an empty title", product.sku));
        }
        if product.sku.trim().is_empty() {
            problems.push(format!("product {:?} has an empty SKU", product.title));
        } else if !skus.insert(product.sku.as_str()) {
            problems.push(format!("duplicate SKU {}", product.sku));
        }
        if product.price.is_sign_negative() {
            problems.push(format!("product {} has a negative price", product.sku));
        }
    }

    problems
}

/// Insert the catalog into `db`.
///
/// # Errors
///
/// Returns `SeedError::Invalid` if validation fails, `UnknownCategory` if
/// a product names a category that exists neither in the file nor in the
/// store, and `Repository` for persistence failures.
pub async fn seed_catalog(
    db: &dyn Persistence,
    catalog: &Catalog,
    clear_existing: bool,
) -> Result<SeedSummary, SeedError> {
    let problems = validate_catalog(catalog);
    if !problems.is_empty() {
        for problem in &problems {
            error!("  - {problem}");
        }
        return Err(SeedError::Invalid(problems.len()));
    }

    if clear_existing {
        // Products first; cart items and reviews cascade with them.
        let everything = || Filter::new("id", FilterOp::Gt, 0);
        let products = db.delete(&Delete::new(Table::Products).filter(everything())).await?;
        let categories = db.delete(&Delete::new(Table::Categories).filter(everything())).await?;
        info!(products, categories, "Cleared existing catalog");
    }

    let mut summary = SeedSummary::default();

    let existing: Vec<Category> =
        decode_rows(Table::Categories, db.select(&Select::new(Table::Categories)).await?)?;
    let mut category_ids: HashMap<String, Value> = existing
        .into_iter()
        .map(|c| (c.name, json!(c.id)))
        .collect();

    for seed in &catalog.categories {
        if category_ids.contains_key(&seed.name) {
            summary.skipped += 1;
            continue;
        }
        let inserted = db
            .insert(&Insert::one(
                Table::Categories,
                row([
                    ("name", json!(seed.name)),
                    ("description", json!(seed.description)),
                    ("members_only", json!(seed.members_only)),
                ]),
            ))
            .await?;
        for stored in inserted {
            let category: Category = decode_row(Table::Categories, stored)?;
            category_ids.insert(category.name, json!(category.id));
            summary.categories_inserted += 1;
        }
    }

    let existing: Vec<Product> =
        decode_rows(Table::Products, db.select(&Select::new(Table::Products)).await?)?;
    let known_skus: HashSet<String> = existing.into_iter().map(|p| p.sku).collect();

    let mut rows = Vec::new();
    for seed in &catalog.products {
        if known_skus.contains(&seed.sku) {
            summary.skipped += 1;
            continue;
        }
        let category_id = match &seed.category {
            None => Value::Null,
            Some(name) => category_ids
                .get(name)
                .cloned()
                .ok_or_else(|| SeedError::UnknownCategory {
                    sku: seed.sku.clone(),
                    category: name.clone(),
                })?,
        };
        rows.push(row([
            ("title", json!(seed.title)),
            ("description", json!(seed.description)),
            ("price", json!(seed.price.to_string())),
            ("sku", json!(seed.sku)),
            ("category_id", category_id),
            ("image_url", json!(seed.image_url)),
        ]));
    }

    if !rows.is_empty() {
        let inserted = db
            .insert(&Insert {
                table: Table::Products,
                rows,
            })
            .await?;
        summary.products_inserted = inserted.len();
    }

    Ok(summary)
}

/// Seed the catalog from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog
/// * `clear_existing` - If true, delete existing products and categories first
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the database is
/// not configured, or seeding fails.
pub async fn catalog(file_path: &str, clear_existing: bool) -> Result<(), Box<dyn std::error::Error>> {
    // Verify file exists
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let catalog: Catalog = serde_yaml::from_str(&content)?;

    info!(
        categories = catalog.categories.len(),
        products = catalog.products.len(),
        "Parsed catalog"
    );

    let pool = super::connect().await?;
    let db = PgPersistence::new(pool);

    info!(clear_existing, "Starting seeding process");
    let summary = seed_catalog(&db, &catalog, clear_existing).await?;

    info!("Seeding complete!");
    info!("  Categories inserted: {}", summary.categories_inserted);
    info!("  Products inserted: {}", summary.products_inserted);
    info!("  Skipped (already exist): {}", summary.skipped);

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cornershop_storefront::db::MemoryPersistence;

    use super::*;

    const CATALOG: &str = r#"
categories:
  - name: Coffee
    description: Beans and grounds
  - name: Members Reserve
    members_only: true
products:
  - title: Dark Roast
    price: "12.50"
    sku: COF-DARK
    category: Coffee
  - title: Reserve Blend
    price: "24.00"
    sku: RES-BLEND
    category: Members Reserve
  - title: Gift Card
    price: "25"
    sku: GIFT-25
"#;

    fn parse(yaml: &str) -> Catalog {
        serde_yaml::from_str(yaml).unwrap()
    }

    async fn products(db: &MemoryPersistence) -> Vec<Product> {
        let rows = db.select(&Select::new(Table::Products).order_by("sku")).await.unwrap();
        decode_rows(Table::Products, rows).unwrap()
    }

    #[tokio::test]
    async fn test_seed_inserts_categories_and_products() {
        let db = MemoryPersistence::new();
        let summary = seed_catalog(&db, &parse(CATALOG), false).await.unwrap();

        assert_eq!(
            summary,
            SeedSummary {
                categories_inserted: 2,
                products_inserted: 3,
                skipped: 0,
            }
        );

        let products = products(&db).await;
        let reserve = products.iter().find(|p| p.sku == "RES-BLEND").unwrap();
        assert_eq!(reserve.price, Decimal::new(2400, 2));
        assert!(reserve.category_id.is_some());
        let gift = products.iter().find(|p| p.sku == "GIFT-25").unwrap();
        assert!(gift.category_id.is_none());
    }

    #[tokio::test]
    async fn test_reseeding_skips_existing_rows() {
        let db = MemoryPersistence::new();
        seed_catalog(&db, &parse(CATALOG), false).await.unwrap();
        let summary = seed_catalog(&db, &parse(CATALOG), false).await.unwrap();

        assert_eq!(summary.categories_inserted, 0);
        assert_eq!(summary.products_inserted, 0);
        assert_eq!(summary.skipped, 5);
        assert_eq!(products(&db).await.len(), 3);
    }

    #[tokio::test]
    async fn test_clear_replaces_catalog() {
        let db = MemoryPersistence::new();
        seed_catalog(&db, &parse(CATALOG), false).await.unwrap();

        let replacement = parse(
            r#"
products:
  - title: Tea Sampler
    price: "9.99"
    sku: TEA-SAMPLER
"#,
        );
        let summary = seed_catalog(&db, &replacement, true).await.unwrap();

        assert_eq!(summary.products_inserted, 1);
        let products = products(&db).await;
        assert_eq!(products.len(), 1);
        assert_eq!(products.first().unwrap().sku, "TEA-SAMPLER");
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected() {
        let db = MemoryPersistence::new();
        let catalog = parse(
            r#"
products:
  - title: Mystery
    price: "1.00"
    sku: MYSTERY
    category: Nowhere
"#,
        );

        let err = seed_catalog(&db, &catalog, false).await.unwrap_err();
        assert!(matches!(err, SeedError::UnknownCategory { ref category, .. } if category == "Nowhere"));
    }

    #[test]
    fn test_validate_catalog_reports_problems() {
        let catalog = parse(
            r#"
categories:
  - name: Coffee
  - name: Coffee
products:
  - title: ""
    price: "-1"
    sku: DUP
  - title: Again
    price: "2"
    sku: DUP
"#,
        );

        let problems = validate_catalog(&catalog);
        assert_eq!(problems.len(), 4);
        assert!(problems.iter().any(|p| p.contains("duplicate category")));
        assert!(problems.iter().any(|p| p.contains("duplicate SKU DUP")));
        assert!(problems.iter().any(|p| p.contains("negative price")));
    }

    #[test]
    fn test_seed_file_in_repo_is_valid() {
        let content = include_str!("../../seed/catalog.yaml");
        assert!(validate_catalog(&parse(content)).is_empty());
    }
}
