//! Persistence client for the storefront.
//!
//! # Database: `cornershop`
//!
//! ## Tables
//!
//! - `categories` - Product categories (`members_only` marks restricted ones)
//! - `products` - Catalog, seeded via `cs-cli seed`
//! - `carts` / `cart_items` - Shopping carts, cart id kept in the session
//! - `orders` / `order_items` - Created by checkout, read-only here apart from status
//! - `addresses` - User shipping addresses
//! - `reviews` - Product reviews
//! - `tower_sessions.session` - Session storage
//!
//! # Backends
//!
//! - [`PgPersistence`] - hosted `PostgreSQL` through `sqlx`
//! - [`MemoryPersistence`] - in-process tables for tests and local runs
//!   without a database
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p cornershop-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;
pub mod query;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use memory::MemoryPersistence;
pub use postgres::PgPersistence;
pub use query::{Delete, Embed, Filter, FilterOp, Insert, Link, OrderBy, Row, Select, Table, Update};

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The query description cannot be executed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Constraint violation (e.g., unique or foreign key).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Table-oriented query interface over the remote store.
///
/// Services receive a `&dyn Persistence` so tests can substitute
/// [`MemoryPersistence`] for the real database.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Run a select and return matching rows with embeds resolved.
    async fn select(&self, query: &Select) -> Result<Vec<Row>, RepositoryError>;

    /// Insert rows and return them as stored (ids and defaults filled in).
    async fn insert(&self, query: &Insert) -> Result<Vec<Row>, RepositoryError>;

    /// Patch matching rows and return them as stored.
    async fn update(&self, query: &Update) -> Result<Vec<Row>, RepositoryError>;

    /// Delete matching rows and return how many were removed.
    async fn delete(&self, query: &Delete) -> Result<u64, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Reject writes that would touch every row of a table.
pub(crate) fn require_filters(
    table: Table,
    filters: &[Filter],
    operation: &str,
) -> Result<(), RepositoryError> {
    if filters.is_empty() {
        return Err(RepositoryError::InvalidQuery(format!(
            "refusing unfiltered {operation} on {table}"
        )));
    }
    Ok(())
}

/// Decode rows into a typed model.
///
/// # Errors
///
/// Returns `RepositoryError::DataCorruption` if a row does not match `T`.
pub fn decode_rows<T: DeserializeOwned>(
    table: Table,
    rows: Vec<Row>,
) -> Result<Vec<T>, RepositoryError> {
    rows.into_iter().map(|row| decode_row(table, row)).collect()
}

/// Decode a single row into a typed model.
///
/// # Errors
///
/// Returns `RepositoryError::DataCorruption` if the row does not match `T`.
pub fn decode_row<T: DeserializeOwned>(table: Table, row: Row) -> Result<T, RepositoryError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid {table} row: {e}"))
    })
}

/// Encode a model as a row for insert or update.
///
/// # Errors
///
/// Returns `RepositoryError::InvalidQuery` if `value` does not serialize to
/// a JSON object.
pub fn encode_row<T: Serialize>(value: &T) -> Result<Row, RepositoryError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(row)) => Ok(row),
        Ok(other) => Err(RepositoryError::InvalidQuery(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(RepositoryError::InvalidQuery(e.to_string())),
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, Serialize, PartialEq)]
    struct Sample {
        id: i32,
        name: String,
    }

    #[test]
    fn test_decode_row_reports_table() {
        let mut row = Row::new();
        row.insert("id".into(), serde_json::json!("not a number"));
        let err = decode_row::<Sample>(Table::Products, row).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
        assert!(err.to_string().contains("invalid products row"));
    }

    #[test]
    fn test_encode_row_requires_object() {
        assert!(encode_row(&5).is_err());
        let row = encode_row(&Sample {
            id: 1,
            name: "a".into(),
        });
        assert!(row.is_ok_and(|r| r.len() == 2));
    }

    #[test]
    fn test_require_filters_rejects_empty() {
        assert!(require_filters(Table::Carts, &[], "delete").is_err());
        assert!(require_filters(Table::Carts, &[Filter::eq("id", 1)], "delete").is_ok());
    }
}
