//! CLI subcommands.

pub mod migrate;
pub mod seed;

use cornershop_storefront::config::StorefrontConfig;
use cornershop_storefront::db;
use sqlx::PgPool;

/// Connect to the storefront database named by `STOREFRONT_DATABASE_URL`
/// (or `DATABASE_URL`).
///
/// # Errors
///
/// Returns an error if the configuration is invalid, no database is
/// configured, or the connection fails.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let config = StorefrontConfig::from_env()?;
    let database_url = config
        .database_url
        .ok_or("STOREFRONT_DATABASE_URL not set")?;

    tracing::info!("Connecting to storefront database...");
    Ok(db::create_pool(&database_url).await?)
}
