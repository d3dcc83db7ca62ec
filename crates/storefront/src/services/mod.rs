//! Domain service functions.
//!
//! Each function performs one data operation through the injected
//! [`Persistence`](crate::db::Persistence) client and normalizes the result
//! into `Result<T, ServiceError>`. Failures are logged here; callers only
//! decide how to present them.
//!
//! # Services
//!
//! - `address` - Address book (single default per user)
//! - `cart` - Cart and cart items
//! - `category` - Category reads
//! - `order` - Order history and status changes
//! - `product` - Catalog reads and search
//! - `review` - Product reviews
//! - `auth` - Access token resolution against the hosted auth API
//! - `billing` - Hosted checkout preferences

pub mod address;
pub mod auth;
pub mod billing;
pub mod cart;
pub mod category;
pub mod order;
pub mod product;
pub mod review;

#[cfg(test)]
pub(crate) mod testing;

use thiserror::Error;
use tracing::{error, warn};

use crate::db::{RepositoryError, Row, Table, decode_row};

/// Errors returned by service functions.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// The requested entity does not exist (or is not visible to the caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller-supplied data was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// A bug on our side, such as a query cache entry of the wrong type.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether this error indicates a server-side failure rather than a bad
    /// request.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Repository(_) | Self::Internal(_))
    }

    /// Message safe to show to visitors.
    ///
    /// Persistence details are never exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Repository(RepositoryError::Unavailable(_)) => {
                "We're having trouble reaching the store. Please try again shortly.".to_string()
            }
            Self::Repository(RepositoryError::Conflict(_)) => {
                "That change conflicts with existing data.".to_string()
            }
            Self::Repository(_) | Self::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::NotFound(entity) => {
                let mut chars = entity.chars();
                chars.next().map_or_else(
                    || "Not found.".to_string(),
                    |first| format!("{}{} not found.", first.to_uppercase(), chars.as_str()),
                )
            }
            Self::InvalidInput(msg) => msg.clone(),
            Self::Forbidden => "You can't do that.".to_string(),
        }
    }
}

/// Log failures at the service boundary.
pub(crate) trait Logged<T> {
    fn logged(self, operation: &'static str) -> Result<T, ServiceError>;
}

impl<T, E: Into<ServiceError>> Logged<T> for Result<T, E> {
    fn logged(self, operation: &'static str) -> Result<T, ServiceError> {
        self.map_err(|e| {
            let e = e.into();
            if e.is_server_error() {
                error!(operation, error = %e, "service call failed");
            } else {
                warn!(operation, error = %e, "service call rejected");
            }
            e
        })
    }
}

/// Decode the first returned row, or `None` if nothing matched.
pub(crate) fn first<T: serde::de::DeserializeOwned>(
    table: Table,
    rows: Vec<Row>,
) -> Result<Option<T>, RepositoryError> {
    rows.into_iter().next().map(|row| decode_row(table, row)).transpose()
}

/// Decode the row a write returned.
pub(crate) fn written<T: serde::de::DeserializeOwned>(
    table: Table,
    rows: Vec<Row>,
) -> Result<T, RepositoryError> {
    first(table, rows)?.ok_or_else(|| {
        RepositoryError::DataCorruption(format!("write to {table} returned no row"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_repository_details() {
        let err = ServiceError::Repository(RepositoryError::DataCorruption(
            "invalid orders row: secret".to_string(),
        ));
        assert!(!err.user_message().contains("secret"));
        assert!(err.is_server_error());
    }

    #[test]
    fn test_user_message_for_not_found() {
        assert_eq!(
            ServiceError::NotFound("address").user_message(),
            "Address not found."
        );
    }

    #[test]
    fn test_written_requires_a_row() {
        let err = written::<serde_json::Value>(Table::Carts, Vec::new());
        assert!(matches!(err, Err(RepositoryError::DataCorruption(_))));
    }
}
