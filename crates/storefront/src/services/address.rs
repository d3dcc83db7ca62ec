//! Address book.
//!
//! A user with at least one address has exactly one default. The first
//! address becomes the default, making another address default clears the
//! flag on the rest, and deleting the default promotes the newest remaining
//! address.

use tracing::{debug, instrument};

use cornershop_core::{AddressId, UserId};

use super::{Logged, ServiceError, first, written};
use crate::db::{
    Delete, Insert, Persistence, Select, Table, Update, decode_rows, encode_row, query::row,
};
use crate::models::{Address, AddressPatch, NewAddress};

/// A user's addresses: the default first, then newest first.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_addresses(
    db: &dyn Persistence,
    user: UserId,
) -> Result<Vec<Address>, ServiceError> {
    let select = Select::new(Table::Addresses)
        .eq("user_id", user)
        .order_by_desc("is_default")
        .order_by_desc("created_at")
        .order_by_desc("id");
    let rows = db.select(&select).await.logged("get_addresses")?;
    decode_rows(Table::Addresses, rows).logged("get_addresses")
}

/// One of `user`'s addresses.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_address(
    db: &dyn Persistence,
    user: UserId,
    id: AddressId,
) -> Result<Option<Address>, ServiceError> {
    let select = Select::new(Table::Addresses)
        .eq("id", id)
        .eq("user_id", user)
        .limit(1);
    let rows = db.select(&select).await.logged("get_address")?;
    first(Table::Addresses, rows).logged("get_address")
}

/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_default_address(
    db: &dyn Persistence,
    user: UserId,
) -> Result<Option<Address>, ServiceError> {
    let select = Select::new(Table::Addresses)
        .eq("user_id", user)
        .eq("is_default", true)
        .limit(1);
    let rows = db.select(&select).await.logged("get_default_address")?;
    first(Table::Addresses, rows).logged("get_default_address")
}

async fn clear_defaults(db: &dyn Persistence, user: UserId) -> Result<(), ServiceError> {
    let cleared = db
        .update(
            &Update::new(Table::Addresses, row([("is_default", false)]))
                .eq("user_id", user)
                .eq("is_default", true),
        )
        .await
        .logged("clear_default_addresses")?;
    debug!(cleared = cleared.len(), "cleared default addresses");
    Ok(())
}

/// Save a new address.
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` if a required field is blank and
/// `ServiceError::Repository` if a query fails.
#[instrument(skip(db, address), fields(user = %address.user_id))]
pub async fn create_address(
    db: &dyn Persistence,
    address: NewAddress,
) -> Result<Address, ServiceError> {
    let details = address
        .details
        .normalized()
        .map_err(ServiceError::InvalidInput)
        .logged("create_address")?;

    let has_default = get_default_address(db, address.user_id).await?.is_some();
    let is_default = address.is_default || !has_default;
    if is_default && has_default {
        clear_defaults(db, address.user_id).await?;
    }

    let new = NewAddress {
        user_id: address.user_id,
        details,
        is_default,
    };
    let row = encode_row(&new).logged("create_address")?;
    let rows = db
        .insert(&Insert::one(Table::Addresses, row))
        .await
        .logged("create_address")?;
    written(Table::Addresses, rows).logged("create_address")
}

/// Overwrite the editable fields of one of `user`'s addresses.
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` if a required field is blank,
/// `ServiceError::NotFound` if `user` has no such address, and
/// `ServiceError::Repository` if the update fails.
#[instrument(skip(db, patch))]
pub async fn update_address(
    db: &dyn Persistence,
    user: UserId,
    id: AddressId,
    patch: AddressPatch,
) -> Result<Address, ServiceError> {
    let patch = patch
        .normalized()
        .map_err(ServiceError::InvalidInput)
        .logged("update_address")?;
    let row = encode_row(&patch).logged("update_address")?;

    let rows = db
        .update(&Update::new(Table::Addresses, row).eq("id", id).eq("user_id", user))
        .await
        .logged("update_address")?;
    if rows.is_empty() {
        return Err(ServiceError::NotFound("address")).logged("update_address");
    }
    written(Table::Addresses, rows).logged("update_address")
}

/// Delete one of `user`'s addresses. Deleting a missing address succeeds.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if a query fails.
#[instrument(skip(db))]
pub async fn delete_address(
    db: &dyn Persistence,
    user: UserId,
    id: AddressId,
) -> Result<(), ServiceError> {
    let Some(existing) = get_address(db, user, id).await? else {
        return Ok(());
    };

    db.delete(&Delete::new(Table::Addresses).eq("id", id).eq("user_id", user))
        .await
        .logged("delete_address")?;

    if existing.is_default
        && let Some(next) = get_addresses(db, user).await?.into_iter().next()
    {
        set_default_address(db, user, next.id).await?;
    }
    Ok(())
}

/// Make one of `user`'s addresses the default.
///
/// # Errors
///
/// Returns `ServiceError::NotFound` if `user` has no such address and
/// `ServiceError::Repository` if a query fails.
#[instrument(skip(db))]
pub async fn set_default_address(
    db: &dyn Persistence,
    user: UserId,
    id: AddressId,
) -> Result<Address, ServiceError> {
    if get_address(db, user, id).await?.is_none() {
        return Err(ServiceError::NotFound("address")).logged("set_default_address");
    }

    clear_defaults(db, user).await?;
    let rows = db
        .update(
            &Update::new(Table::Addresses, row([("is_default", true)]))
                .eq("id", id)
                .eq("user_id", user),
        )
        .await
        .logged("set_default_address")?;
    written(Table::Addresses, rows).logged("set_default_address")
}
