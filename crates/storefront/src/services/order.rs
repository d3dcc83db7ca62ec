//! Order history and status changes.
//!
//! Orders are created by the checkout flow outside this application; the
//! storefront only reads them and updates their status.

use tracing::{info, instrument};

use cornershop_core::{OrderId, OrderStatus, UserId};

use super::{Logged, ServiceError, first, written};
use crate::db::{Embed, Persistence, Select, Table, Update, decode_rows, query::row};
use crate::models::Order;

fn with_items(select: Select) -> Select {
    select.embed(
        Embed::has_many("items", Table::OrderItems, "order_id").with(Embed::belongs_to(
            "product",
            Table::Products,
            "product_id",
        )),
    )
}

/// A user's orders with their items, newest first.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_orders(db: &dyn Persistence, user: UserId) -> Result<Vec<Order>, ServiceError> {
    let select = with_items(
        Select::new(Table::Orders)
            .eq("user_id", user)
            .order_by_desc("created_at")
            .order_by_desc("id"),
    );
    let rows = db.select(&select).await.logged("get_orders")?;
    decode_rows(Table::Orders, rows).logged("get_orders")
}

/// A single order with its items.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_order(db: &dyn Persistence, id: OrderId) -> Result<Option<Order>, ServiceError> {
    let select = with_items(Select::new(Table::Orders).eq("id", id).limit(1));
    let rows = db.select(&select).await.logged("get_order")?;
    first(Table::Orders, rows).logged("get_order")
}

/// Set an order's status.
///
/// # Errors
///
/// Returns `ServiceError::NotFound` if the order does not exist and
/// `ServiceError::Repository` if the update fails.
#[instrument(skip(db))]
pub async fn update_order_status(
    db: &dyn Persistence,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, ServiceError> {
    let rows = db
        .update(&Update::new(Table::Orders, row([("status", status.as_str())])).eq("id", id))
        .await
        .logged("update_order_status")?;
    if rows.is_empty() {
        return Err(ServiceError::NotFound("order")).logged("update_order_status");
    }
    info!(order = %id, %status, "order status updated");
    written(Table::Orders, rows).logged("update_order_status")
}

/// Cancel one of `user`'s orders while it is still pending.
///
/// # Errors
///
/// Returns `ServiceError::NotFound` if the order does not exist or belongs
/// to someone else, `ServiceError::InvalidInput` if it can no longer be
/// cancelled, and `ServiceError::Repository` if a query fails.
#[instrument(skip(db))]
pub async fn cancel_order(
    db: &dyn Persistence,
    user: UserId,
    id: OrderId,
) -> Result<Order, ServiceError> {
    let order = get_order(db, id)
        .await?
        .filter(|o| o.user_id == user)
        .ok_or(ServiceError::NotFound("order"))
        .logged("cancel_order")?;

    if !order.status.is_cancellable() {
        return Err(ServiceError::InvalidInput(format!(
            "Orders that are {} can't be cancelled.",
            order.status.label().to_lowercase()
        )))
        .logged("cancel_order");
    }

    update_order_status(db, id, OrderStatus::Cancelled).await
}
