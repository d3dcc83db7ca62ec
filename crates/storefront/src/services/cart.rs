//! Cart and cart item operations.
//!
//! A cart holds at most one line per product; adding a product that is
//! already present increments that line instead of inserting a new one.

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use cornershop_core::{CartId, CartItemId, ProductId, UserId};

use super::{Logged, ServiceError, first, product, written};
use crate::db::{Delete, Embed, Insert, Persistence, Select, Table, Update, decode_rows, query::row};
use crate::models::{Cart, CartItem};

/// Largest quantity a single cart line may hold.
pub const MAX_QUANTITY: i32 = 99;

/// Create an empty cart, optionally owned by a signed-in user.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the insert fails.
#[instrument(skip(db))]
pub async fn create_cart(db: &dyn Persistence, user: Option<UserId>) -> Result<Cart, ServiceError> {
    let user_id = user.map_or(serde_json::Value::Null, Into::into);
    let rows = db
        .insert(&Insert::one(Table::Carts, row([("user_id", user_id)])))
        .await
        .logged("create_cart")?;
    written(Table::Carts, rows).logged("create_cart")
}

/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_cart(db: &dyn Persistence, id: CartId) -> Result<Option<Cart>, ServiceError> {
    let rows = db
        .select(&Select::new(Table::Carts).eq("id", id).limit(1))
        .await
        .logged("get_cart")?;
    first(Table::Carts, rows).logged("get_cart")
}

/// Items in a cart with their products, oldest first.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn get_cart_items(
    db: &dyn Persistence,
    cart: CartId,
) -> Result<Vec<CartItem>, ServiceError> {
    let select = Select::new(Table::CartItems)
        .eq("cart_id", cart)
        .order_by("created_at")
        .order_by("id")
        .embed(Embed::belongs_to("product", Table::Products, "product_id"));
    let rows = db.select(&select).await.logged("get_cart_items")?;
    decode_rows(Table::CartItems, rows).logged("get_cart_items")
}

/// The line for `product` in `cart`, if any.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails. No match is
/// `Ok(None)`.
#[instrument(skip(db))]
pub async fn get_cart_item(
    db: &dyn Persistence,
    cart: CartId,
    product: ProductId,
) -> Result<Option<CartItem>, ServiceError> {
    let select = Select::new(Table::CartItems)
        .eq("cart_id", cart)
        .eq("product_id", product)
        .limit(1);
    let rows = db.select(&select).await.logged("get_cart_item")?;
    first(Table::CartItems, rows).logged("get_cart_item")
}

fn check_quantity(quantity: i32, allow_zero: bool) -> Result<(), ServiceError> {
    let min = i32::from(!allow_zero);
    if (min..=MAX_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(ServiceError::InvalidInput(format!(
            "Quantity must be between {min} and {MAX_QUANTITY}."
        )))
    }
}

/// Add `quantity` units of `product` to `cart`.
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` for a quantity outside
/// `1..=MAX_QUANTITY` (including after incrementing an existing line),
/// `ServiceError::NotFound` if the product does not exist, and
/// `ServiceError::Repository` if a query fails.
#[instrument(skip(db))]
pub async fn add_to_cart(
    db: &dyn Persistence,
    cart: CartId,
    product: ProductId,
    quantity: i32,
) -> Result<CartItem, ServiceError> {
    check_quantity(quantity, false).logged("add_to_cart")?;

    if let Some(existing) = get_cart_item(db, cart, product).await? {
        let total = existing.quantity.saturating_add(quantity);
        check_quantity(total, false).logged("add_to_cart")?;
        debug!(item = %existing.id, total, "incrementing existing cart line");

        let rows = db
            .update(
                &Update::new(Table::CartItems, row([("quantity", total)]))
                    .eq("id", existing.id),
            )
            .await
            .logged("add_to_cart")?;
        return written(Table::CartItems, rows).logged("add_to_cart");
    }

    if product::get_product(db, product).await?.is_none() {
        return Err(ServiceError::NotFound("product")).logged("add_to_cart");
    }

    let rows = db
        .insert(&Insert::one(
            Table::CartItems,
            row([
                ("cart_id", serde_json::Value::from(cart)),
                ("product_id", product.into()),
                ("quantity", quantity.into()),
            ]),
        ))
        .await
        .logged("add_to_cart")?;
    written(Table::CartItems, rows).logged("add_to_cart")
}

/// Set the quantity of a line in `cart`. A quantity of zero removes it.
///
/// Returns the updated line, or `None` when it was removed.
///
/// # Errors
///
/// Returns `ServiceError::InvalidInput` for a quantity outside
/// `0..=MAX_QUANTITY`, `ServiceError::NotFound` if the line is not in
/// `cart`, and `ServiceError::Repository` if a query fails.
#[instrument(skip(db))]
pub async fn update_cart_item_quantity(
    db: &dyn Persistence,
    cart: CartId,
    item: CartItemId,
    quantity: i32,
) -> Result<Option<CartItem>, ServiceError> {
    check_quantity(quantity, true).logged("update_cart_item_quantity")?;
    if quantity == 0 {
        remove_cart_item(db, cart, item).await?;
        return Ok(None);
    }

    let rows = db
        .update(
            &Update::new(Table::CartItems, row([("quantity", quantity)]))
                .eq("id", item)
                .eq("cart_id", cart),
        )
        .await
        .logged("update_cart_item_quantity")?;
    first(Table::CartItems, rows)
        .logged("update_cart_item_quantity")?
        .ok_or(ServiceError::NotFound("cart item"))
        .map(Some)
}

/// Remove a line from `cart`. Removing a missing line succeeds.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the delete fails.
#[instrument(skip(db))]
pub async fn remove_cart_item(
    db: &dyn Persistence,
    cart: CartId,
    item: CartItemId,
) -> Result<(), ServiceError> {
    db.delete(&Delete::new(Table::CartItems).eq("id", item).eq("cart_id", cart))
        .await
        .logged("remove_cart_item")?;
    Ok(())
}

/// Remove every line from `cart`.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the delete fails.
#[instrument(skip(db))]
pub async fn clear_cart(db: &dyn Persistence, cart: CartId) -> Result<(), ServiceError> {
    let removed = db
        .delete(&Delete::new(Table::CartItems).eq("cart_id", cart))
        .await
        .logged("clear_cart")?;
    debug!(removed, "cart cleared");
    Ok(())
}

/// Total units in `cart`.
///
/// # Errors
///
/// Returns `ServiceError::Repository` if the query fails.
#[instrument(skip(db))]
pub async fn cart_count(db: &dyn Persistence, cart: CartId) -> Result<i64, ServiceError> {
    let rows = db
        .select(&Select::new(Table::CartItems).eq("cart_id", cart))
        .await
        .logged("cart_count")?;
    Ok(rows
        .iter()
        .filter_map(|r| r.get("quantity").and_then(serde_json::Value::as_i64))
        .sum())
}

/// Sum of line totals for display.
#[must_use]
pub fn cart_subtotal(items: &[CartItem]) -> Decimal {
    crate::models::cart_subtotal(items)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;
    use crate::services::testing::{ALICE, seeded_store};
    use cornershop_core::format_currency;

    #[tokio::test]
    async fn test_new_pair_is_inserted_and_retrievable() {
        let store = seeded_store().await;
        let cart = create_cart(&store, Some(ALICE)).await.unwrap();
        assert_eq!(cart.user_id, Some(ALICE));

        let added = add_to_cart(&store, cart.id, ProductId::new(2), 2).await.unwrap();
        let fetched = get_cart_item(&store, cart.id, ProductId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, added.id);
        assert_eq!(fetched.quantity, 2);
    }

    #[tokio::test]
    async fn test_missing_pair_is_none_not_error() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        let item = get_cart_item(&store, cart.id, ProductId::new(1)).await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_adding_existing_product_increments() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        add_to_cart(&store, cart.id, ProductId::new(1), 1).await.unwrap();
        let line = add_to_cart(&store, cart.id, ProductId::new(1), 3).await.unwrap();
        assert_eq!(line.quantity, 4);

        let items = get_cart_items(&store, cart.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(cart_count(&store, cart.id).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_quantity_limits() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        assert!(matches!(
            add_to_cart(&store, cart.id, ProductId::new(1), 0).await,
            Err(ServiceError::InvalidInput(_))
        ));
        add_to_cart(&store, cart.id, ProductId::new(1), MAX_QUANTITY).await.unwrap();
        assert!(matches!(
            add_to_cart(&store, cart.id, ProductId::new(1), 1).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        assert!(matches!(
            add_to_cart(&store, cart.id, ProductId::new(404), 1).await,
            Err(ServiceError::NotFound("product"))
        ));
    }

    #[tokio::test]
    async fn test_items_embed_products_and_subtotal() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        add_to_cart(&store, cart.id, ProductId::new(1), 2).await.unwrap();
        add_to_cart(&store, cart.id, ProductId::new(2), 1).await.unwrap();

        let items = get_cart_items(&store, cart.id).await.unwrap();
        let titles: Vec<_> = items
            .iter()
            .map(|i| i.product.as_ref().unwrap().title.as_str())
            .collect();
        assert_eq!(titles, vec!["Dark Roast", "Green Tea"]);
        assert_eq!(format_currency(cart_subtotal(&items)), "$33.00");
    }

    #[tokio::test]
    async fn test_update_quantity_and_zero_removes() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        let line = add_to_cart(&store, cart.id, ProductId::new(3), 1).await.unwrap();

        let updated = update_cart_item_quantity(&store, cart.id, line.id, 5)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.quantity, 5);

        let removed = update_cart_item_quantity(&store, cart.id, line.id, 0).await.unwrap();
        assert!(removed.is_none());
        assert!(get_cart_items(&store, cart.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lines_are_scoped_to_their_cart() {
        let store = seeded_store().await;
        let mine = create_cart(&store, None).await.unwrap();
        let theirs = create_cart(&store, None).await.unwrap();
        let line = add_to_cart(&store, theirs.id, ProductId::new(1), 1).await.unwrap();

        assert!(matches!(
            update_cart_item_quantity(&store, mine.id, line.id, 2).await,
            Err(ServiceError::NotFound("cart item"))
        ));
        remove_cart_item(&store, mine.id, line.id).await.unwrap();
        assert_eq!(cart_count(&store, theirs.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_cart() {
        let store = seeded_store().await;
        let cart = create_cart(&store, None).await.unwrap();
        add_to_cart(&store, cart.id, ProductId::new(1), 1).await.unwrap();
        add_to_cart(&store, cart.id, ProductId::new(2), 1).await.unwrap();
        clear_cart(&store, cart.id).await.unwrap();
        assert_eq!(cart_count(&store, cart.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_repository_error() {
        let store = seeded_store().await;
        store.set_unavailable(true);
        let err = get_cart(&store, CartId::new(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Repository(RepositoryError::Unavailable(_))
        ));
    }
}
