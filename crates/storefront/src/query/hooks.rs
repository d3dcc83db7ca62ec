//! Cache-aware reads used by the views.
//!
//! Hooks taking an `Option` are disabled when the identifier is missing:
//! they return [`QueryState::Disabled`] without touching the cache or the
//! persistence client.

use std::future::Future;

use cornershop_core::{CartId, CategoryId, OrderId, ProductId, UserId};

use super::keys::{self, QueryKey};
use super::{QueryClient, QueryState};
use crate::db::Persistence;
use crate::models::{Address, CartItem, Category, Order, Product, Review};
use crate::services::product::ProductQuery;
use crate::services::{ServiceError, address, cart, category, order, product, review};

async fn use_query<T, F, Fut>(client: &QueryClient, key: Option<QueryKey>, fetcher: F) -> QueryState<T>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    match key {
        None => QueryState::Disabled,
        Some(key) => QueryState::from_result(client.fetch(key, fetcher).await),
    }
}

/// Cache scope for a product listing.
fn product_scope(query: &ProductQuery) -> String {
    format!(
        "category={};q={};limit={}",
        query.category.map(|c| c.to_string()).unwrap_or_default(),
        query.search_term().unwrap_or_default().to_lowercase(),
        query.limit.map(|l| l.to_string()).unwrap_or_default(),
    )
}

pub async fn use_products(
    client: &QueryClient,
    db: &dyn Persistence,
    query: &ProductQuery,
) -> QueryState<Vec<Product>> {
    let key = keys::products::list(product_scope(query));
    use_query(client, Some(key), || product::get_products(db, query)).await
}

pub async fn use_product(
    client: &QueryClient,
    db: &dyn Persistence,
    id: Option<ProductId>,
) -> QueryState<Option<Product>> {
    let key = id.map(keys::products::detail);
    use_query(client, key, move || async move {
        match id {
            Some(id) => product::get_product(db, id).await,
            None => Ok(None),
        }
    })
    .await
}

pub async fn use_categories(client: &QueryClient, db: &dyn Persistence) -> QueryState<Vec<Category>> {
    use_query(client, Some(keys::categories::list("all")), || {
        category::get_categories(db)
    })
    .await
}

pub async fn use_category(
    client: &QueryClient,
    db: &dyn Persistence,
    id: Option<CategoryId>,
) -> QueryState<Option<Category>> {
    let key = id.map(keys::categories::detail);
    use_query(client, key, move || async move {
        match id {
            Some(id) => category::get_category(db, id).await,
            None => Ok(None),
        }
    })
    .await
}

pub async fn use_cart_items(
    client: &QueryClient,
    db: &dyn Persistence,
    cart_id: Option<CartId>,
) -> QueryState<Vec<CartItem>> {
    let key = cart_id.map(keys::cart::list);
    use_query(client, key, move || async move {
        match cart_id {
            Some(id) => cart::get_cart_items(db, id).await,
            None => Ok(Vec::new()),
        }
    })
    .await
}

pub async fn use_cart_count(
    client: &QueryClient,
    db: &dyn Persistence,
    cart_id: Option<CartId>,
) -> QueryState<i64> {
    let key = cart_id.map(keys::cart_count);
    use_query(client, key, move || async move {
        match cart_id {
            Some(id) => cart::cart_count(db, id).await,
            None => Ok(0),
        }
    })
    .await
}

pub async fn use_orders(
    client: &QueryClient,
    db: &dyn Persistence,
    user: Option<UserId>,
) -> QueryState<Vec<Order>> {
    let key = user.map(keys::orders::list);
    use_query(client, key, move || async move {
        match user {
            Some(user) => order::get_orders(db, user).await,
            None => Ok(Vec::new()),
        }
    })
    .await
}

pub async fn use_order(
    client: &QueryClient,
    db: &dyn Persistence,
    id: Option<OrderId>,
) -> QueryState<Option<Order>> {
    let key = id.map(keys::orders::detail);
    use_query(client, key, move || async move {
        match id {
            Some(id) => order::get_order(db, id).await,
            None => Ok(None),
        }
    })
    .await
}

pub async fn use_addresses(
    client: &QueryClient,
    db: &dyn Persistence,
    user: Option<UserId>,
) -> QueryState<Vec<Address>> {
    let key = user.map(keys::addresses::list);
    use_query(client, key, move || async move {
        match user {
            Some(user) => address::get_addresses(db, user).await,
            None => Ok(Vec::new()),
        }
    })
    .await
}

pub async fn use_reviews(
    client: &QueryClient,
    db: &dyn Persistence,
    product_id: Option<ProductId>,
) -> QueryState<Vec<Review>> {
    let key = product_id.map(keys::reviews::list);
    use_query(client, key, move || async move {
        match product_id {
            Some(id) => review::get_reviews(db, id).await,
            None => Ok(Vec::new()),
        }
    })
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::QueryCacheConfig;
    use crate::db::{Insert, Table, query::row};
    use crate::services::testing::{ALICE, seeded_store};

    fn client() -> QueryClient {
        QueryClient::new(QueryCacheConfig::default())
    }

    #[tokio::test]
    async fn test_disabled_hooks_do_not_fetch() {
        let store = seeded_store().await;
        store.set_unavailable(true);
        let client = client();

        assert!(use_orders(&client, &store, None).await.is_disabled());
        assert!(use_product(&client, &store, None).await.is_disabled());
        assert!(use_cart_items(&client, &store, None).await.is_disabled());

        // An enabled hook does reach the (failing) store.
        assert!(matches!(
            use_orders(&client, &store, Some(ALICE)).await,
            QueryState::Error(_)
        ));
    }

    #[tokio::test]
    async fn test_results_are_cached_until_invalidated() {
        let store = seeded_store().await;
        let client = client();

        let before = use_categories(&client, &store).await.into_data().unwrap();
        assert_eq!(before.len(), 3);

        store
            .insert(&Insert::one(Table::Categories, row([("name", "Snacks")])))
            .await
            .unwrap();
        let cached = use_categories(&client, &store).await.into_data().unwrap();
        assert_eq!(cached.len(), 3);

        client.invalidate(&keys::categories::all()).await;
        let fresh = use_categories(&client, &store).await.into_data().unwrap();
        assert_eq!(fresh.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_fetch_recovers_on_next_call() {
        let store = seeded_store().await;
        let client = client();

        store.set_unavailable(true);
        let query = ProductQuery::default();
        assert!(matches!(
            use_products(&client, &store, &query).await,
            QueryState::Error(_)
        ));

        store.set_unavailable(false);
        let products = use_products(&client, &store, &query).await.into_data().unwrap();
        assert_eq!(products.len(), 4);
    }

    #[test]
    fn test_product_scope_normalizes_search() {
        let a = ProductQuery {
            search: Some("Roast ".to_string()),
            ..ProductQuery::default()
        };
        let b = ProductQuery {
            search: Some("roast".to_string()),
            ..ProductQuery::default()
        };
        assert_eq!(product_scope(&a), product_scope(&b));
    }
}
