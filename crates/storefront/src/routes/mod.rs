//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                       - Home page
//! GET  /health                 - Liveness
//! GET  /health/ready           - Readiness (persistence ping)
//!
//! # Catalog
//! GET  /products               - Product listing (?q=, ?category=)
//! GET  /products/{id}          - Product detail
//! GET  /products/{id}/reviews  - Reviews fragment (HTMX)
//! POST /products/{id}/reviews  - Create review (auth)
//! POST /reviews/{id}           - Update own review (auth)
//! POST /reviews/{id}/delete    - Delete own review (auth)
//! GET  /categories             - Category listing
//! GET  /categories/{id}        - Category page (members-only requires auth)
//!
//! # Cart (HTMX fragments)
//! GET  /cart                   - Cart page (skeleton)
//! GET  /cart/items             - Cart items fragment
//! POST /cart/add               - Add to cart (triggers cart-updated)
//! POST /cart/update            - Update quantity (triggers cart-updated)
//! POST /cart/remove            - Remove item (triggers cart-updated)
//! GET  /cart/count             - Cart count badge (fragment)
//!
//! # Checkout
//! GET  /checkout               - Redirect to hosted checkout (auth)
//! GET  /checkout/{outcome}     - success | failure | pending return pages
//!
//! # Account (requires auth)
//! GET  /account                - Account overview
//! GET  /account/orders         - Order history (skeleton)
//! GET  /account/orders/list    - Order history fragment
//! GET  /account/orders/{id}    - Order detail
//! POST /account/orders/{id}/cancel - Cancel a pending order
//! GET  /account/addresses      - Address book (skeleton)
//! GET  /account/addresses/list - Address list fragment
//! POST /account/addresses      - Create address
//! POST /account/addresses/{id} - Update address
//! POST /account/addresses/{id}/delete  - Delete address
//! POST /account/addresses/{id}/default - Make default
//!
//! # Auth
//! GET  /sign-in                - Link to hosted sign-in
//! GET  /auth/callback          - Accept access token, start session
//! POST /auth/sign-out          - Clear session
//! ```
//!
//! Data sections follow one pattern: the page renders a container with a
//! loading skeleton that fetches its fragment on `load`; the fragment
//! renders a [`ViewState`](crate::query::ViewState) branch. Mutations answer
//! `204` with an `HX-Trigger` toast and a domain event the containers
//! listen for.

pub mod account;
pub mod addresses;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod checkout;
pub mod health;
pub mod home;
pub mod products;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::error::AppError;
use crate::notify::{HxTrigger, Toast};
use crate::query::{QueryKey, QueryState};
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{id}", get(products::show))
        .route(
            "/{id}/reviews",
            get(products::reviews).post(products::create_review),
        )
}

/// Create the category routes router.
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(categories::index))
        .route("/{id}", get(categories::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", get(cart::items))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::start))
        .route("/{outcome}", get(checkout::result))
}

/// Create the account routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(account::index))
        .route("/orders", get(account::orders))
        .route("/orders/list", get(account::orders_list))
        .route("/orders/{id}", get(account::order_detail))
        .route("/orders/{id}/cancel", post(account::cancel_order))
        .route(
            "/addresses",
            get(addresses::index).post(addresses::create),
        )
        .route("/addresses/list", get(addresses::list))
        .route("/addresses/{id}", post(addresses::update))
        .route("/addresses/{id}/delete", post(addresses::delete))
        .route("/addresses/{id}/default", post(addresses::make_default))
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/callback", get(auth::callback))
        .route("/sign-out", post(auth::sign_out))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/products", product_routes())
        .route("/reviews/{id}", post(products::update_review))
        .route("/reviews/{id}/delete", post(products::delete_review))
        .nest("/categories", category_routes())
        .nest("/cart", cart_routes())
        .nest("/checkout", checkout_routes())
        .nest("/account", account_routes())
        .route("/sign-in", get(auth::sign_in))
        .nest("/auth", auth_routes())
}

/// Response to a successful HTMX mutation: no body, a toast, and events.
fn mutated(toast: Toast, events: &[&'static str]) -> Response {
    let trigger = events
        .iter()
        .fold(HxTrigger::toast(toast), |trigger, event| trigger.event(*event));
    (StatusCode::NO_CONTENT, trigger, ()).into_response()
}

/// Drop every cached entry under each of `keys`.
async fn invalidate(state: &AppState, keys: &[QueryKey]) {
    for key in keys {
        state.queries().invalidate(key).await;
    }
}

/// Unwrap a detail hook, turning a missing entity into a 404.
fn found<T>(state: QueryState<Option<T>>, what: impl FnOnce() -> String) -> Result<T, AppError> {
    match state {
        QueryState::Success(Some(value)) => Ok(value),
        QueryState::Success(None) | QueryState::Disabled => Err(AppError::NotFound(what())),
        QueryState::Error(e) => Err(AppError::Query(e)),
    }
}
