//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! The cart id lives in the session; a cart row is created on the first
//! add. Mutations answer with a toast and `cart-updated`, which the items
//! section and the header badge listen for.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use cornershop_core::{CartId, CartItemId, ProductId};

use super::{found, invalidate, mutated};
use crate::error::{Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{AuthRejection, OptionalAuth};
use crate::models::{CartItem, CurrentUser, session_keys};
use crate::notify::{CART_UPDATED, Toast};
use crate::query::{QueryKey, ViewState, hooks, keys};
use crate::services::cart;
use crate::state::AppState;

/// Cart items section data.
pub struct CartView {
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Get the cart ID from the session.
pub(crate) async fn get_cart_id(session: &Session) -> Option<CartId> {
    session
        .get::<CartId>(session_keys::CART_ID)
        .await
        .ok()
        .flatten()
}

/// Set the cart ID in the session.
async fn set_cart_id(session: &Session, cart_id: CartId) -> Result<()> {
    session.insert(session_keys::CART_ID, cart_id).await?;
    Ok(())
}

/// Forget the session's cart (after a completed checkout).
pub(crate) async fn clear_cart_id(session: &Session) -> Result<()> {
    session.remove::<CartId>(session_keys::CART_ID).await?;
    Ok(())
}

/// Keys holding data derived from `cart`.
pub(crate) fn cart_keys(cart: CartId) -> [QueryKey; 2] {
    [keys::cart::list(cart), keys::cart_count(cart)]
}

/// The session's cart, creating one if the session has none or its cart
/// no longer exists.
async fn ensure_cart(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<CartId> {
    if let Some(id) = get_cart_id(session).await
        && cart::get_cart(state.db(), id).await?.is_some()
    {
        return Ok(id);
    }

    let created = cart::create_cart(state.db(), user.map(|u| u.id)).await?;
    set_cart_id(session, created.id).await?;
    tracing::info!(cart = %created.id, "cart created");
    Ok(created.id)
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
    pub quantity: Option<i32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub item_id: CartItemId,
    pub quantity: i32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub item_id: CartItemId,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub user: Option<CurrentUser>,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: ViewState<CartView>,
    pub signed_in: bool,
    pub retry_url: &'static str,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: i64,
}

/// Display cart page. Items load as a fragment.
#[instrument(skip(user))]
pub async fn show(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    CartShowTemplate { user }
}

/// Cart items fragment (HTMX).
#[instrument(skip(state, session, user))]
pub async fn items(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> impl IntoResponse {
    let cart_id = get_cart_id(&session).await;
    let cart = match cart_id {
        // No cart yet is an empty cart, not a pending one.
        None => ViewState::Empty,
        Some(_) => hooks::use_cart_items(state.queries(), state.db(), cart_id)
            .await
            .into_view(Vec::is_empty)
            .map(|items| CartView {
                subtotal: cart::cart_subtotal(&items),
                items,
            }),
    };

    CartItemsTemplate {
        cart,
        signed_in: user.is_some(),
        retry_url: "/cart/items",
    }
}

/// Add item to cart (HTMX).
///
/// Creates a new cart if one doesn't exist. Unknown products are a 404.
#[instrument(skip(state, session, user))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let product = found(
        hooks::use_product(state.queries(), state.db(), Some(form.product_id)).await,
        || format!("product {}", form.product_id),
    )?;

    // Members-only products are sold to signed-in customers only.
    if user.is_none() && product.category.as_ref().is_some_and(|c| c.members_only) {
        return Ok(AuthRejection::HtmxRedirect {
            next: format!("/products/{}", product.id),
        }
        .into_response());
    }

    let cart_id = ensure_cart(&state, &session, user.as_ref()).await?;
    cart::add_to_cart(
        state.db(),
        cart_id,
        product.id,
        form.quantity.unwrap_or(1),
    )
    .await?;

    let product_id = product.id.to_string();
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", product_id.as_str())]));
    invalidate(&state, &cart_keys(cart_id)).await;

    Ok(mutated(
        Toast::success(format!("{} added to cart", product.title)),
        &[CART_UPDATED],
    ))
}

/// Update cart item quantity (HTMX). A quantity of zero removes the line.
#[instrument(skip(state, session))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let Some(cart_id) = get_cart_id(&session).await else {
        return Err(crate::services::ServiceError::NotFound("cart item").into());
    };

    let updated = cart::update_cart_item_quantity(state.db(), cart_id, form.item_id, form.quantity)
        .await?;
    invalidate(&state, &cart_keys(cart_id)).await;

    let toast = match updated {
        Some(_) => Toast::success("Cart updated"),
        None => Toast::info("Item removed"),
    };
    Ok(mutated(toast, &[CART_UPDATED]))
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, session))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    if let Some(cart_id) = get_cart_id(&session).await {
        cart::remove_cart_item(state.db(), cart_id, form.item_id).await?;
        invalidate(&state, &cart_keys(cart_id)).await;
    }
    Ok(mutated(Toast::info("Item removed"), &[CART_UPDATED]))
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session))]
pub async fn count(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    let cart_id = get_cart_id(&session).await;
    // The badge is decoration; failures render as zero.
    let count = hooks::use_cart_count(state.queries(), state.db(), cart_id)
        .await
        .into_data()
        .unwrap_or(0);

    CartCountTemplate { count }
}
