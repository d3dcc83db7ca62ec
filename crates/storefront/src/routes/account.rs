//! Account route handlers.
//!
//! Every handler here requires a signed-in user (`RequireAuth`).

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use cornershop_core::OrderId;

use super::{found, invalidate, mutated};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Address, CurrentUser, Order};
use crate::notify::{ORDERS_UPDATED, Toast};
use crate::query::{ViewState, hooks, keys};
use crate::services::order;
use crate::state::AppState;

/// Orders shown on the overview page.
const RECENT_ORDERS: usize = 3;

/// Account overview template.
#[derive(Template, WebTemplate)]
#[template(path = "account/index.html")]
pub struct AccountIndexTemplate {
    pub user: Option<CurrentUser>,
    pub account: CurrentUser,
    pub recent_orders: ViewState<Vec<Order>>,
    pub default_address: Option<Address>,
}

/// Order history page template (skeleton).
#[derive(Template, WebTemplate)]
#[template(path = "account/orders.html")]
pub struct OrdersTemplate {
    pub user: Option<CurrentUser>,
}

/// Order list fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/orders.html")]
pub struct OrdersListTemplate {
    pub orders: ViewState<Vec<Order>>,
    pub retry_url: &'static str,
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "account/order.html")]
pub struct OrderDetailTemplate {
    pub user: Option<CurrentUser>,
    pub order: Order,
}

/// Display account overview.
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn index(State(state): State<AppState>, RequireAuth(user): RequireAuth) -> impl IntoResponse {
    let recent_orders = hooks::use_orders(state.queries(), state.db(), Some(user.id))
        .await
        .into_view(Vec::is_empty)
        .map(|orders| orders.into_iter().take(RECENT_ORDERS).collect());

    // Addresses are listed default first.
    let default_address = hooks::use_addresses(state.queries(), state.db(), Some(user.id))
        .await
        .into_data()
        .and_then(|addresses| addresses.into_iter().find(|a| a.is_default));

    AccountIndexTemplate {
        user: Some(user.clone()),
        account: user,
        recent_orders,
        default_address,
    }
}

/// Display order history page. Orders load as a fragment.
#[instrument(skip(user), fields(user = %user.id))]
pub async fn orders(RequireAuth(user): RequireAuth) -> impl IntoResponse {
    OrdersTemplate { user: Some(user) }
}

/// Order list fragment (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn orders_list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> impl IntoResponse {
    let orders = hooks::use_orders(state.queries(), state.db(), Some(user.id))
        .await
        .into_view(Vec::is_empty);

    OrdersListTemplate {
        orders,
        retry_url: "/account/orders/list",
    }
}

/// Display one of the user's orders.
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn order_detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Response> {
    let order = found(
        hooks::use_order(state.queries(), state.db(), Some(id)).await,
        || format!("order {id}"),
    )?;

    // Someone else's order looks the same as a missing one.
    if order.user_id != user.id {
        return Err(AppError::NotFound(format!("order {id}")));
    }

    Ok(OrderDetailTemplate {
        user: Some(user),
        order,
    }
    .into_response())
}

/// Cancel a pending order (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Response> {
    order::cancel_order(state.db(), user.id, id).await?;

    invalidate(&state, &[keys::orders::all()]).await;
    Ok(mutated(Toast::success("Order cancelled"), &[ORDERS_UPDATED]))
}
