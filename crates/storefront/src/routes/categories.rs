//! Category route handlers.
//!
//! Members-only categories (and their products) are visible to signed-in
//! visitors only; everyone else is redirected to sign in.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{OriginalUri, Path, State},
    response::{IntoResponse, Redirect, Response},
};
use tracing::instrument;

use cornershop_core::CategoryId;

use super::found;
use crate::error::Result;
use crate::filters;
use crate::middleware::{OptionalAuth, sign_in_location};
use crate::models::{Category, CurrentUser, Product};
use crate::query::{ViewState, hooks};
use crate::services::product::ProductQuery;
use crate::state::AppState;

/// Category listing template.
#[derive(Template, WebTemplate)]
#[template(path = "categories/index.html")]
pub struct CategoriesIndexTemplate {
    pub user: Option<CurrentUser>,
    pub categories: ViewState<Vec<Category>>,
}

/// Category page template.
#[derive(Template, WebTemplate)]
#[template(path = "categories/show.html")]
pub struct CategoryShowTemplate {
    pub user: Option<CurrentUser>,
    pub category: Category,
    pub products: ViewState<Vec<Product>>,
}

/// Redirect anonymous visitors away from members-only content.
///
/// Returns `None` when the visitor may see `category`.
pub(crate) fn members_only_redirect(
    category: &Category,
    user: Option<&CurrentUser>,
    requested: &str,
) -> Option<Response> {
    if category.members_only && user.is_none() {
        tracing::debug!(category = %category.id, "members-only category, redirecting to sign-in");
        return Some(Redirect::to(&sign_in_location(requested)).into_response());
    }
    None
}

/// Display all categories.
#[instrument(skip(state, user))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> impl IntoResponse {
    let categories = hooks::use_categories(state.queries(), state.db())
        .await
        .into_view(Vec::is_empty);

    CategoriesIndexTemplate { user, categories }
}

/// Display a category and its products.
#[instrument(skip(state, user, uri))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<CategoryId>,
) -> Result<Response> {
    let category = found(
        hooks::use_category(state.queries(), state.db(), Some(id)).await,
        || format!("category {id}"),
    )?;

    if let Some(redirect) = members_only_redirect(&category, user.as_ref(), &uri.to_string()) {
        return Ok(redirect);
    }

    let products = hooks::use_products(state.queries(), state.db(), &ProductQuery::in_category(id))
        .await
        .into_view(Vec::is_empty);

    Ok(CategoryShowTemplate {
        user,
        category,
        products,
    }
    .into_response())
}
