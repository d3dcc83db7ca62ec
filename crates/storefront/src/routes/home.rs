//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::{Category, CurrentUser, Product};
use crate::query::{ViewState, hooks};
use crate::services::product::ProductQuery;
use crate::state::AppState;

/// Number of products featured on the home page.
const FEATURED_LIMIT: u32 = 8;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub user: Option<CurrentUser>,
    pub featured: ViewState<Vec<Product>>,
    pub categories: Vec<Category>,
}

/// Display the home page.
#[instrument(skip(state, user))]
pub async fn home(State(state): State<AppState>, OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
    let query = ProductQuery {
        limit: Some(FEATURED_LIMIT),
        ..ProductQuery::default()
    };
    let featured = hooks::use_products(state.queries(), state.db(), &query)
        .await
        .into_view(Vec::is_empty);

    // Category links are decoration; a failure only hides them.
    let categories = hooks::use_categories(state.queries(), state.db())
        .await
        .into_data()
        .unwrap_or_default();

    HomeTemplate {
        user,
        featured,
        categories,
    }
}
