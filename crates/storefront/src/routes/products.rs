//! Product and review route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{OriginalUri, Path, Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use cornershop_core::{CategoryId, ProductId, Rating, ReviewId};

use super::categories::members_only_redirect;
use super::{found, invalidate, mutated};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::{Category, CurrentUser, NewReview, Product, RatingSummary, Review, ReviewPatch};
use crate::notify::{REVIEWS_UPDATED, Toast};
use crate::query::{ViewState, hooks, keys};
use crate::services::{product::ProductQuery, review};
use crate::state::AppState;

/// Listing query parameters.
///
/// `category` is kept as text so an empty `?category=` means "all".
#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

impl ListingQuery {
    fn category(&self) -> Option<CategoryId> {
        self.category.as_deref().and_then(|c| c.parse().ok())
    }
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub user: Option<CurrentUser>,
    pub products: ViewState<Vec<Product>>,
    pub categories: Vec<Category>,
    pub search: String,
    pub selected_category: Option<CategoryId>,
}

impl ProductsIndexTemplate {
    /// Whether `category` is the active filter (used by the filter select).
    #[must_use]
    pub fn is_selected(&self, category: &CategoryId) -> bool {
        self.selected_category == Some(*category)
    }
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub user: Option<CurrentUser>,
    pub product: Product,
}

/// A review as shown to the current visitor.
#[derive(Clone)]
pub struct ReviewView {
    pub review: Review,
    /// Written by the current visitor (may be edited or deleted).
    pub own: bool,
}

/// Reviews fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/reviews.html")]
pub struct ReviewsTemplate {
    pub product_id: ProductId,
    pub reviews: ViewState<Vec<ReviewView>>,
    pub summary: RatingSummary,
    pub signed_in: bool,
    pub retry_url: String,
}

/// Review form data.
#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    pub rating: i32,
    pub comment: Option<String>,
}

/// Review edit form data. Blank fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct ReviewEditForm {
    pub rating: Option<String>,
    pub comment: Option<String>,
}

fn parse_rating(value: i32) -> Result<Rating> {
    Rating::new(value).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Display the product listing.
#[instrument(skip(state, user, uri))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<ListingQuery>,
) -> Result<Response> {
    let selected_category = params.category();

    if let Some(id) = selected_category {
        let category = found(
            hooks::use_category(state.queries(), state.db(), Some(id)).await,
            || format!("category {id}"),
        )?;
        if let Some(redirect) = members_only_redirect(&category, user.as_ref(), &uri.to_string()) {
            return Ok(redirect);
        }
    }

    let query = ProductQuery {
        category: selected_category,
        search: params.q.clone(),
        limit: None,
    };
    let products = hooks::use_products(state.queries(), state.db(), &query)
        .await
        .into_view(Vec::is_empty);
    let categories = hooks::use_categories(state.queries(), state.db())
        .await
        .into_data()
        .unwrap_or_default();

    Ok(ProductsIndexTemplate {
        user,
        products,
        categories,
        search: query.search_term().unwrap_or_default(),
        selected_category,
    }
    .into_response())
}

/// Display a product.
#[instrument(skip(state, user, uri))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<ProductId>,
) -> Result<Response> {
    let product = found(
        hooks::use_product(state.queries(), state.db(), Some(id)).await,
        || format!("product {id}"),
    )?;

    let redirect = product
        .category
        .as_ref()
        .and_then(|category| members_only_redirect(category, user.as_ref(), &uri.to_string()));
    if let Some(redirect) = redirect {
        return Ok(redirect);
    }

    Ok(ProductShowTemplate { user, product }.into_response())
}

/// Reviews fragment for a product (HTMX).
#[instrument(skip(state, user))]
pub async fn reviews(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
) -> impl IntoResponse {
    let state_reviews = hooks::use_reviews(state.queries(), state.db(), Some(id)).await;
    let summary = state_reviews
        .data()
        .map(|r| review::rating_summary(r))
        .unwrap_or_default();
    let viewer = user.as_ref().map(|u| u.id);

    let reviews = state_reviews
        .into_view(Vec::is_empty)
        .map(|reviews| {
            reviews
                .into_iter()
                .map(|review| ReviewView {
                    own: Some(review.user_id) == viewer,
                    review,
                })
                .collect()
        });

    ReviewsTemplate {
        product_id: id,
        reviews,
        summary,
        signed_in: user.is_some(),
        retry_url: format!("/products/{id}/reviews"),
    }
}

/// Create a review (HTMX).
#[instrument(skip(state, user, form), fields(user = %user.id))]
pub async fn create_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ProductId>,
    Form(form): Form<ReviewForm>,
) -> Result<Response> {
    let new_review = NewReview {
        product_id: id,
        user_id: user.id,
        rating: parse_rating(form.rating)?,
        comment: form.comment,
        author_name: Some(user.display_name().to_string()),
    };
    review::create_review(state.db(), new_review).await?;

    let product = id.to_string();
    add_breadcrumb("review", "Posted review", Some(&[("product_id", product.as_str())]));
    invalidate(&state, &[keys::reviews::list(id)]).await;
    Ok(mutated(Toast::success("Thanks for your review!"), &[REVIEWS_UPDATED]))
}

/// Edit one of the visitor's reviews (HTMX).
#[instrument(skip(state, user, form), fields(user = %user.id))]
pub async fn update_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
    Form(form): Form<ReviewEditForm>,
) -> Result<Response> {
    let rating = match form.rating.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            let value: i32 = value
                .parse()
                .map_err(|_| AppError::BadRequest("Rating must be a number".to_string()))?;
            Some(parse_rating(value)?)
        }
    };
    let patch = ReviewPatch {
        rating,
        comment: form.comment,
    };
    let updated = review::update_review(state.db(), user.id, id, patch).await?;

    invalidate(&state, &[keys::reviews::list(updated.product_id)]).await;
    Ok(mutated(Toast::success("Review updated"), &[REVIEWS_UPDATED]))
}

/// Delete one of the visitor's reviews (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn delete_review(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
) -> Result<Response> {
    review::delete_review(state.db(), user.id, id).await?;

    // The product is unknown once the row is gone.
    invalidate(&state, &[keys::reviews::lists()]).await;
    Ok(mutated(Toast::success("Review deleted"), &[REVIEWS_UPDATED]))
}
