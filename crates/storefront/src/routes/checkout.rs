//! Checkout route handlers.
//!
//! Checkout hands the visitor to the billing processor's hosted page. The
//! processor sends them back to one of the outcome pages; orders are
//! recorded from the processor's notifications, not here.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use cornershop_core::CartId;

use super::cart::{cart_keys, clear_cart_id, get_cart_id};
use super::invalidate;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::filters;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::services::billing::{BillingError, CheckoutRequest};
use crate::services::cart;
use crate::state::AppState;

/// Where the processor sent the visitor back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Pending,
}

impl Outcome {
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Success => "Thank you for your order",
            Self::Failure => "Payment was not completed",
            Self::Pending => "Payment pending",
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => {
                "Your payment was approved. The order will appear in your account shortly."
            }
            Self::Failure => "Your cart has been kept so you can try again.",
            Self::Pending => {
                "The payment processor is still confirming your payment. We'll update your order once it clears."
            }
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Parameters appended by the processor to the return URL.
#[derive(Debug, Default, Deserialize)]
pub struct ReturnParams {
    pub payment_id: Option<String>,
    pub status: Option<String>,
    pub external_reference: Option<String>,
}

/// Checkout outcome page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/result.html")]
pub struct CheckoutResultTemplate {
    pub user: Option<CurrentUser>,
    pub outcome: Outcome,
    pub payment_id: Option<String>,
}

/// Whether the processor's return names `cart_id` as its reference.
fn returned_for(cart_id: CartId, params: &ReturnParams) -> bool {
    params.external_reference.as_deref() == Some(cart_id.to_string().as_str())
}

/// Redirect to the hosted checkout page.
#[instrument(skip(state, session, user), fields(user = %user.id))]
pub async fn start(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Response> {
    let Some(gateway) = state.billing() else {
        return Err(AppError::Unavailable(
            "checkout is not available right now".to_string(),
        ));
    };

    let Some(cart_id) = get_cart_id(&session).await else {
        // No cart, redirect to cart page
        return Ok(Redirect::to("/cart").into_response());
    };

    // Bypasses the query cache.
    let items = cart::get_cart_items(state.db(), cart_id).await?;
    let request = match CheckoutRequest::from_cart(cart_id, &items, Some(user.email.clone())) {
        Ok(request) => request,
        Err(BillingError::EmptyCart) => return Ok(Redirect::to("/cart").into_response()),
        Err(e) => return Err(e.into()),
    };

    let checkout = gateway.create_checkout(&request).await?;
    add_breadcrumb(
        "checkout",
        "Redirected to hosted checkout",
        Some(&[("preference_id", checkout.preference_id.as_str())]),
    );
    tracing::info!(cart = %cart_id, preference = %checkout.preference_id, "checkout started");

    Ok(Redirect::to(&checkout.redirect_url).into_response())
}

/// Display a checkout outcome page.
///
/// A successful payment empties the session's cart, provided the returned
/// `external_reference` is that cart. Any other success return is shown as
/// pending and leaves the cart alone.
#[instrument(skip(state, session, user, params))]
pub async fn result(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(mut outcome): Path<Outcome>,
    Query(params): Query<ReturnParams>,
) -> Result<Response> {
    tracing::info!(
        ?outcome,
        payment_id = params.payment_id.as_deref().unwrap_or_default(),
        status = params.status.as_deref().unwrap_or_default(),
        reference = params.external_reference.as_deref().unwrap_or_default(),
        "checkout returned"
    );

    if outcome.is_success() {
        let cart_id = get_cart_id(&session).await;
        match cart_id.filter(|id| returned_for(*id, &params)) {
            Some(cart_id) => {
                cart::clear_cart(state.db(), cart_id).await?;
                clear_cart_id(&session).await?;
                invalidate(&state, &cart_keys(cart_id)).await;
            }
            None => {
                // Not this session's checkout; keep the cart until the
                // processor's notification settles the payment.
                tracing::warn!(
                    cart = ?cart_id,
                    reference = params.external_reference.as_deref().unwrap_or_default(),
                    "checkout success does not match the session cart"
                );
                outcome = Outcome::Pending;
            }
        }
    }

    Ok(CheckoutResultTemplate {
        user,
        outcome,
        payment_id: params.payment_id,
    }
    .into_response())
}
