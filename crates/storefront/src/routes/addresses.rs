//! Address book route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::instrument;

use cornershop_core::{AddressId, UserId};

use super::{invalidate, mutated};
use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::{Address, AddressPatch, CurrentUser, NewAddress};
use crate::notify::{ADDRESSES_UPDATED, Toast};
use crate::query::{ViewState, hooks, keys};
use crate::services::address;
use crate::state::AppState;

/// Address form data, shared by create and update.
#[derive(Debug, Default, Deserialize)]
pub struct AddressForm {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
    /// Checkbox; present (`"on"`) when ticked.
    pub is_default: Option<String>,
}

impl AddressForm {
    fn wants_default(&self) -> bool {
        self.is_default.is_some()
    }

    fn into_patch(self) -> AddressPatch {
        AddressPatch {
            full_name: self.full_name,
            line1: self.line1,
            line2: self.line2,
            city: self.city,
            region: self.region,
            postal_code: self.postal_code,
            country: self.country,
            phone: self.phone,
        }
    }
}

/// Address book page template (skeleton plus create form).
#[derive(Template, WebTemplate)]
#[template(path = "account/addresses.html")]
pub struct AddressesTemplate {
    pub user: Option<CurrentUser>,
}

/// Address list fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/addresses.html")]
pub struct AddressListTemplate {
    pub addresses: ViewState<Vec<Address>>,
    pub retry_url: &'static str,
}

async fn invalidate_addresses(state: &AppState, user: UserId) {
    invalidate(state, &[keys::addresses::list(user)]).await;
}

/// Display the address book. Addresses load as a fragment.
#[instrument(skip(user), fields(user = %user.id))]
pub async fn index(RequireAuth(user): RequireAuth) -> impl IntoResponse {
    AddressesTemplate { user: Some(user) }
}

/// Address list fragment (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn list(State(state): State<AppState>, RequireAuth(user): RequireAuth) -> impl IntoResponse {
    let addresses = hooks::use_addresses(state.queries(), state.db(), Some(user.id))
        .await
        .into_view(Vec::is_empty);

    AddressListTemplate {
        addresses,
        retry_url: "/account/addresses/list",
    }
}

/// Create an address (HTMX).
#[instrument(skip(state, user, form), fields(user = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let is_default = form.wants_default();
    let new_address = NewAddress {
        user_id: user.id,
        details: form.into_patch(),
        is_default,
    };
    address::create_address(state.db(), new_address).await?;

    invalidate_addresses(&state, user.id).await;
    Ok(mutated(Toast::success("Address saved"), &[ADDRESSES_UPDATED]))
}

/// Update an address (HTMX).
#[instrument(skip(state, user, form), fields(user = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
    Form(form): Form<AddressForm>,
) -> Result<Response> {
    let make_default = form.wants_default();
    address::update_address(state.db(), user.id, id, form.into_patch()).await?;
    if make_default {
        address::set_default_address(state.db(), user.id, id).await?;
    }

    invalidate_addresses(&state, user.id).await;
    Ok(mutated(Toast::success("Address updated"), &[ADDRESSES_UPDATED]))
}

/// Delete an address (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Response> {
    address::delete_address(state.db(), user.id, id).await?;

    invalidate_addresses(&state, user.id).await;
    Ok(mutated(Toast::info("Address removed"), &[ADDRESSES_UPDATED]))
}

/// Make an address the default (HTMX).
#[instrument(skip(state, user), fields(user = %user.id))]
pub async fn make_default(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<Response> {
    address::set_default_address(state.db(), user.id, id).await?;

    invalidate_addresses(&state, user.id).await;
    Ok(mutated(Toast::success("Default address updated"), &[ADDRESSES_UPDATED]))
}
