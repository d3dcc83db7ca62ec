//! Sign-in route handlers.
//!
//! Credentials never pass through the storefront. `/sign-in` links to the
//! hosted auth pages, which send the visitor back to `/auth/callback` with
//! an access token. Hosted pages put the token in the URL fragment; the
//! callback page moves it into the query string and reloads.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::invalidate;
use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_user, safe_next, set_current_user};
use crate::models::{CurrentUser, session_keys};
use crate::query::keys;
use crate::services::auth::AuthError;
use crate::state::AppState;

/// Sign-in page query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct SignInQuery {
    pub next: Option<String>,
}

/// Callback query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub access_token: Option<String>,
    pub next: Option<String>,
    pub error_description: Option<String>,
}

/// Sign-in page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/sign_in.html")]
pub struct SignInTemplate {
    pub user: Option<CurrentUser>,
    /// Hosted sign-in link; `None` when sign-in is not configured.
    pub sign_in_url: Option<String>,
    pub error: Option<String>,
}

/// Callback page that forwards a fragment token to the server.
#[derive(Template, WebTemplate)]
#[template(path = "auth/callback.html")]
pub struct CallbackTemplate {
    pub user: Option<CurrentUser>,
}

/// Hosted sign-in link returning to `/auth/callback?next=<next>`.
fn hosted_sign_in_url(state: &AppState, next: &str) -> Result<Option<String>> {
    let Some(auth) = state.auth() else {
        return Ok(None);
    };
    let mut callback = state
        .config()
        .base_url
        .join("/auth/callback")
        .map_err(AuthError::from)?;
    callback.query_pairs_mut().append_pair("next", next);
    Ok(Some(auth.sign_in_url(callback.as_str())))
}

fn sign_in_page(
    state: &AppState,
    next: &str,
    error: Option<String>,
    status: StatusCode,
) -> Result<Response> {
    Ok((
        status,
        SignInTemplate {
            user: None,
            sign_in_url: hosted_sign_in_url(state, next)?,
            error,
        },
    )
        .into_response())
}

/// Display the sign-in page.
#[instrument(skip(state, user, query))]
pub async fn sign_in(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<SignInQuery>,
) -> Result<Response> {
    let next = safe_next(query.next.as_deref());
    if user.is_some() {
        return Ok(Redirect::to(next).into_response());
    }
    sign_in_page(&state, next, None, StatusCode::OK)
}

/// Accept the access token from the hosted sign-in and start a session.
#[instrument(skip(state, session, query))]
pub async fn callback(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<CallbackQuery>,
) -> Result<Response> {
    let next = safe_next(query.next.as_deref());

    if let Some(description) = query.error_description {
        tracing::warn!(error = %description, "hosted sign-in reported an error");
        return sign_in_page(&state, next, Some(description), StatusCode::UNAUTHORIZED);
    }

    let Some(token) = query.access_token.filter(|t| !t.is_empty()) else {
        // Token is still in the fragment; the page script resubmits it.
        return Ok(CallbackTemplate { user: None }.into_response());
    };

    let Some(auth) = state.auth() else {
        return sign_in_page(&state, next, None, StatusCode::SERVICE_UNAVAILABLE);
    };

    let Some(user) = auth.current_user(&token).await? else {
        return sign_in_page(
            &state,
            next,
            Some("Your sign-in link has expired. Please sign in again.".to_string()),
            StatusCode::UNAUTHORIZED,
        );
    };

    set_current_user(&session, &user).await?;
    session.insert(session_keys::ACCESS_TOKEN, &token).await?;
    set_sentry_user(&user.id, Some(&user.email));
    tracing::info!(user = %user.id, "signed in");

    Ok(Redirect::to(next).into_response())
}

/// Sign out and return to the home page.
#[instrument(skip(state, session, user))]
pub async fn sign_out(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Response> {
    clear_current_user(&session).await?;
    clear_sentry_user();

    if let Some(user) = user {
        invalidate(
            &state,
            &[keys::orders::list(user.id), keys::addresses::list(user.id)],
        )
        .await;
        tracing::info!(user = %user.id, "signed out");
    }

    Ok(Redirect::to("/").into_response())
}
