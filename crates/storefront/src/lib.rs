//! Corner Shop Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.
//!
//! # Layers
//!
//! - [`db`] - Persistence client (`PostgreSQL` or in-memory)
//! - [`services`] - One data operation per function, `Result<T, ServiceError>`
//! - [`query`] - Query cache, keys, and hooks
//! - [`routes`] - Axum handlers rendering Askama pages and HTMX fragments

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod query;
pub mod routes;
pub mod services;
pub mod state;

use axum::{Router, extract::Request, http::Uri, middleware::from_fn};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use state::AppState;

/// Directory served under `/static`.
pub const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

/// Build the full application router with its middleware stack.
///
/// `store` backs the session layer: `PostgresStore` in production,
/// `MemoryStore` without a database and in tests.
pub fn app<S>(state: AppState, store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = middleware::create_session_layer(store, state.config());

    Router::new()
        .merge(routes::routes())
        .nest_service("/static", ServeDir::new(STATIC_DIR))
        .layer(session_layer)
        .layer(from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Path recorded for a request. Query strings can carry access tokens
/// (`/auth/callback?access_token=...`) and are never logged.
fn logged_path(uri: &Uri) -> &str {
    uri.path()
}

fn request_span(request: &Request) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %logged_path(request.uri()),
        request_id = tracing::field::Empty,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_path_drops_query_string() {
        let uri: Uri = "/auth/callback?access_token=secret-token&next=%2Fcart"
            .parse()
            .unwrap();
        assert_eq!(logged_path(&uri), "/auth/callback");
    }
}
