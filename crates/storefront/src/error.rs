//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Every error response also carries an `HX-Trigger` error toast, so HTMX
//! requests that fail without swapping still tell the visitor what happened.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::notify::{HxTrigger, Toast};
use crate::services::ServiceError;
use crate::services::auth::AuthError;
use crate::services::billing::BillingError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service call failed.
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// A cached query failed.
    #[error("Query error: {0}")]
    Query(#[from] Arc<ServiceError>),

    /// The auth API failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// The billing API failed.
    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    /// Session store failure.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A feature whose backing service is not configured.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error is our fault and should reach Sentry.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::Service(err) => err.is_server_error(),
            Self::Query(err) => err.is_server_error(),
            Self::Billing(err) => !matches!(err, BillingError::EmptyCart),
            Self::Auth(_) | Self::Session(_) | Self::Internal(_) => true,
            Self::NotFound(_) | Self::Unauthorized(_) | Self::BadRequest(_) | Self::Unavailable(_) => {
                false
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => service_status(err),
            Self::Query(err) => service_status(err),
            Self::Auth(_) => StatusCode::BAD_GATEWAY,
            Self::Billing(err) => match err {
                BillingError::EmptyCart => StatusCode::BAD_REQUEST,
                BillingError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to show to visitors.
    #[must_use]
    pub fn user_message(&self) -> String {
        // Don't expose internal error details to clients
        match self {
            Self::Service(err) => err.user_message(),
            Self::Query(err) => err.user_message(),
            Self::Auth(_) => "Sign-in is temporarily unavailable. Please try again.".to_string(),
            Self::Billing(BillingError::EmptyCart) => "Your cart is empty.".to_string(),
            Self::Billing(_) => "Checkout is temporarily unavailable. Please try again.".to_string(),
            Self::Session(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::NotFound(_) | Self::Unauthorized(_) | Self::BadRequest(_) | Self::Unavailable(_) => {
                self.to_string()
            }
        }
    }
}

const fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Repository(RepositoryError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        ServiceError::Repository(_) | ServiceError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ServiceError::Forbidden => StatusCode::FORBIDDEN,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let message = self.user_message();
        (
            self.status(),
            HxTrigger::toast(Toast::error(message.clone())),
            message,
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "12")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

/// `before_send` hook: drop query strings and cookies from request data.
///
/// The auth callback receives the access token in its query string.
#[must_use]
pub fn scrub_event(
    mut event: sentry::protocol::Event<'static>,
) -> Option<sentry::protocol::Event<'static>> {
    if let Some(request) = event.request.as_mut() {
        if let Some(url) = request.url.as_mut() {
            url.set_query(None);
        }
        request.query_string = None;
        request.cookies = None;
    }
    Some(event)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::notify::HX_TRIGGER;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Unavailable("checkout".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Billing(BillingError::RateLimited(3))),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            get_status(AppError::Billing(BillingError::EmptyCart)),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_cached_query_errors_keep_service_status() {
        let err = AppError::Query(Arc::new(ServiceError::NotFound("order")));
        assert!(!err.is_server_error());
        assert_eq!(get_status(err), StatusCode::NOT_FOUND);

        let err = AppError::Query(Arc::new(ServiceError::Repository(
            RepositoryError::Unavailable("down".to_string()),
        )));
        assert!(err.is_server_error());
        assert_eq!(get_status(err), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_scrub_event_drops_query_and_cookies() {
        let event = sentry::protocol::Event {
            request: Some(sentry::protocol::Request {
                url: Some(
                    "https://shop.example/auth/callback?access_token=secret"
                        .parse()
                        .unwrap(),
                ),
                query_string: Some("access_token=secret".to_string()),
                cookies: Some("cs_session=abc".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let scrubbed = scrub_event(event).unwrap();
        let request = scrubbed.request.unwrap();
        assert_eq!(
            request.url.unwrap().as_str(),
            "https://shop.example/auth/callback"
        );
        assert!(request.query_string.is_none());
        assert!(request.cookies.is_none());
    }

    #[test]
    fn test_service_errors_map_to_statuses() {
        assert_eq!(
            get_status(ServiceError::NotFound("order").into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(ServiceError::InvalidInput("bad".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(ServiceError::Forbidden.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(
                ServiceError::Repository(RepositoryError::Unavailable("down".to_string())).into()
            ),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_service_error_is_server_error() {
        let err: AppError = ServiceError::Internal("cache key clash".to_string()).into();
        assert!(err.is_server_error());
        assert!(!err.user_message().contains("cache"));
        assert_eq!(get_status(err), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err: AppError =
            ServiceError::Repository(RepositoryError::InvalidQuery("select secret".to_string()))
                .into();
        assert!(!err.user_message().contains("secret"));
    }

    #[test]
    fn test_error_response_carries_toast() {
        let response = AppError::BadRequest("Quantity must be positive".to_string()).into_response();
        let trigger = response.headers().get(HX_TRIGGER).unwrap().to_str().unwrap();
        assert!(trigger.contains("Quantity must be positive"));
        assert!(trigger.contains("\"error\""));
    }
}
