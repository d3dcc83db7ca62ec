//! Request ID middleware for request tracing and correlation.
//!
//! Reuses an upstream `x-request-id` when it looks sane, otherwise
//! generates a UUID v4. The id is recorded in the current span, tagged on
//! the Sentry scope, and echoed in the response headers.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Span;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Accept an upstream id only if it is short printable ASCII.
fn upstream_id(value: Option<&HeaderValue>) -> Option<String> {
    let id = value?.to_str().ok()?.trim();
    let valid = !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    valid.then(|| id.to_string())
}

/// Middleware that ensures every request has a request ID.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = upstream_id(request.headers().get(REQUEST_ID_HEADER))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Span::current().record("request_id", &request_id);

    sentry::configure_scope(|scope| {
        scope.set_tag("request_id", &request_id);
    });

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_id_is_reused() {
        let value = HeaderValue::from_static("abc-123.x_y");
        assert_eq!(upstream_id(Some(&value)).as_deref(), Some("abc-123.x_y"));
    }

    #[test]
    fn test_suspicious_upstream_id_is_replaced() {
        assert!(upstream_id(None).is_none());
        assert!(upstream_id(Some(&HeaderValue::from_static("   "))).is_none());
        assert!(upstream_id(Some(&HeaderValue::from_static("a b;c"))).is_none());
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        assert!(upstream_id(Some(&HeaderValue::from_str(&long).unwrap_or_else(|_| {
            HeaderValue::from_static("x y")
        })))
        .is_none());
    }
}
