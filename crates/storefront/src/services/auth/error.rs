//! Authentication error types.

use thiserror::Error;

/// Errors that can occur when talking to the hosted auth API.
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The auth API answered with an unexpected status.
    #[error("auth API returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The response body could not be parsed.
    #[error("invalid auth API response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured URL could not be combined with a path.
    #[error("invalid auth URL: {0}")]
    Url(#[from] url::ParseError),
}
