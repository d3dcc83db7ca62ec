//! Access token resolution against the hosted auth service.
//!
//! Sign-in happens entirely on the hosted auth pages. After a successful
//! sign-in the visitor is sent back to `/auth/callback` with an access
//! token, which is resolved here into a [`CurrentUser`] via
//! `GET {auth_url}/user`.

mod error;

pub use error::AuthError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use cornershop_core::UserId;

use crate::config::AuthConfig;
use crate::models::CurrentUser;

/// Resolves access tokens to users.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Look up the user an access token belongs to.
    ///
    /// Returns `Ok(None)` for an expired or revoked token.
    async fn current_user(&self, access_token: &str) -> Result<Option<CurrentUser>, AuthError>;

    /// Hosted sign-in page that returns to `redirect_to` afterwards.
    fn sign_in_url(&self, redirect_to: &str) -> String;
}

#[derive(Debug, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthUserResponse {
    id: UserId,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<AuthUserResponse> for CurrentUser {
    fn from(user: AuthUserResponse) -> Self {
        Self {
            id: user.id,
            email: user.email.unwrap_or_default(),
            full_name: user.user_metadata.and_then(|m| m.full_name),
        }
    }
}

/// HTTP client for the hosted auth API.
#[derive(Clone)]
pub struct AuthClient {
    inner: Arc<AuthClientInner>,
}

struct AuthClientInner {
    client: reqwest::Client,
    user_endpoint: Url,
    sign_in_url: Url,
    anon_key: SecretString,
}

impl AuthClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Http` if the HTTP client cannot be built and
    /// `AuthError::Url` if the user endpoint cannot be derived.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let user_endpoint = base.join("user")?;

        Ok(Self {
            inner: Arc::new(AuthClientInner {
                client,
                user_endpoint,
                sign_in_url: config.sign_in_url.clone(),
                anon_key: config.anon_key.clone(),
            }),
        })
    }
}

#[async_trait]
impl AuthProvider for AuthClient {
    #[instrument(skip(self, access_token))]
    async fn current_user(&self, access_token: &str) -> Result<Option<CurrentUser>, AuthError> {
        let response = self
            .inner
            .client
            .get(self.inner.user_endpoint.clone())
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            debug!(%status, "access token rejected");
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "auth API error");
            return Err(AuthError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let user: AuthUserResponse = serde_json::from_str(&body)?;
        Ok(Some(user.into()))
    }

    fn sign_in_url(&self, redirect_to: &str) -> String {
        let mut url = self.inner.sign_in_url.clone();
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        url.to_string()
    }
}
