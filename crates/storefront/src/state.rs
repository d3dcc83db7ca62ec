//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Persistence;
use crate::query::QueryClient;
use crate::services::auth::{AuthClient, AuthError, AuthProvider};
use crate::services::billing::{BillingClient, BillingError, CheckoutGateway};

/// Error building the external API clients.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("auth client: {0}")]
    Auth(#[from] AuthError),
    #[error("billing client: {0}")]
    Billing(#[from] BillingError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the persistence client, the query cache and the external API clients.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    db: Arc<dyn Persistence>,
    queries: QueryClient,
    auth: Option<Arc<dyn AuthProvider>>,
    billing: Option<Arc<dyn CheckoutGateway>>,
}

impl AppState {
    /// Create application state, building the auth and billing clients for
    /// whichever of them is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured client cannot be built.
    pub fn new(config: StorefrontConfig, db: Arc<dyn Persistence>) -> Result<Self, StateError> {
        let auth = config
            .auth
            .as_ref()
            .map(AuthClient::new)
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn AuthProvider>);

        let billing = config
            .billing
            .as_ref()
            .map(|billing| BillingClient::new(billing, &config.base_url))
            .transpose()?
            .map(|client| Arc::new(client) as Arc<dyn CheckoutGateway>);

        Ok(Self::from_parts(config, db, auth, billing))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        db: Arc<dyn Persistence>,
        auth: Option<Arc<dyn AuthProvider>>,
        billing: Option<Arc<dyn CheckoutGateway>>,
    ) -> Self {
        let queries = QueryClient::new(config.query_cache);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                queries,
                auth,
                billing,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the persistence client.
    #[must_use]
    pub fn db(&self) -> &dyn Persistence {
        self.inner.db.as_ref()
    }

    /// Get the query cache.
    #[must_use]
    pub fn queries(&self) -> &QueryClient {
        &self.inner.queries
    }

    /// Get the auth client, if sign-in is configured.
    #[must_use]
    pub fn auth(&self) -> Option<&dyn AuthProvider> {
        self.inner.auth.as_deref()
    }

    /// Get the checkout gateway, if billing is configured.
    #[must_use]
    pub fn billing(&self) -> Option<&dyn CheckoutGateway> {
        self.inner.billing.as_deref()
    }
}
