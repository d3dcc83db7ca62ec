//! Hosted checkout through the billing API.
//!
//! Checkout is redirect based: a checkout preference is created from the
//! cart and the visitor is sent to the processor's hosted page, which
//! returns them to `/checkout/{success,failure,pending}`. No payment data
//! passes through this application.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use cornershop_core::{CartId, CurrencyCode, ProductId};

use crate::config::{BillingConfig, BillingEnvironment};
use crate::models::CartItem;

/// Errors from the billing API.
#[derive(Debug, Error)]
pub enum BillingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The billing API answered with an error status.
    #[error("billing API returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Rate limited by the billing API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The response body could not be parsed.
    #[error("invalid billing API response: {0}")]
    Parse(#[from] serde_json::Error),

    /// A URL could not be built.
    #[error("invalid billing URL: {0}")]
    Url(#[from] url::ParseError),

    /// Checkout was attempted without any purchasable lines.
    #[error("cart is empty")]
    EmptyCart,
}

/// One purchasable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Everything needed to start a hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub cart_id: CartId,
    pub payer_email: Option<String>,
    pub lines: Vec<CheckoutLine>,
}

impl CheckoutRequest {
    /// Build a request from cart items with embedded products.
    ///
    /// Lines whose product is missing are skipped.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::EmptyCart` if no purchasable line remains.
    pub fn from_cart(
        cart_id: CartId,
        items: &[CartItem],
        payer_email: Option<String>,
    ) -> Result<Self, BillingError> {
        let lines: Vec<_> = items
            .iter()
            .filter(|item| item.quantity > 0)
            .filter_map(|item| {
                item.product.as_ref().map(|product| CheckoutLine {
                    product_id: product.id,
                    title: product.title.clone(),
                    quantity: item.quantity,
                    unit_price: product.price,
                })
            })
            .collect();

        if lines.is_empty() {
            return Err(BillingError::EmptyCart);
        }
        Ok(Self {
            cart_id,
            payer_email,
            lines,
        })
    }
}

/// A created checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub preference_id: String,
    /// Hosted page to send the visitor to.
    pub redirect_url: String,
}

/// Starts hosted checkouts.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct PreferenceItem<'a> {
    id: String,
    title: &'a str,
    quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    unit_price: Decimal,
    currency_id: &'static str,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct BackUrls {
    success: String,
    failure: String,
    pending: String,
}

#[derive(Debug, Serialize)]
struct PreferenceBody<'a> {
    items: Vec<PreferenceItem<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Payer<'a>>,
    back_urls: BackUrls,
    auto_return: &'static str,
    external_reference: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: String,
    sandbox_init_point: Option<String>,
}

// =============================================================================
// BillingClient
// =============================================================================

/// Client for the billing API.
#[derive(Clone)]
pub struct BillingClient {
    inner: Arc<BillingClientInner>,
}

struct BillingClientInner {
    client: reqwest::Client,
    preferences_endpoint: Url,
    access_token: SecretString,
    environment: BillingEnvironment,
    back_urls_base: Url,
}

impl BillingClient {
    /// Create a client from configuration.
    ///
    /// `base_url` is the storefront's public URL, used for return pages.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Http` if the HTTP client cannot be built and
    /// `BillingError::Url` if the endpoint cannot be derived.
    pub fn new(config: &BillingConfig, base_url: &Url) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let preferences_endpoint = join_under(&config.api_url, "checkout/preferences")?;

        Ok(Self {
            inner: Arc::new(BillingClientInner {
                client,
                preferences_endpoint,
                access_token: config.access_token.clone(),
                environment: config.environment,
                back_urls_base: base_url.clone(),
            }),
        })
    }

    fn back_url(&self, outcome: &str) -> Result<String, BillingError> {
        Ok(join_under(&self.inner.back_urls_base, &format!("checkout/{outcome}"))?.to_string())
    }
}

/// Resolve `path` below `base`, keeping any path prefix `base` carries
/// (`https://proxy.example/billing` + `checkout/preferences` gives
/// `https://proxy.example/billing/checkout/preferences`).
fn join_under(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let prefixed = format!("{}/", base.path());
        base.set_path(&prefixed);
    }
    base.join(path.trim_start_matches('/'))
}

#[async_trait]
impl CheckoutGateway for BillingClient {
    #[instrument(skip(self, request), fields(cart = %request.cart_id, lines = request.lines.len()))]
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingError> {
        if request.lines.is_empty() {
            return Err(BillingError::EmptyCart);
        }

        let body = PreferenceBody {
            items: request
                .lines
                .iter()
                .map(|line| PreferenceItem {
                    id: line.product_id.to_string(),
                    title: &line.title,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    currency_id: CurrencyCode::USD.code(),
                })
                .collect(),
            payer: request.payer_email.as_deref().map(|email| Payer { email }),
            back_urls: BackUrls {
                success: self.back_url("success")?,
                failure: self.back_url("failure")?,
                pending: self.back_url("pending")?,
            },
            auto_return: "approved",
            external_reference: request.cart_id.to_string(),
        };

        let response = self
            .inner
            .client
            .post(self.inner.preferences_endpoint.clone())
            .bearer_auth(self.inner.access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BillingError::RateLimited(retry_after));
        }

        let text = response.text().await?;
        if !status.is_success() {
            warn!(%status, "billing API error");
            return Err(BillingError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let preference: PreferenceResponse = serde_json::from_str(&text)?;
        let redirect_url = match self.inner.environment {
            BillingEnvironment::Sandbox => preference
                .sandbox_init_point
                .unwrap_or(preference.init_point),
            BillingEnvironment::Production => preference.init_point,
        };
        info!(preference = %preference.id, "checkout preference created");

        Ok(CheckoutSession {
            preference_id: preference.id,
            redirect_url,
        })
    }
}
