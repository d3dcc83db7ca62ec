//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Server
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: <http://localhost:3000>)
//!
//! ## Services
//!
//! Missing service settings are not fatal. The affected feature is switched
//! off and [`StorefrontConfig::warnings`] explains why.
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection
//!   string; without it data is kept in memory
//! - `AUTH_URL`, `AUTH_ANON_KEY`, `AUTH_SIGN_IN_URL` - Hosted auth service
//! - `BILLING_ACCESS_TOKEN` - Billing API token
//! - `BILLING_ENVIRONMENT` - `sandbox` (default) or `production`
//! - `BILLING_API_URL` - Billing API base (default: <https://api.mercadopago.com>)
//! - `BILLING_WEBHOOK_SECRET` - Webhook signing secret
//!
//! ## Query cache
//! - `QUERY_CACHE_TTL_SECS` - Entry lifetime in seconds (default: 60)
//! - `QUERY_CACHE_CAPACITY` - Maximum entries (default: 1000)
//!
//! ## Observability
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_BILLING_API_URL: &str = "https://api.mercadopago.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` connection URL; `None` selects the in-memory backend
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: Url,
    /// Hosted auth service
    pub auth: Option<AuthConfig>,
    /// Billing API
    pub billing: Option<BillingConfig>,
    pub query_cache: QueryCacheConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    warnings: Vec<String>,
}

/// Hosted auth service configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AuthConfig {
    /// Auth API base, e.g. `https://project.auth.example.com/auth/v1`
    pub url: Url,
    /// Public API key sent as the `apikey` header
    pub anon_key: SecretString,
    /// Hosted sign-in page
    pub sign_in_url: Url,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("sign_in_url", &self.sign_in_url.as_str())
            .finish()
    }
}

/// Billing API environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BillingEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl FromStr for BillingEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(format!("expected 'sandbox' or 'production', got '{other}'")),
        }
    }
}

/// Billing API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct BillingConfig {
    pub access_token: SecretString,
    pub environment: BillingEnvironment,
    pub api_url: Url,
    pub webhook_secret: Option<SecretString>,
}

impl std::fmt::Debug for BillingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingConfig")
            .field("access_token", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("api_url", &self.api_url.as_str())
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Query cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCacheConfig {
    pub ttl: Duration,
    pub capacity: u64,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            capacity: 1000,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Source {
            lookup: |key: &str| lookup(key).filter(|v| !v.trim().is_empty()),
        };
        let mut warnings = Vec::new();

        let host = env.parse_or("STOREFRONT_HOST", "127.0.0.1")?;
        let port = env.parse_or("STOREFRONT_PORT", "3000")?;
        let base_url = env.url_or("STOREFRONT_BASE_URL", "http://localhost:3000")?;

        let database_url = env
            .get("STOREFRONT_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .map(SecretString::from);
        if database_url.is_none() {
            warnings.push(
                "STOREFRONT_DATABASE_URL is not set; using the in-memory store (data is lost on restart)"
                    .to_string(),
            );
        }

        let auth = AuthConfig::from_source(&env, &mut warnings)?;
        let billing = BillingConfig::from_source(&env, &mut warnings)?;

        let query_cache = QueryCacheConfig {
            ttl: Duration::from_secs(env.parse_or("QUERY_CACHE_TTL_SECS", "60")?),
            capacity: env.parse_or("QUERY_CACHE_CAPACITY", "1000")?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            auth,
            billing,
            query_cache,
            sentry_dsn: env.get("SENTRY_DSN"),
            sentry_environment: env.get("SENTRY_ENVIRONMENT"),
            warnings,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the public URL is served over HTTPS (secure cookies).
    #[must_use]
    pub fn uses_https(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// Problems worth logging at startup that did not prevent loading.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

impl AuthConfig {
    fn from_source<F>(env: &Source<F>, warnings: &mut Vec<String>) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match (
            env.url("AUTH_URL")?,
            env.get("AUTH_ANON_KEY"),
            env.url("AUTH_SIGN_IN_URL")?,
        ) {
            (Some(url), Some(anon_key), Some(sign_in_url)) => {
                if let Err(e) = validate_secret_strength(&anon_key, "AUTH_ANON_KEY") {
                    warnings.push(e.to_string());
                }
                Ok(Some(Self {
                    url,
                    anon_key: SecretString::from(anon_key),
                    sign_in_url,
                }))
            }
            (url, anon_key, sign_in_url) => {
                let missing: Vec<&str> = [
                    ("AUTH_URL", url.is_none()),
                    ("AUTH_ANON_KEY", anon_key.is_none()),
                    ("AUTH_SIGN_IN_URL", sign_in_url.is_none()),
                ]
                .into_iter()
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
                warnings.push(format!("{} not set; sign-in is disabled", missing.join(", ")));
                Ok(None)
            }
        }
    }
}

impl BillingConfig {
    fn from_source<F>(env: &Source<F>, warnings: &mut Vec<String>) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = env.parse_or("BILLING_ENVIRONMENT", "sandbox")?;
        let api_url = env.url_or("BILLING_API_URL", DEFAULT_BILLING_API_URL)?;

        let Some(access_token) = env.get("BILLING_ACCESS_TOKEN") else {
            warnings.push("BILLING_ACCESS_TOKEN not set; checkout is disabled".to_string());
            return Ok(None);
        };
        if let Err(e) = validate_secret_strength(&access_token, "BILLING_ACCESS_TOKEN") {
            warnings.push(e.to_string());
        }

        let webhook_secret = env.get("BILLING_WEBHOOK_SECRET");
        if let Some(secret) = &webhook_secret
            && let Err(e) = validate_secret_strength(secret, "BILLING_WEBHOOK_SECRET")
        {
            warnings.push(e.to_string());
        }

        Ok(Some(Self {
            access_token: SecretString::from(access_token),
            environment,
            api_url,
            webhook_secret: webhook_secret.map(SecretString::from),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with parsing helpers.
struct Source<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Source<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    /// Parse a variable, falling back to `default` when absent.
    fn parse_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .unwrap_or_else(|| default.to_string())
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    fn url(&self, key: &str) -> Result<Option<Url>, ConfigError> {
        self.get(key)
            .map(|value| {
                Url::parse(value.trim())
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }

    fn url_or(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let value = self.get(key).unwrap_or_else(|| default.to_string());
        Url::parse(value.trim())
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Check that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
