//! Query cache layer.
//!
//! [`QueryClient`] caches service results under hierarchical [`QueryKey`]s
//! using `moka`. Routes read through the hooks in [`hooks`], which report a
//! [`QueryState`]; views turn that into a [`ViewState`] branch.
//!
//! - Concurrent fetches of the same key run the fetcher once.
//! - Errors are never cached.
//! - Mutations invalidate key prefixes; there is no cross-entity
//!   consistency beyond that.

pub mod hooks;
pub mod keys;

pub use keys::QueryKey;

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, warn};

use crate::config::QueryCacheConfig;
use crate::services::ServiceError;

type CachedValue = Arc<dyn Any + Send + Sync>;

/// Shared query cache. Cheap to clone.
#[derive(Clone)]
pub struct QueryClient {
    cache: Cache<QueryKey, CachedValue>,
}

impl QueryClient {
    #[must_use]
    pub fn new(config: QueryCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.capacity)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Return the cached value for `key`, or run `fetcher` and cache its
    /// result.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error. Failed fetches leave no cache entry.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<T, Arc<ServiceError>>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let miss_key = key.clone();
        let value = self
            .cache
            .try_get_with(key.clone(), async move {
                debug!(key = %miss_key, "query cache miss");
                fetcher().await.map(|v| Arc::new(v) as CachedValue)
            })
            .await?;

        if let Ok(typed) = value.downcast::<T>() {
            return Ok(T::clone(&typed));
        }

        // Two call sites disagree about the type stored under one key.
        warn!(%key, "query cache type mismatch; dropping entry");
        self.cache.invalidate(&key).await;
        Err(Arc::new(ServiceError::Internal(format!(
            "cached value for {key} has an unexpected type"
        ))))
    }

    /// Prime an entry.
    pub async fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        self.cache.insert(key, Arc::new(value)).await;
    }

    /// Whether `key` currently has a cached value.
    #[must_use]
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Drop `prefix` and every key nested under it.
    pub async fn invalidate(&self, prefix: &QueryKey) {
        let stale: Vec<Arc<QueryKey>> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.cache.invalidate(key.as_ref()).await;
        }
        debug!(%prefix, dropped = stale.len(), "query cache invalidated");
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

/// Result of a hook.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// The hook had nothing to fetch (missing identifier).
    Disabled,
    Error(Arc<ServiceError>),
    Success(T),
}

impl<T> QueryState<T> {
    #[must_use]
    pub fn from_result(result: Result<T, Arc<ServiceError>>) -> Self {
        match result {
            Ok(data) => Self::Success(data),
            Err(e) => Self::Error(e),
        }
    }

    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Pick the view branch, treating data for which `is_empty` holds as
    /// the empty state.
    #[must_use]
    pub fn into_view(self, is_empty: impl FnOnce(&T) -> bool) -> ViewState<T> {
        match self {
            Self::Disabled => ViewState::Loading,
            Self::Error(e) => ViewState::Error(e.user_message()),
            Self::Success(data) if is_empty(&data) => ViewState::Empty,
            Self::Success(data) => ViewState::Data(data),
        }
    }
}

/// What a data section renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState<T> {
    Loading,
    /// User-facing message; the view offers a retry.
    Error(String),
    Empty,
    Data(T),
}

impl<T> ViewState<T> {
    /// Transform the data branch, keeping the others.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ViewState<U> {
        match self {
            Self::Loading => ViewState::Loading,
            Self::Error(message) => ViewState::Error(message),
            Self::Empty => ViewState::Empty,
            Self::Data(data) => ViewState::Data(f(data)),
        }
    }
}
