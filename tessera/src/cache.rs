//! Token caches

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::error::CacheError;
use crate::lock::TokenLocker;
use crate::TokenRecord;

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::InMemoryTokenCache;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub use self::redis::{RedisClusterTokenCache, RedisTokenCache, SingleNodeTokenCache};

/// Storage for token records, keyed by a tenant's cache key
///
/// Implementations are shared between all concurrent callers and, for remote
/// stores, between processes. A [`TokenManager`](crate::TokenManager) drops
/// in-flight futures when its caller cancels, so every operation must be
/// cancel-safe.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Reads the record stored under `key`
    ///
    /// A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<TokenRecord>, CacheError>;

    /// Stores `token` under `key`, expiring it natively after `ttl`
    async fn set(&self, key: &str, token: &TokenRecord, ttl: Duration) -> Result<(), CacheError>;

    /// Removes any record stored under `key`
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// A caller-supplied cache, optionally bringing its own distributed lock
///
/// A custom cache always takes priority over any other configured backend.
#[derive(Clone)]
pub struct CustomCache {
    cache: Arc<dyn TokenCache>,
    locker: Option<Arc<dyn TokenLocker>>,
}

impl CustomCache {
    /// Uses `cache` for storage only
    pub fn new<T>(cache: T) -> Self
    where
        T: TokenCache + 'static,
    {
        Self {
            cache: Arc::new(cache),
            locker: None,
        }
    }

    /// Uses a value that implements both storage and locking
    ///
    /// The lock is picked up automatically unless the lock strategy is
    /// [`Off`](crate::LockStrategy::Off).
    pub fn with_locker<T>(backend: T) -> Self
    where
        T: TokenCache + TokenLocker + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            cache: backend.clone(),
            locker: Some(backend),
        }
    }

    /// Uses a shared value that implements both storage and locking
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: TokenCache + TokenLocker + 'static,
    {
        Self {
            cache: backend.clone(),
            locker: Some(backend),
        }
    }

    /// Whether this cache brings its own distributed lock
    #[inline]
    pub fn has_locker(&self) -> bool {
        self.locker.is_some()
    }

    pub(crate) fn cache(&self) -> Arc<dyn TokenCache> {
        self.cache.clone()
    }

    pub(crate) fn locker(&self) -> Option<Arc<dyn TokenLocker>> {
        self.locker.clone()
    }
}

impl fmt::Debug for CustomCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CustomCache")
            .field("has_locker", &self.has_locker())
            .finish()
    }
}

#[async_trait]
impl<T: TokenCache + ?Sized> TokenCache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<TokenRecord>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, token: &TokenRecord, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, token, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        (**self).delete(key).await
    }
}
