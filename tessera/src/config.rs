//! Token manager configuration

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backoff::LockRetryConfig;
use crate::cache::CustomCache;
use crate::error::ConfigError;
use crate::lock::DEFAULT_LOCK_TTL;
use crate::tenant::Tenant;
use crate::{AppId, AppSecret};

/// Whether refreshes are coordinated across processes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Use a distributed lock if the cache backend can provide one, otherwise
    /// coordinate within the process only
    #[default]
    Auto,
    /// Require a distributed lock; construction fails if none is available
    On,
    /// Coordinate within the process only
    Off,
}

impl LockStrategy {
    /// The lowercase name of the strategy
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provided name does not match a known lock strategy
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown lock strategy '{name}', expected one of: auto, on, off")]
pub struct UnknownLockStrategy {
    name: String,
}

impl FromStr for LockStrategy {
    type Err = UnknownLockStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(UnknownLockStrategy { name: s.to_owned() }),
        }
    }
}

/// Configuration for a [`TokenManager`](crate::TokenManager)
///
/// Several cache backends may be configured at once. Exactly one is used,
/// chosen in priority order: a custom cache, then a Redis cluster, then a
/// single Redis node, then an in-process memory cache.
pub struct ManagerConfig {
    pub(crate) app_id: AppId,
    pub(crate) app_secret: AppSecret,
    pub(crate) namespace: Option<String>,
    pub(crate) cache: Option<CustomCache>,
    #[cfg(feature = "redis")]
    pub(crate) redis: Option<redis::aio::ConnectionManager>,
    #[cfg(feature = "redis")]
    pub(crate) redis_cluster: Option<redis::cluster_async::ClusterConnection>,
    pub(crate) lock_strategy: LockStrategy,
    pub(crate) lock_ttl: Duration,
    pub(crate) lock_retry: LockRetryConfig,
}

impl ManagerConfig {
    /// Constructs a configuration for one tenant using an in-memory cache
    pub fn new(app_id: AppId, app_secret: AppSecret) -> Self {
        Self {
            app_id,
            app_secret,
            namespace: None,
            cache: None,
            #[cfg(feature = "redis")]
            redis: None,
            #[cfg(feature = "redis")]
            redis_cluster: None,
            lock_strategy: LockStrategy::default(),
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_retry: LockRetryConfig::default(),
        }
    }

    /// Sets the namespace prefixing cache and lock keys
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Uses a caller-supplied cache
    pub fn with_cache(mut self, cache: CustomCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Uses a single Redis node as the cache
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    pub fn with_redis(mut self, conn: redis::aio::ConnectionManager) -> Self {
        self.redis = Some(conn);
        self
    }

    /// Uses a Redis cluster as the cache
    #[cfg(feature = "redis")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
    pub fn with_redis_cluster(mut self, conn: redis::cluster_async::ClusterConnection) -> Self {
        self.redis_cluster = Some(conn);
        self
    }

    /// Sets the distributed lock strategy
    pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Self {
        self.lock_strategy = strategy;
        self
    }

    /// Sets the lease placed on the distributed refresh lock
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the retry policy used by the Redis lock while it is contended
    pub fn with_lock_retry(mut self, retry: LockRetryConfig) -> Self {
        self.lock_retry = retry;
        self
    }

    /// Checks that the tenant identity is complete
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.as_str().trim().is_empty() {
            return Err(ConfigError::MissingAppId);
        }
        if self.app_secret.as_str().is_empty() {
            return Err(ConfigError::MissingAppSecret);
        }
        Ok(())
    }

    pub(crate) fn tenant(&self) -> Tenant {
        let tenant = Tenant::new(self.app_id.clone(), self.app_secret.clone());
        match &self.namespace {
            Some(namespace) => tenant.with_namespace(namespace.clone()),
            None => tenant,
        }
    }
}

impl fmt::Debug for ManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct("ManagerConfig");
        s.field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret)
            .field("namespace", &self.namespace)
            .field("cache", &self.cache);
        #[cfg(feature = "redis")]
        s.field("redis", &self.redis.is_some())
            .field("redis_cluster", &self.redis_cluster.is_some());
        s.field("lock_strategy", &self.lock_strategy)
            .field("lock_ttl", &self.lock_ttl)
            .field("lock_retry", &self.lock_retry)
            .finish()
    }
}
