//! Selection of the cache and lock backends

use std::sync::Arc;

use crate::backoff::LockRetryConfig;
use crate::cache::{CustomCache, InMemoryTokenCache, TokenCache};
use crate::config::{LockStrategy, ManagerConfig};
use crate::error::ConfigError;
use crate::lock::TokenLocker;

/// The cache backend selected for a manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheChoice {
    /// A caller-supplied cache
    Custom {
        /// Whether the cache brings its own distributed lock
        bundled_locker: bool,
    },
    /// A Redis cluster
    RedisCluster,
    /// A single Redis node
    Redis,
    /// The in-process memory cache
    Memory,
}

/// The distributed lock that accompanies the selected cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockerPlan {
    /// Refreshes are coordinated within the process only
    None,
    /// The lock bundled with a custom cache
    Bundled,
    /// A lock held in the Redis cluster
    RedisCluster,
    /// A lock held in the single Redis node
    Redis,
}

/// Decides which distributed lock, if any, to use
///
/// `Off` never locks. `Auto` locks whenever the cache can provide a lock,
/// while `On` fails when it cannot.
pub fn plan_locker(strategy: LockStrategy, choice: CacheChoice) -> Result<LockerPlan, ConfigError> {
    let available = match choice {
        CacheChoice::Custom {
            bundled_locker: true,
        } => Some(LockerPlan::Bundled),
        CacheChoice::RedisCluster => Some(LockerPlan::RedisCluster),
        CacheChoice::Redis => Some(LockerPlan::Redis),
        CacheChoice::Custom {
            bundled_locker: false,
        }
        | CacheChoice::Memory => None,
    };

    match (strategy, available) {
        (LockStrategy::Off, _) => Ok(LockerPlan::None),
        (_, Some(plan)) => Ok(plan),
        (LockStrategy::Auto, None) => Ok(LockerPlan::None),
        (LockStrategy::On, None) => Err(ConfigError::LockBackendMissing),
    }
}

/// Decides which cache backend to use
///
/// `custom` carries whether a custom cache was supplied and, if so, whether it
/// bundles a lock. A custom cache wins over a Redis cluster, which wins over a
/// single Redis node, which wins over memory. Supplying several is not an
/// error; the lower-priority backends are ignored.
pub fn select_cache(custom: Option<bool>, cluster: bool, redis: bool) -> CacheChoice {
    match (custom, cluster, redis) {
        (Some(bundled_locker), _, _) => CacheChoice::Custom { bundled_locker },
        (None, true, _) => CacheChoice::RedisCluster,
        (None, false, true) => CacheChoice::Redis,
        (None, false, false) => CacheChoice::Memory,
    }
}

enum Selected<'a> {
    Custom(&'a CustomCache),
    #[cfg(feature = "redis")]
    RedisCluster(&'a redis::cluster_async::ClusterConnection),
    #[cfg(feature = "redis")]
    Redis(&'a redis::aio::ConnectionManager),
    Memory,
}

impl<'a> Selected<'a> {
    fn from_config(config: &'a ManagerConfig) -> Self {
        #[cfg(feature = "redis")]
        let (cluster, redis) = (config.redis_cluster.is_some(), config.redis.is_some());
        #[cfg(not(feature = "redis"))]
        let (cluster, redis) = (false, false);

        let choice = select_cache(
            config.cache.as_ref().map(|custom| custom.has_locker()),
            cluster,
            redis,
        );

        match choice {
            CacheChoice::Custom { .. } => config.cache.as_ref().map(Self::Custom),
            #[cfg(feature = "redis")]
            CacheChoice::RedisCluster => config.redis_cluster.as_ref().map(Self::RedisCluster),
            #[cfg(feature = "redis")]
            CacheChoice::Redis => config.redis.as_ref().map(Self::Redis),
            _ => None,
        }
        .unwrap_or(Self::Memory)
    }

    fn choice(&self) -> CacheChoice {
        match self {
            Self::Custom(custom) => CacheChoice::Custom {
                bundled_locker: custom.has_locker(),
            },
            #[cfg(feature = "redis")]
            Self::RedisCluster(_) => CacheChoice::RedisCluster,
            #[cfg(feature = "redis")]
            Self::Redis(_) => CacheChoice::Redis,
            Self::Memory => CacheChoice::Memory,
        }
    }

    fn cache(&self) -> Arc<dyn TokenCache> {
        match self {
            Self::Custom(custom) => custom.cache(),
            #[cfg(feature = "redis")]
            Self::RedisCluster(conn) => Arc::new(crate::cache::RedisTokenCache::new((*conn).clone())),
            #[cfg(feature = "redis")]
            Self::Redis(conn) => Arc::new(crate::cache::RedisTokenCache::new((*conn).clone())),
            Self::Memory => Arc::new(InMemoryTokenCache::new()),
        }
    }

    #[cfg_attr(not(feature = "redis"), allow(unused_variables))]
    fn locker(&self, plan: LockerPlan, retry: &LockRetryConfig) -> Option<Arc<dyn TokenLocker>> {
        if plan == LockerPlan::None {
            return None;
        }

        match self {
            Self::Custom(custom) => custom.locker(),
            #[cfg(feature = "redis")]
            Self::RedisCluster(conn) => Some(Arc::new(
                crate::lock::RedisLocker::new((*conn).clone()).with_retry(retry.clone()),
            )),
            #[cfg(feature = "redis")]
            Self::Redis(conn) => Some(Arc::new(
                crate::lock::RedisLocker::new((*conn).clone()).with_retry(retry.clone()),
            )),
            Self::Memory => None,
        }
    }
}

/// The backends a manager runs against, fixed at construction
#[derive(Clone)]
pub(crate) struct Backends {
    pub(crate) choice: CacheChoice,
    pub(crate) plan: LockerPlan,
    pub(crate) strategy: LockStrategy,
    pub(crate) cache: Arc<dyn TokenCache>,
    pub(crate) locker: Option<Arc<dyn TokenLocker>>,
}

impl Backends {
    pub(crate) fn resolve(config: &ManagerConfig) -> Result<Self, ConfigError> {
        let selected = Selected::from_config(config);
        let choice = selected.choice();
        let plan = plan_locker(config.lock_strategy, choice)?;

        tracing::debug!(
            cache = ?choice,
            locker = ?plan,
            strategy = %config.lock_strategy,
            "resolved token backends"
        );

        Ok(Self {
            choice,
            plan,
            strategy: config.lock_strategy,
            cache: selected.cache(),
            locker: selected.locker(plan, &config.lock_retry),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::error::{CacheError, LockError};
    use crate::lock::LockGuard;
    use crate::{AppId, AppSecret, TokenRecord};

    #[test]
    fn locker_plan_table() {
        use CacheChoice as C;
        use LockStrategy::*;
        use LockerPlan as P;

        let bundled = C::Custom {
            bundled_locker: true,
        };
        let plain = C::Custom {
            bundled_locker: false,
        };

        let table = [
            (Auto, bundled, Ok(P::Bundled)),
            (Auto, plain, Ok(P::None)),
            (Auto, C::RedisCluster, Ok(P::RedisCluster)),
            (Auto, C::Redis, Ok(P::Redis)),
            (Auto, C::Memory, Ok(P::None)),
            (On, bundled, Ok(P::Bundled)),
            (On, plain, Err(ConfigError::LockBackendMissing)),
            (On, C::RedisCluster, Ok(P::RedisCluster)),
            (On, C::Redis, Ok(P::Redis)),
            (On, C::Memory, Err(ConfigError::LockBackendMissing)),
            (Off, bundled, Ok(P::None)),
            (Off, plain, Ok(P::None)),
            (Off, C::RedisCluster, Ok(P::None)),
            (Off, C::Redis, Ok(P::None)),
            (Off, C::Memory, Ok(P::None)),
        ];

        for (strategy, choice, expected) in table {
            assert_eq!(
                plan_locker(strategy, choice),
                expected,
                "strategy={strategy}, choice={choice:?}"
            );
        }
    }

    #[test]
    fn cache_priority_table() {
        use CacheChoice as C;

        let bundled = C::Custom {
            bundled_locker: true,
        };
        let plain = C::Custom {
            bundled_locker: false,
        };

        let table = [
            (None, false, false, C::Memory),
            (None, false, true, C::Redis),
            (None, true, false, C::RedisCluster),
            (None, true, true, C::RedisCluster),
            (Some(false), false, false, plain),
            (Some(false), false, true, plain),
            (Some(false), true, false, plain),
            (Some(false), true, true, plain),
            (Some(true), false, false, bundled),
            (Some(true), false, true, bundled),
            (Some(true), true, false, bundled),
            (Some(true), true, true, bundled),
        ];

        for (custom, cluster, redis, expected) in table {
            assert_eq!(
                select_cache(custom, cluster, redis),
                expected,
                "custom={custom:?}, cluster={cluster}, redis={redis}"
            );
        }
    }

    struct NoopBackend;

    #[async_trait]
    impl TokenCache for NoopBackend {
        async fn get(&self, _key: &str) -> Result<Option<TokenRecord>, CacheError> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _token: &TokenRecord, _ttl: std::time::Duration) -> Result<(), CacheError> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    #[async_trait]
    impl TokenLocker for NoopBackend {
        async fn lock(
            &self,
            _cx: &CancellationToken,
            key: &str,
            _ttl: std::time::Duration,
        ) -> Result<LockGuard, LockError> {
            Ok(LockGuard::new(key, || async { Ok(()) }))
        }
    }

    fn config() -> ManagerConfig {
        ManagerConfig::new(AppId::from_static("id"), AppSecret::from_static("secret"))
    }

    mod when_nothing_is_configured {
        use super::*;

        #[test]
        fn memory_is_used_without_a_lock() {
            let backends = Backends::resolve(&config()).unwrap();
            assert_eq!(backends.choice, CacheChoice::Memory);
            assert_eq!(backends.plan, LockerPlan::None);
            assert!(backends.locker.is_none());
        }

        #[test]
        fn requiring_a_lock_fails() {
            let config = config().with_lock_strategy(LockStrategy::On);
            assert_eq!(
                Backends::resolve(&config).err(),
                Some(ConfigError::LockBackendMissing)
            );
        }
    }

    mod when_a_custom_cache_is_configured {
        use super::*;

        #[test]
        fn its_bundled_lock_is_picked_up() {
            let config = config().with_cache(CustomCache::with_locker(NoopBackend));
            let backends = Backends::resolve(&config).unwrap();
            assert_eq!(
                backends.choice,
                CacheChoice::Custom {
                    bundled_locker: true
                }
            );
            assert_eq!(backends.plan, LockerPlan::Bundled);
            assert!(backends.locker.is_some());
        }

        #[test]
        fn its_bundled_lock_is_ignored_when_locking_is_off() {
            let config = config()
                .with_cache(CustomCache::with_locker(NoopBackend))
                .with_lock_strategy(LockStrategy::Off);
            let backends = Backends::resolve(&config).unwrap();
            assert_eq!(backends.plan, LockerPlan::None);
            assert!(backends.locker.is_none());
        }

        #[test]
        fn a_plain_cache_cannot_satisfy_a_required_lock() {
            let config = config()
                .with_cache(CustomCache::new(NoopBackend))
                .with_lock_strategy(LockStrategy::On);
            assert_eq!(
                Backends::resolve(&config).err(),
                Some(ConfigError::LockBackendMissing)
            );
        }
    }
}
