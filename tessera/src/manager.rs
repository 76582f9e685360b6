//! The token manager

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backends, CacheChoice};
use crate::clock::{Clock, System};
use crate::config::{LockStrategy, ManagerConfig};
use crate::error::{ConfigError, TokenError};
use crate::issuer::TokenIssuer;
use crate::tenant::Tenant;
use crate::{AccessToken, TokenRecord};

/// Provides a tenant's access token, refreshing it through the issuer when needed
///
/// Callers first check the cache. On a miss they serialize behind a mutex
/// owned by the manager and check again, then take the distributed lock (if
/// one is configured) and check a third time. Only the caller that still
/// finds nothing usable contacts the issuer, writes the new token to the
/// cache, and releases the locks in reverse order. However many callers
/// arrive at once, in this process or elsewhere, the issuer sees one request
/// per refresh.
///
/// A token is served from the cache only while more than
/// [`REFRESH_SKEW`](crate::REFRESH_SKEW) remains before its expiry.
///
/// The manager is `Send + Sync`; share it behind an `Arc`.
pub struct TokenManager<I, C = System> {
    tenant: Tenant,
    cache_key: String,
    lock_key: String,
    backends: Backends,
    lock_ttl: Duration,
    issuer: I,
    clock: C,
    refresh: Arc<Mutex<()>>,
}

impl<I> TokenManager<I, System>
where
    I: TokenIssuer,
{
    /// Constructs a manager for the tenant described by `config`
    ///
    /// Fails if the tenant identity is incomplete, or if the lock strategy
    /// requires a distributed lock that no configured backend provides.
    pub fn new(config: ManagerConfig, issuer: I) -> Result<Self, ConfigError> {
        config.validate()?;
        let backends = Backends::resolve(&config)?;
        let tenant = config.tenant();

        tracing::debug!(
            app_id = %tenant.app_id(),
            cache = ?backends.choice,
            distributed_lock = backends.locker.is_some(),
            "token manager ready"
        );

        Ok(Self {
            cache_key: tenant.cache_key(),
            lock_key: tenant.lock_key(),
            tenant,
            backends,
            lock_ttl: config.lock_ttl,
            issuer,
            clock: System,
            refresh: Arc::new(Mutex::new(())),
        })
    }
}

impl<I, C> TokenManager<I, C> {
    /// Replaces the clock used to judge token freshness
    pub fn with_clock<D: Clock>(self, clock: D) -> TokenManager<I, D> {
        TokenManager {
            tenant: self.tenant,
            cache_key: self.cache_key,
            lock_key: self.lock_key,
            backends: self.backends,
            lock_ttl: self.lock_ttl,
            issuer: self.issuer,
            clock,
            refresh: self.refresh,
        }
    }

    /// The tenant whose token is managed
    #[inline]
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// The cache backend in use
    #[inline]
    pub fn cache_kind(&self) -> CacheChoice {
        self.backends.choice
    }

    /// The configured lock strategy
    #[inline]
    pub fn lock_strategy(&self) -> LockStrategy {
        self.backends.strategy
    }

    /// Whether refreshes are coordinated across processes
    #[inline]
    pub fn has_distributed_lock(&self) -> bool {
        self.backends.locker.is_some()
    }
}

impl<I, C> TokenManager<I, C>
where
    I: TokenIssuer,
    C: Clock,
{
    /// Gets a usable access token, refreshing it if necessary
    ///
    /// Cancelling `cx` abandons the call at its current suspension point.
    /// Locks held at that moment are released. If the returned future is
    /// dropped while the distributed lock is held, the lock is released in
    /// the background and this manager's other callers stay queued until that
    /// release has finished.
    ///
    /// If the token was refreshed but could not be written to the cache, the
    /// result is [`TokenError::CacheWrite`], which still carries the new token.
    pub async fn access_token(&self, cx: &CancellationToken) -> Result<AccessToken, TokenError> {
        if let Some(token) = self.cached(cx).await? {
            return Ok(token);
        }

        let local = cancellable(cx, self.refresh.clone().lock_owned()).await?;

        if let Some(token) = self.cached(cx).await? {
            tracing::debug!("token refreshed by another caller while waiting");
            return Ok(token);
        }

        let Some(locker) = &self.backends.locker else {
            return self.fetch_if_still_missing(cx).await;
        };

        let mut guard = locker.lock(cx, &self.lock_key, self.lock_ttl).await?;
        guard.hold_until_released(local);
        let result = self.fetch_if_still_missing(cx).await;

        if let Err(error) = guard.release().await {
            tracing::warn!(
                key = %self.lock_key,
                error = (&error as &dyn std::error::Error),
                "unable to release refresh lock; it will lapse with its lease"
            );
        }

        result
    }

    /// Gets a usable access token without the possibility of cancellation
    pub async fn access_token_now(&self) -> Result<AccessToken, TokenError> {
        self.access_token(&CancellationToken::new()).await
    }

    /// Removes the cached token so that the next call fetches a new one
    pub async fn invalidate(&self, cx: &CancellationToken) -> Result<(), TokenError> {
        cancellable(cx, self.backends.cache.delete(&self.cache_key))
            .await?
            .map_err(TokenError::CacheDelete)?;
        tracing::debug!(key = %self.cache_key, "invalidated cached token");
        Ok(())
    }

    async fn cached(&self, cx: &CancellationToken) -> Result<Option<AccessToken>, TokenError> {
        let record = cancellable(cx, self.backends.cache.get(&self.cache_key))
            .await?
            .map_err(TokenError::CacheRead)?;

        match record {
            Some(record) if record.is_usable_with_clock(&self.clock) => {
                tracing::trace!("using cached token");
                Ok(Some(record.into_access_token()))
            }
            Some(record) => {
                tracing::debug!(
                    status = ?record.status_at(self.clock.now()),
                    "cached token is too close to expiry"
                );
                Ok(None)
            }
            None => {
                tracing::debug!("no cached token");
                Ok(None)
            }
        }
    }

    async fn fetch_if_still_missing(
        &self,
        cx: &CancellationToken,
    ) -> Result<AccessToken, TokenError> {
        if let Some(token) = self.cached(cx).await? {
            tracing::debug!("token refreshed by another process while waiting");
            return Ok(token);
        }

        self.refresh(cx).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(app_id = %self.tenant.app_id()))]
    async fn refresh(&self, cx: &CancellationToken) -> Result<AccessToken, TokenError> {
        let issued = cancellable(cx, self.issuer.fetch_token(&self.tenant)).await??;
        let record = TokenRecord::issued_now(issued.access_token, issued.expires_in, &self.clock);
        let ttl = record.lifetime();

        tracing::info!(
            lifetime = ttl.as_secs(),
            expiry = record.expiry().0,
            "fetched new access token"
        );

        match cancellable(cx, self.backends.cache.set(&self.cache_key, &record, ttl)).await? {
            Ok(()) => Ok(record.into_access_token()),
            Err(source) => {
                tracing::warn!(
                    key = %self.cache_key,
                    error = (&source as &dyn std::error::Error),
                    "unable to cache new token; returning it uncached"
                );
                Err(TokenError::CacheWrite {
                    token: record.into_access_token(),
                    source,
                })
            }
        }
    }
}

impl<I, C> fmt::Debug for TokenManager<I, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("tenant", &self.tenant)
            .field("cache", &self.backends.choice)
            .field("locker", &self.backends.plan)
            .field("lock_strategy", &self.backends.strategy)
            .field("lock_ttl", &self.lock_ttl)
            .finish_non_exhaustive()
    }
}

async fn cancellable<F: Future>(cx: &CancellationToken, fut: F) -> Result<F::Output, TokenError> {
    tokio::select! {
        biased;
        _ = cx.cancelled() => Err(TokenError::Cancelled),
        out = fut => Ok(out),
    }
}
