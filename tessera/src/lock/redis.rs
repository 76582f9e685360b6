//! A distributed lock held in Redis

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::aio::ConnectionLike;
use tokio_util::sync::CancellationToken;

use crate::backoff::LockRetryConfig;
use crate::error::LockError;
use crate::jitter::{JitterSource, SymmetricJitter};
use crate::lock::{acquire_with_retry, lock_token, LockGuard, TokenLocker};

const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
  return redis.call("del", KEYS[1])
end
return 0
"#;

/// A distributed lock over a single Redis node
pub type SingleNodeLocker = RedisLocker<redis::aio::ConnectionManager>;

/// A distributed lock over a Redis cluster
pub type RedisClusterLocker = RedisLocker<redis::cluster_async::ClusterConnection>;

/// A lock taken with `SET NX` and released with a compare-and-delete script
///
/// Each acquisition writes a fresh random value, and release deletes the key
/// only while it still holds that value. A holder whose lease lapsed can
/// therefore never release a lock that has since been taken by someone else.
#[derive(Clone)]
pub struct RedisLocker<C> {
    conn: C,
    retry: LockRetryConfig,
    jitter: Arc<dyn JitterSource>,
}

impl<C> RedisLocker<C> {
    /// Constructs a new lock over a Redis connection with the default retry policy
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            retry: LockRetryConfig::default(),
            jitter: Arc::new(SymmetricJitter::default()),
        }
    }

    /// Replaces the retry policy used while the lock is contended
    pub fn with_retry(mut self, retry: LockRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the jitter applied to waits between attempts
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }
}

impl<C> fmt::Debug for RedisLocker<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RedisLocker")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<C> RedisLocker<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn try_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, LockError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(LockError::backend)?;

        if reply.is_none() {
            return Ok(None);
        }

        let key = key.to_owned();
        let token = token.to_owned();
        let guard = LockGuard::new(key.clone(), move || async move {
            let script = redis::Script::new(UNLOCK_SCRIPT);
            let mut invocation = script.key(&key);
            invocation.arg(&token);
            let deleted: i64 = invocation
                .invoke_async(&mut conn)
                .await
                .map_err(LockError::backend)?;

            if deleted == 0 {
                tracing::debug!(key = %key, "lock lease lapsed before release");
            }
            Ok(())
        });

        Ok(Some(guard))
    }
}

#[async_trait]
impl<C> TokenLocker for RedisLocker<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn lock(
        &self,
        cx: &CancellationToken,
        key: &str,
        ttl: Duration,
    ) -> Result<LockGuard, LockError> {
        let token = lock_token();
        acquire_with_retry(cx, key, &self.retry, &*self.jitter, || {
            self.try_lock(key, &token, ttl)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> SingleNodeLocker {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let client = redis::Client::open(url.as_str()).unwrap();
        let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
        RedisLocker::new(conn)
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn second_holder_is_refused_until_release() {
        let locker = connect().await;
        let key = format!("tessera-test:token_lock:{}", lock_token());
        let cx = CancellationToken::new();

        let first = locker.lock(&cx, &key, Duration::from_secs(5)).await.unwrap();

        let second = locker.lock(&cx, &key, Duration::from_secs(5)).await;
        assert!(matches!(second, Err(LockError::Contended { .. })));

        first.release().await.unwrap();

        let third = locker.lock(&cx, &key, Duration::from_secs(5)).await.unwrap();
        third.release().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn release_does_not_delete_a_lock_taken_over_by_another_holder() {
        let locker = connect().await;
        let key = format!("tessera-test:token_lock:{}", lock_token());
        let cx = CancellationToken::new();

        let stale = locker
            .lock(&cx, &key, Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let current = locker.lock(&cx, &key, Duration::from_secs(5)).await.unwrap();
        stale.release().await.unwrap();

        let mut conn = locker.conn.clone();
        let holder: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(holder.is_some());

        current.release().await.unwrap();
    }
}
