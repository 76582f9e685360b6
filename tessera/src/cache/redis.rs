//! A token cache stored in Redis

use std::{fmt, time::Duration};

use async_trait::async_trait;
use redis::aio::ConnectionLike;

use crate::cache::TokenCache;
use crate::error::CacheError;
use crate::TokenRecord;

/// A token cache over a single Redis node
pub type SingleNodeTokenCache = RedisTokenCache<redis::aio::ConnectionManager>;

/// A token cache over a Redis cluster
pub type RedisClusterTokenCache = RedisTokenCache<redis::cluster_async::ClusterConnection>;

/// A token cache persisting records as JSON in Redis
///
/// Records are written with a native expiry equal to their time-to-live, so
/// an entry left behind by a crashed process removes itself.
#[derive(Clone)]
pub struct RedisTokenCache<C> {
    conn: C,
}

impl<C> RedisTokenCache<C> {
    /// Constructs a new cache over a Redis connection
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

impl<C> fmt::Debug for RedisTokenCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RedisTokenCache").finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> TokenCache for RedisTokenCache<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<TokenRecord>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::new)?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let token = serde_json::from_str(&raw).map_err(CacheError::new)?;
        Ok(Some(token))
    }

    async fn set(&self, key: &str, token: &TokenRecord, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_ms == 0 {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(CacheError::new)?;
            return Ok(());
        }

        let payload = serde_json::to_string(token).map_err(CacheError::new)?;
        redis::cmd("SET")
            .arg(key)
            .arg(payload)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::new)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(CacheError::new)
    }
}
