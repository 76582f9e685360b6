//! An in-memory token caching layer

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::cache::TokenCache;
use crate::error::CacheError;
use crate::TokenRecord;

/// An in-memory token cache
///
/// Entries disappear once their time-to-live elapses, mirroring the native
/// expiry of a remote store. The cache is private to the process, so it
/// provides no distributed lock.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    store: RwLock<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    token: TokenRecord,
    evict_at: Instant,
}

impl InMemoryTokenCache {
    /// Constructs a new, empty in-memory token cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> Result<Option<TokenRecord>, CacheError> {
        let now = Instant::now();
        {
            let store = self.store.read();
            match store.get(key) {
                None => return Ok(None),
                Some(entry) if entry.evict_at > now => return Ok(Some(entry.token.clone())),
                Some(_) => {}
            }
        }

        let mut store = self.store.write();
        if store.get(key).map_or(false, |e| e.evict_at <= now) {
            store.remove(key);
            tracing::trace!(key, "evicted expired token from memory");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, token: &TokenRecord, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            self.store.write().remove(key);
            return Ok(());
        }

        let entry = Entry {
            token: token.clone(),
            evict_at: Instant::now() + ttl,
        };
        self.store.write().insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::UnixTime, AccessToken};

    fn record() -> TokenRecord {
        TokenRecord::issued_at(AccessToken::from_static("abc"), 7200, UnixTime(0))
    }

    #[tokio::test]
    async fn missing_key_is_absent_not_an_error() {
        let cache = InMemoryTokenCache::new();
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn stored_record_is_returned_until_deleted() {
        let cache = InMemoryTokenCache::new();
        cache.set("k", &record(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(record()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_their_ttl() {
        let cache = InMemoryTokenCache::new();
        cache.set("k", &record(), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_stores_nothing() {
        let cache = InMemoryTokenCache::new();
        cache.set("k", &record(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
