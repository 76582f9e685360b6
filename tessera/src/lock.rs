//! Distributed refresh locks

use std::{any::Any, fmt, future::Future, time::Duration};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::backoff::LockRetryConfig;
use crate::error::LockError;
use crate::jitter::JitterSource;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub use self::redis::{RedisClusterLocker, RedisLocker, SingleNodeLocker};

/// The lease placed on a refresh lock unless configured otherwise
///
/// The lease only needs to outlast one round trip to the issuer. It is
/// independent of the token's own lifetime.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(15);

/// A lock shared between processes
#[async_trait]
pub trait TokenLocker: Send + Sync {
    /// Acquires the lock named `key` with a lease of `ttl`
    ///
    /// Waiting for a contended lock must end promptly with
    /// [`LockError::Cancelled`] once `cx` is cancelled.
    async fn lock(
        &self,
        cx: &CancellationToken,
        key: &str,
        ttl: Duration,
    ) -> Result<LockGuard, LockError>;
}

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), LockError>> + Send>;

/// A held lock
///
/// The lock is released by [`release()`][Self::release], which consumes the
/// guard so that it can only happen once. A guard dropped without being
/// released spawns its release onto the current tokio runtime.
///
/// A value passed to [`hold_until_released()`][Self::hold_until_released] is
/// dropped only after the release has finished, on either path. Dropping the
/// guard outside a runtime cannot run the release at all: the held value is
/// dropped immediately while the lock stays taken until its lease runs out.
#[must_use = "dropping a lock guard releases the lock in the background"]
pub struct LockGuard {
    key: String,
    release: Option<ReleaseFn>,
    held: Option<Box<dyn Any + Send>>,
}

impl LockGuard {
    /// Constructs a guard for `key` that runs `release` exactly once
    pub fn new<F, Fut>(key: impl Into<String>, release: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LockError>> + Send + 'static,
    {
        Self {
            key: key.into(),
            release: Some(Box::new(move || Box::pin(release()))),
            held: None,
        }
    }

    /// Keeps `value` alive until the lock has been released
    pub fn hold_until_released<T: Send + 'static>(&mut self, value: T) {
        self.held = Some(Box::new(value));
    }

    /// The key of the held lock
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock
    pub async fn release(mut self) -> Result<(), LockError> {
        let held = self.held.take();
        let result = match self.release.take() {
            Some(release) => release().await,
            None => Ok(()),
        };
        drop(held);
        result
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(release) = self.release.take() else {
            return;
        };

        let key = std::mem::take(&mut self.key);
        let held = self.held.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = release().await {
                        tracing::warn!(
                            key = %key,
                            error = (&error as &dyn std::error::Error),
                            "unable to release dropped lock"
                        );
                    }
                    drop(held);
                });
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    "lock guard dropped outside of a runtime; lock will expire with its lease \
                     and values held until release are dropped now"
                );
            }
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("released", &self.release.is_none())
            .field("holding", &self.held.is_some())
            .finish()
    }
}

/// Drives repeated lock acquisition attempts with backoff
///
/// `try_acquire` makes one attempt, yielding `None` while the lock is held
/// elsewhere. Attempts themselves run to completion so that a lock taken
/// on the backend is never orphaned; only the waits between attempts race
/// against `cx`.
pub async fn acquire_with_retry<F, Fut>(
    cx: &CancellationToken,
    key: &str,
    config: &LockRetryConfig,
    jitter: &dyn JitterSource,
    mut try_acquire: F,
) -> Result<LockGuard, LockError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<LockGuard>, LockError>>,
{
    let attempts = config.max_attempts();
    for attempt in 0..attempts {
        if cx.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        if let Some(guard) = try_acquire().await? {
            tracing::trace!(key, attempt = attempt + 1, "acquired lock");
            return Ok(guard);
        }

        if attempt + 1 == attempts {
            break;
        }

        let wait = jitter.jitter(config.delay_after(attempt));
        tracing::debug!(
            key,
            attempt = attempt + 1,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "lock held elsewhere, backing off"
        );

        tokio::select! {
            biased;
            _ = cx.cancelled() => return Err(LockError::Cancelled),
            _ = tokio::time::sleep(wait) => {}
        }
    }

    Err(LockError::Contended {
        key: key.to_owned(),
        attempts,
    })
}

/// Generates a value identifying one lock acquisition
pub fn lock_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    };

    use super::*;
    use crate::jitter::NullJitter;

    fn counting_guard(key: &str, releases: &Arc<AtomicU32>) -> LockGuard {
        let releases = releases.clone();
        LockGuard::new(key, move || async move {
            releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    mod lock_guard {
        use super::*;

        #[tokio::test]
        async fn release_runs_exactly_once() {
            let releases = Arc::new(AtomicU32::new(0));
            let guard = counting_guard("k", &releases);

            guard.release().await.unwrap();
            tokio::task::yield_now().await;

            assert_eq!(releases.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn dropped_guard_releases_in_the_background() {
            let releases = Arc::new(AtomicU32::new(0));
            drop(counting_guard("k", &releases));

            for _ in 0..10 {
                tokio::task::yield_now().await;
            }

            assert_eq!(releases.load(Ordering::SeqCst), 1);
        }

        fn guard_checking_mutex(
            mutex: &Arc<tokio::sync::Mutex<()>>,
            locked: &Arc<AtomicBool>,
        ) -> LockGuard {
            let observed = mutex.clone();
            let locked = locked.clone();
            let mut guard = LockGuard::new("k", move || async move {
                tokio::task::yield_now().await;
                locked.store(observed.try_lock().is_err(), Ordering::SeqCst);
                Ok(())
            });
            guard.hold_until_released(mutex.clone().try_lock_owned().unwrap());
            guard
        }

        #[tokio::test]
        async fn held_value_outlives_an_explicit_release() {
            let mutex = Arc::new(tokio::sync::Mutex::new(()));
            let locked = Arc::new(AtomicBool::new(false));

            guard_checking_mutex(&mutex, &locked).release().await.unwrap();

            assert!(locked.load(Ordering::SeqCst));
            assert!(mutex.try_lock().is_ok());
        }

        #[tokio::test]
        async fn held_value_outlives_a_background_release() {
            let mutex = Arc::new(tokio::sync::Mutex::new(()));
            let locked = Arc::new(AtomicBool::new(false));

            drop(guard_checking_mutex(&mutex, &locked));
            assert!(mutex.try_lock().is_err());

            for _ in 0..10 {
                tokio::task::yield_now().await;
            }

            assert!(locked.load(Ordering::SeqCst));
            assert!(mutex.try_lock().is_ok());
        }
    }

    mod acquire_with_retry {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn gives_up_after_configured_attempts() {
            let calls = AtomicU32::new(0);
            let cx = CancellationToken::new();
            let start = tokio::time::Instant::now();

            let result = super::super::acquire_with_retry(
                &cx,
                "k",
                &LockRetryConfig::default(),
                &NullJitter,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(None) }
                },
            )
            .await;

            assert!(matches!(
                result,
                Err(LockError::Contended { attempts: 3, .. })
            ));
            assert_eq!(calls.load(Ordering::SeqCst), 3);
            assert!(start.elapsed() >= Duration::from_millis(750));
            assert!(start.elapsed() < Duration::from_millis(800));
        }

        #[tokio::test(start_paused = true)]
        async fn succeeds_once_the_lock_frees_up() {
            let releases = Arc::new(AtomicU32::new(0));
            let calls = AtomicU32::new(0);
            let cx = CancellationToken::new();

            let guard = super::super::acquire_with_retry(
                &cx,
                "k",
                &LockRetryConfig::default(),
                &NullJitter,
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    let guard = (n == 1).then(|| counting_guard("k", &releases));
                    async move { Ok(guard) }
                },
            )
            .await
            .unwrap();

            assert_eq!(guard.key(), "k");
            assert_eq!(calls.load(Ordering::SeqCst), 2);
            guard.release().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn cancellation_interrupts_the_backoff_wait() {
            let cx = CancellationToken::new();
            let canceller = cx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                canceller.cancel();
            });

            let start = tokio::time::Instant::now();
            let result = super::super::acquire_with_retry(
                &cx,
                "k",
                &LockRetryConfig::default(),
                &NullJitter,
                || async { Ok(None) },
            )
            .await;

            assert!(matches!(result, Err(LockError::Cancelled)));
            assert!(start.elapsed() < Duration::from_millis(250));
        }

        #[tokio::test]
        async fn backend_errors_end_the_attempt_immediately() {
            let calls = AtomicU32::new(0);
            let cx = CancellationToken::new();

            let result = super::super::acquire_with_retry(
                &cx,
                "k",
                &LockRetryConfig::default(),
                &NullJitter,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(LockError::backend("connection refused")) }
                },
            )
            .await;

            assert!(matches!(result, Err(LockError::Backend(_))));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn lock_tokens_are_unique_hex() {
        let a = lock_token();
        let b = lock_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
