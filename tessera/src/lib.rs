//! Coordinated refreshing of shared access tokens
//!
//! Many services authenticate against an upstream API with a short-lived
//! access token obtained by exchanging an application identifier and secret.
//! Issuers commonly rate-limit that exchange, and some invalidate the
//! previous token whenever a new one is issued. A fleet of processes that
//! each refresh independently will trip over both.
//!
//! This crate keeps one token per tenant in a shared cache and makes sure
//! that, whenever the token needs replacing, exactly one caller across every
//! cooperating process contacts the issuer. Everyone else waits for, and then
//! reuses, that caller's result.
//!
//! # How a token is obtained
//!
//! A [`TokenManager`] checks the cache first. On a miss (or when the cached
//! token expires within [`REFRESH_SKEW`]) callers within the process queue
//! behind a mutex, and then behind a distributed lock held in the same store
//! as the cache. Each layer re-checks the cache before moving on, so only the
//! first caller through all of them fetches a new token.
//!
//! ```
//! use tessera::{AccessToken, AppId, AppSecret, ConstTokenIssuer, ManagerConfig, TokenManager};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ManagerConfig::new(AppId::from_static("wx1234"), AppSecret::from_static("s3cr3t"));
//! let issuer = ConstTokenIssuer::new(AccessToken::from_static("abc"), 7200);
//!
//! let manager = TokenManager::new(config, issuer)?;
//! let token = manager.access_token(&CancellationToken::new()).await?;
//!
//! assert_eq!(token.as_str(), "abc");
//! # Ok(())
//! # }
//! ```
//!
//! # Backends
//!
//! Exactly one cache is used, chosen in priority order from what the
//! [`ManagerConfig`] provides: a [`CustomCache`](cache::CustomCache), a
//! Redis cluster, a single Redis node, or else an in-process memory cache.
//! The [`LockStrategy`] decides whether the distributed lock that comes
//! with the chosen cache is used.
//!
//! # Features
//!
//! * `redis` (default): Provides a cache and a distributed lock backed by
//!   Redis, for single nodes and clusters.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod backend;
pub mod backoff;
mod braids;
pub mod cache;
pub mod clock;
mod config;
pub mod error;
mod issuer;
pub mod jitter;
pub mod lock;
mod manager;
mod tenant;
mod tokens;

pub use backend::{plan_locker, select_cache, CacheChoice, LockerPlan};
pub use braids::*;
pub use config::{LockStrategy, ManagerConfig, UnknownLockStrategy};
pub use error::{Outcome, OutcomeExt, TokenError};
pub use issuer::{ConstTokenIssuer, IssuedToken, TokenIssuer};
pub use manager::TokenManager;
pub use tenant::{Tenant, DEFAULT_NAMESPACE};
pub use tokens::{TokenRecord, TokenStatus, REFRESH_SKEW};
