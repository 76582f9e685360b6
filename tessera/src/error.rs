//! Errors and their machine-readable outcome classification

use std::{error::Error as StdError, fmt};

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{AccessToken, AccessTokenRef};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A stable, machine-readable classification of a call's result
///
/// Outcomes are intended for branching and telemetry. They are distinct from
/// the error values, which carry the human-readable detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Outcome {
    /// The call succeeded
    Ok,
    /// No application identifier was configured
    MissingAppId,
    /// No application secret was configured
    MissingAppSecret,
    /// A distributed lock was required but no backend can provide one
    LockBackendMissing,
    /// Reading from the cache failed
    CacheGet,
    /// Writing to the cache failed
    CacheSet,
    /// Deleting from the cache failed
    CacheDelete,
    /// The distributed lock could not be acquired
    Lock,
    /// The caller cancelled the call
    Cancelled,
    /// The issuer could not be reached
    Http,
    /// The issuer responded with a non-success status
    HttpStatus,
    /// The issuer's response could not be understood
    InvalidResponse,
    /// The issuer rejected the request
    Issuer,
}

impl Outcome {
    /// The stable string code for this outcome
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::MissingAppId => "E_MISSING_APP_ID",
            Self::MissingAppSecret => "E_MISSING_APP_SECRET",
            Self::LockBackendMissing => "E_LOCK_BACKEND_MISSING",
            Self::CacheGet => "E_CACHE_GET",
            Self::CacheSet => "E_CACHE_SET",
            Self::CacheDelete => "E_CACHE_DELETE",
            Self::Lock => "E_LOCK",
            Self::Cancelled => "E_CANCELLED",
            Self::Http => "E_HTTP",
            Self::HttpStatus => "E_HTTP_STATUS",
            Self::InvalidResponse => "E_INVALID_RESPONSE",
            Self::Issuer => "E_ISSUER",
        }
    }

    /// Whether this outcome denotes success
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// The configuration cannot be used to construct a manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The application identifier is empty
    #[error("app_id is required")]
    MissingAppId,
    /// The application secret is empty
    #[error("app_secret is required")]
    MissingAppSecret,
    /// The lock strategy requires a distributed lock that no configured backend provides
    #[error("distributed lock required but no backend available")]
    LockBackendMissing,
}

impl ConfigError {
    /// The outcome classification for this error
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::MissingAppId => Outcome::MissingAppId,
            Self::MissingAppSecret => Outcome::MissingAppSecret,
            Self::LockBackendMissing => Outcome::LockBackendMissing,
        }
    }
}

/// A cache backend failed
#[derive(Debug, Error)]
#[error("token cache backend error")]
pub struct CacheError {
    #[from]
    source: BoxError,
}

impl CacheError {
    /// Wraps a backend-specific error
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A distributed lock could not be acquired or released
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock remained held by another owner through every attempt
    #[error("lock `{key}` still held after {attempts} attempts")]
    Contended {
        /// The contended lock key
        key: String,
        /// The number of acquisition attempts made
        attempts: u32,
    },
    /// The caller cancelled while waiting for the lock
    #[error("cancelled while waiting for lock")]
    Cancelled,
    /// The lock backend failed
    #[error("lock backend error")]
    Backend(#[source] BoxError),
}

impl LockError {
    /// Wraps a backend-specific error
    pub fn backend(source: impl Into<BoxError>) -> Self {
        Self::Backend(source.into())
    }

    /// The outcome classification for this error
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::Cancelled => Outcome::Cancelled,
            Self::Contended { .. } | Self::Backend(_) => Outcome::Lock,
        }
    }
}

/// The issuer did not provide a token
#[derive(Debug, Error)]
pub enum IssuerError {
    /// The request could not be sent or the response could not be read
    #[error("error sending request to issuer")]
    Transport(#[source] BoxError),
    /// The issuer responded with a non-success status
    #[error("issuer responded with status {status}: {body}")]
    Status {
        /// The HTTP status code
        status: u16,
        /// The response body, as text
        body: String,
    },
    /// The response body could not be parsed
    #[error("malformed response from issuer")]
    MalformedResponse(#[source] BoxError),
    /// The issuer understood the request and refused it
    #[error("issuer rejected request: code={code}, message={message}")]
    Rejected {
        /// The issuer's error code
        code: i64,
        /// The issuer's error message
        message: String,
    },
    /// The issuer reported success without providing a token
    #[error("issuer response did not contain an access token")]
    EmptyToken,
}

impl IssuerError {
    /// Wraps a transport-level error
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(source.into())
    }

    /// Wraps a response parsing error
    pub fn malformed(source: impl Into<BoxError>) -> Self {
        Self::MalformedResponse(source.into())
    }

    /// The outcome classification for this error
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::Transport(_) => Outcome::Http,
            Self::Status { .. } => Outcome::HttpStatus,
            Self::MalformedResponse(_) | Self::EmptyToken => Outcome::InvalidResponse,
            Self::Rejected { .. } => Outcome::Issuer,
        }
    }
}

/// An access token could not be provided, or was provided with a degraded cache
#[derive(Debug, Error)]
pub enum TokenError {
    /// The cache could not be read
    #[error("unable to read token from cache")]
    CacheRead(#[source] CacheError),
    /// A new token was fetched, but could not be written to the cache
    ///
    /// The token itself is still valid and can be recovered with
    /// [`fetched_token()`][Self::fetched_token].
    #[error("unable to write token to cache")]
    CacheWrite {
        /// The freshly fetched token
        token: AccessToken,
        /// The underlying cache error
        #[source]
        source: CacheError,
    },
    /// The cache entry could not be deleted
    #[error("unable to delete token from cache")]
    CacheDelete(#[source] CacheError),
    /// Coordination with other processes could not be established
    #[error("unable to acquire distributed refresh lock")]
    Lock(#[source] LockError),
    /// The caller cancelled the request
    #[error("token request cancelled")]
    Cancelled,
    /// The issuer failed to provide a token
    #[error("unable to fetch token from issuer")]
    Issuer(#[from] IssuerError),
}

impl TokenError {
    /// The outcome classification for this error
    pub const fn outcome(&self) -> Outcome {
        match self {
            Self::CacheRead(_) => Outcome::CacheGet,
            Self::CacheWrite { .. } => Outcome::CacheSet,
            Self::CacheDelete(_) => Outcome::CacheDelete,
            Self::Lock(err) => err.outcome(),
            Self::Cancelled => Outcome::Cancelled,
            Self::Issuer(err) => err.outcome(),
        }
    }

    /// The token fetched before the error occurred, if any
    pub fn fetched_token(&self) -> Option<&AccessTokenRef> {
        match self {
            Self::CacheWrite { token, .. } => Some(&**token),
            _ => None,
        }
    }

    /// Consumes the error, returning the token fetched before it occurred, if any
    pub fn into_fetched_token(self) -> Option<AccessToken> {
        match self {
            Self::CacheWrite { token, .. } => Some(token),
            _ => None,
        }
    }
}

impl From<LockError> for TokenError {
    fn from(err: LockError) -> Self {
        Self::Lock(err)
    }
}

/// Classifies a result by its [`Outcome`]
pub trait OutcomeExt {
    /// The outcome classification for this result
    fn outcome(&self) -> Outcome;
}

impl<T> OutcomeExt for Result<T, TokenError> {
    fn outcome(&self) -> Outcome {
        match self {
            Ok(_) => Outcome::Ok,
            Err(err) => err.outcome(),
        }
    }
}
