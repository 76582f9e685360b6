use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, System, UnixTime};
use crate::{AccessToken, AccessTokenRef};

/// How long before its true expiry a token stops being handed out
///
/// A token inside this window is treated as if it had already expired so
/// that callers never receive a token that dies mid-request.
pub const REFRESH_SKEW: Duration = Duration::from_secs(5 * 60);

/// An access token as returned by the issuer along with its lifetime
///
/// Records are immutable once created. Whether a record may still be served
/// is derived from the current time on every check rather than stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    access_token: AccessToken,
    expires_in: u64,
    issued_at: UnixTime,
    expires_at: UnixTime,
}

/// A token's lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// The token is valid and outside the refresh window
    Fresh,
    /// The token is still valid, but expires within [`REFRESH_SKEW`]
    Expiring,
    /// The token is no longer valid
    Expired,
}

impl TokenRecord {
    /// Creates a record for a token issued at `issued_at` with a lifetime of `expires_in` seconds
    pub fn issued_at(access_token: AccessToken, expires_in: u64, issued_at: UnixTime) -> Self {
        Self {
            access_token,
            expires_in,
            issued_at,
            expires_at: issued_at.saturating_add(Duration::from_secs(expires_in)),
        }
    }

    /// Creates a record for a token issued now according to `clock`
    pub fn issued_now<C: Clock + ?Sized>(
        access_token: AccessToken,
        expires_in: u64,
        clock: &C,
    ) -> Self {
        Self::issued_at(access_token, expires_in, clock.now())
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Consumes the record, returning the access token
    #[inline]
    pub fn into_access_token(self) -> AccessToken {
        self.access_token
    }

    /// Gets the lifetime reported by the issuer
    #[inline]
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }

    /// Gets the time the token was issued
    #[inline]
    pub fn issued(&self) -> UnixTime {
        self.issued_at
    }

    /// Gets the time the token expires
    #[inline]
    pub fn expiry(&self) -> UnixTime {
        self.expires_at
    }

    /// Gets the token's lifecycle status as of `now`
    pub fn status_at(&self, now: UnixTime) -> TokenStatus {
        if now >= self.expires_at {
            TokenStatus::Expired
        } else if now.saturating_add(REFRESH_SKEW) < self.expires_at {
            TokenStatus::Fresh
        } else {
            TokenStatus::Expiring
        }
    }

    /// Gets the token's current lifecycle status
    #[inline]
    pub fn status(&self) -> TokenStatus {
        self.status_at(System.now())
    }

    /// Whether the token may still be handed out as of `now`
    ///
    /// Only [`TokenStatus::Fresh`] tokens are usable.
    #[inline]
    pub fn is_usable_at(&self, now: UnixTime) -> bool {
        self.status_at(now) == TokenStatus::Fresh
    }

    /// Whether the token may still be handed out according to `clock`
    #[inline]
    pub fn is_usable_with_clock<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        self.is_usable_at(clock.now())
    }

    /// Gets how much longer the token is valid as of `now`
    #[inline]
    pub fn until_expired_at(&self, now: UnixTime) -> Duration {
        self.expires_at.duration_since(now)
    }
}
