//! Sources of newly issued access tokens

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IssuerError;
use crate::tenant::Tenant;
use crate::AccessToken;

/// A token freshly issued by an authority
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    /// The access token
    pub access_token: AccessToken,
    /// The lifetime of the token in seconds, as reported by the issuer
    pub expires_in: u64,
}

impl IssuedToken {
    /// Constructs a new issued token
    pub fn new(access_token: AccessToken, expires_in: u64) -> Self {
        Self {
            access_token,
            expires_in,
        }
    }
}

/// An authority that issues access tokens for a tenant
///
/// The manager calls the issuer at most once per refresh and may drop the
/// returned future if its caller cancels.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Requests a new access token for `tenant`
    async fn fetch_token(&self, tenant: &Tenant) -> Result<IssuedToken, IssuerError>;
}

#[async_trait]
impl<T: TokenIssuer + ?Sized> TokenIssuer for Arc<T> {
    async fn fetch_token(&self, tenant: &Tenant) -> Result<IssuedToken, IssuerError> {
        (**self).fetch_token(tenant).await
    }
}

#[async_trait]
impl<T: TokenIssuer + ?Sized> TokenIssuer for Box<T> {
    async fn fetch_token(&self, tenant: &Tenant) -> Result<IssuedToken, IssuerError> {
        (**self).fetch_token(tenant).await
    }
}

/// An issuer that always hands out the same token
///
/// Useful for local development and tests.
#[derive(Clone, Debug)]
pub struct ConstTokenIssuer {
    token: IssuedToken,
}

impl ConstTokenIssuer {
    /// Constructs an issuer handing out `access_token` with the given lifetime
    pub fn new(access_token: AccessToken, expires_in: u64) -> Self {
        Self {
            token: IssuedToken::new(access_token, expires_in),
        }
    }
}

#[async_trait]
impl TokenIssuer for ConstTokenIssuer {
    async fn fetch_token(&self, _tenant: &Tenant) -> Result<IssuedToken, IssuerError> {
        Ok(self.token.clone())
    }
}
