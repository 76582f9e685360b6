//! A ready-made client owning a token manager and its HTTP issuer

use std::{fmt, time::Duration};

use bytes::{BufMut, BytesMut};
use reqwest::header::{HeaderValue, InvalidHeaderValue};
use tessera::{error::ConfigError, AccessToken, ManagerConfig, TokenError, TokenManager};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::issuer::{default_token_url, ClientCredentialIssuer};

/// The time allowed for one request to the token endpoint
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The `User-Agent` sent to the token endpoint unless overridden
pub const DEFAULT_USER_AGENT: &str = concat!("tessera/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`Client`]
pub struct ClientConfig {
    manager: ManagerConfig,
    token_url: reqwest::Url,
    http_timeout: Duration,
    user_agent: String,
}

impl ClientConfig {
    /// Wraps a manager configuration, using the default token endpoint
    pub fn new(manager: ManagerConfig) -> Self {
        Self {
            manager,
            token_url: default_token_url(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Sets the token endpoint
    pub fn with_token_url(mut self, token_url: reqwest::Url) -> Self {
        self.token_url = token_url;
        self
    }

    /// Sets the time allowed for one request to the token endpoint
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets the `User-Agent` sent to the token endpoint
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("manager", &self.manager)
            .field("token_url", &self.token_url.as_str())
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// A [`Client`] could not be constructed
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The manager configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The HTTP client could not be built
    #[error("unable to build HTTP client")]
    Http(#[from] reqwest::Error),
}

/// An authorization header could not be produced
#[derive(Debug, Error)]
pub enum BearerError {
    /// No token could be obtained
    #[error(transparent)]
    Token(#[from] TokenError),
    /// The token contains bytes that are not allowed in a header
    #[error("access token is not a valid header value")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

/// Obtains access tokens for one tenant from the client credential endpoint
#[derive(Debug)]
pub struct Client {
    manager: TokenManager<ClientCredentialIssuer>,
}

impl Client {
    /// Builds an HTTP client and a token manager from `config`
    pub fn new(config: ClientConfig) -> Result<Self, ClientBuildError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent)
            .build()?;

        let issuer = ClientCredentialIssuer::new(http, config.token_url);
        let manager = TokenManager::new(config.manager, issuer)?;
        Ok(Self { manager })
    }

    /// The underlying token manager
    #[inline]
    pub fn manager(&self) -> &TokenManager<ClientCredentialIssuer> {
        &self.manager
    }

    /// Gets a usable access token, refreshing it if necessary
    pub async fn access_token(&self, cx: &CancellationToken) -> Result<AccessToken, TokenError> {
        self.manager.access_token(cx).await
    }

    /// Gets a usable access token formatted as a bearer `Authorization` header
    ///
    /// The header value is marked sensitive.
    pub async fn bearer_header(&self, cx: &CancellationToken) -> Result<HeaderValue, BearerError> {
        let token = self.access_token(cx).await?;

        let mut header_value = BytesMut::with_capacity(token.as_str().len() + 7);
        header_value.put_slice(b"Bearer ");
        header_value.put_slice(token.as_str().as_bytes());
        let mut value = HeaderValue::from_maybe_shared(header_value.freeze())?;
        value.set_sensitive(true);
        Ok(value)
    }
}
