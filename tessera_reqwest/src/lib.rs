//! HTTP token issuing for `tessera`, built on `reqwest`
//!
//! [`ClientCredentialIssuer`] exchanges a tenant's application identifier and
//! secret for an access token at a client credential endpoint. It plugs into
//! any [`TokenManager`](tessera::TokenManager).
//!
//! [`Client`] bundles the two: it builds the HTTP client, the issuer and the
//! manager from a single [`ClientConfig`].
//!
//! ```no_run
//! use tessera::{AppId, AppSecret, ManagerConfig};
//! use tessera_reqwest::{Client, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new(ManagerConfig::new(
//!     AppId::from_static("wx1234"),
//!     AppSecret::from_static("s3cr3t"),
//! ));
//! let client = Client::new(config)?;
//!
//! let header = client.bearer_header(&CancellationToken::new()).await?;
//! # let _ = header;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `default-tls` (default): Uses the platform's TLS implementation.
//! * `rustls-tls`: Uses `rustls` for TLS.
//! * `redis` (default): Enables the Redis backends of `tessera`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod client;
mod issuer;

pub use client::{
    BearerError, Client, ClientBuildError, ClientConfig, DEFAULT_HTTP_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use issuer::{default_token_url, ClientCredentialIssuer, DEFAULT_TOKEN_URL};
