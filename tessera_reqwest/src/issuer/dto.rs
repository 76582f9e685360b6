//! Wire types for the client credential token endpoint

use serde::{Deserialize, Serialize};
use tessera::{AccessTokenRef, AppIdRef, AppSecretRef, Tenant};

pub(super) const GRANT_TYPE: &str = "client_credential";

/// Query parameters of a token request
#[derive(Debug, Serialize)]
pub(super) struct TokenRequest<'a> {
    pub grant_type: &'static str,
    pub appid: &'a AppIdRef,
    pub secret: &'a AppSecretRef,
}

impl<'a> TokenRequest<'a> {
    pub fn for_tenant(tenant: &'a Tenant) -> Self {
        Self {
            grant_type: GRANT_TYPE,
            appid: tenant.app_id(),
            secret: tenant.app_secret(),
        }
    }
}

/// A token response, which doubles as an error envelope
///
/// The endpoint answers application errors with a success status and a
/// non-zero `errcode`.
#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse<'a> {
    #[serde(borrow, default)]
    pub access_token: Option<&'a AccessTokenRef>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: Option<String>,
}
