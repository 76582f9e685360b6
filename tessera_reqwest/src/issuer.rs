//! A token issuer speaking the client credential flow over HTTP

use async_trait::async_trait;
use tessera::{error::IssuerError, IssuedToken, Tenant, TokenIssuer};

mod dto;

/// The token endpoint used unless another is configured
pub const DEFAULT_TOKEN_URL: &str = "https://api.weixin.qq.com/cgi-bin/token";

/// Parses [`DEFAULT_TOKEN_URL`]
pub fn default_token_url() -> reqwest::Url {
    reqwest::Url::parse(DEFAULT_TOKEN_URL).expect("default token URL is valid")
}

/// Exchanges a tenant's application identifier and secret for an access token
///
/// The credentials are sent as query parameters of a `GET` request. Only the
/// application identifier is ever recorded in traces.
#[derive(Clone, Debug)]
pub struct ClientCredentialIssuer {
    client: reqwest::Client,
    token_url: reqwest::Url,
}

impl ClientCredentialIssuer {
    /// Constructs a new issuer against `token_url`
    pub fn new(client: reqwest::Client, token_url: reqwest::Url) -> Self {
        Self { client, token_url }
    }

    /// The token endpoint
    #[inline]
    pub fn token_url(&self) -> &reqwest::Url {
        &self.token_url
    }
}

#[async_trait]
impl TokenIssuer for ClientCredentialIssuer {
    #[tracing::instrument(
        err,
        skip_all,
        fields(
            token_url = %self.token_url,
            app_id = %tenant.app_id(),
        ),
    )]
    async fn fetch_token(&self, tenant: &Tenant) -> Result<IssuedToken, IssuerError> {
        tracing::trace!("requesting token from issuer");

        let resp = self
            .client
            .get(self.token_url.clone())
            .query(&dto::TokenRequest::for_tenant(tenant))
            .send()
            .await
            .map_err(IssuerError::transport)?;

        let status = resp.status();
        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from issuer"
        );

        if !status.is_success() {
            let body = resp.text().await.map_err(IssuerError::transport)?;
            return Err(IssuerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await.map_err(IssuerError::transport)?;
        let resp: dto::TokenResponse =
            serde_json::from_slice(&body).map_err(IssuerError::malformed)?;

        if resp.errcode != 0 {
            return Err(IssuerError::Rejected {
                code: resp.errcode,
                message: resp.errmsg.unwrap_or_default(),
            });
        }

        let access_token = match resp.access_token {
            Some(token) if !token.as_str().is_empty() => token.to_owned(),
            _ => return Err(IssuerError::EmptyToken),
        };

        tracing::debug!(lifetime = resp.expires_in, "received new access token");

        Ok(IssuedToken::new(access_token, resp.expires_in))
    }
}

#[cfg(test)]
mod tests {
    use tessera::{AppId, AppSecret, Outcome};
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn tenant() -> Tenant {
        Tenant::new(AppId::from_static("wx-app"), AppSecret::from_static("s3cr3t"))
    }

    fn issuer_for(server: &MockServer) -> ClientCredentialIssuer {
        let url = reqwest::Url::parse(&format!("{}/cgi-bin/token", server.uri())).unwrap();
        ClientCredentialIssuer::new(reqwest::Client::new(), url)
    }

    async fn respond_with(template: ResponseTemplate) -> (MockServer, ClientCredentialIssuer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .respond_with(template)
            .mount(&server)
            .await;
        let issuer = issuer_for(&server);
        (server, issuer)
    }

    #[tokio::test]
    async fn sends_credentials_as_query_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/token"))
            .and(query_param("grant_type", "client_credential"))
            .and(query_param("appid", "wx-app"))
            .and(query_param("secret", "s3cr3t"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "abc", "expires_in": 7200})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let issued = issuer_for(&server).fetch_token(&tenant()).await.unwrap();

        assert_eq!(issued.access_token.as_str(), "abc");
        assert_eq!(issued.expires_in, 7200);
    }

    #[tokio::test]
    async fn nonzero_errcode_is_a_rejection() {
        let (_server, issuer) = respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"errcode": 40013, "errmsg": "invalid appid"})),
        )
        .await;

        let err = issuer.fetch_token(&tenant()).await.unwrap_err();

        assert!(matches!(
            &err,
            IssuerError::Rejected { code: 40013, message } if message == "invalid appid"
        ));
        assert_eq!(err.outcome(), Outcome::Issuer);
    }

    #[tokio::test]
    async fn missing_token_is_an_invalid_response() {
        let (_server, issuer) = respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "", "expires_in": 7200})),
        )
        .await;

        let err = issuer.fetch_token(&tenant()).await.unwrap_err();

        assert!(matches!(err, IssuerError::EmptyToken));
        assert_eq!(err.outcome(), Outcome::InvalidResponse);
    }

    #[tokio::test]
    async fn non_success_status_keeps_the_body() {
        let (_server, issuer) =
            respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable")).await;

        let err = issuer.fetch_token(&tenant()).await.unwrap_err();

        assert!(matches!(
            &err,
            IssuerError::Status { status: 503, body } if body == "upstream unavailable"
        ));
        assert_eq!(err.outcome(), Outcome::HttpStatus);
    }

    #[tokio::test]
    async fn malformed_json_is_an_invalid_response() {
        let (_server, issuer) =
            respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

        let err = issuer.fetch_token(&tenant()).await.unwrap_err();

        assert!(matches!(err, IssuerError::MalformedResponse(_)));
        assert_eq!(err.outcome(), Outcome::InvalidResponse);
    }

    #[tokio::test]
    async fn unreachable_issuer_is_a_transport_error() {
        let url = reqwest::Url::parse("http://127.0.0.1:1/cgi-bin/token").unwrap();
        let issuer = ClientCredentialIssuer::new(reqwest::Client::new(), url);

        let err = issuer.fetch_token(&tenant()).await.unwrap_err();

        assert!(matches!(err, IssuerError::Transport(_)));
        assert_eq!(err.outcome(), Outcome::Http);
    }

    #[test]
    fn default_url_parses() {
        assert_eq!(default_token_url().host_str(), Some("api.weixin.qq.com"));
    }
}
