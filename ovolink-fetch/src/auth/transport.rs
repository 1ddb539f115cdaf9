//! HTTP exchanges with the identity provider.
//!
//! [`AuthTransport`] issues the authorization, password-login, form-submit
//! and token requests and classifies their failures. It holds no token
//! state of its own.

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use ovolink_core::TokenResponse;

use super::endpoints::AuthEndpoints;
use super::login_form::LoginForm;
use crate::error::{body_snippet, FetchError};
use crate::host::http::{HttpClient, ResponseExt};

// ============================================================================
// Request Bodies
// ============================================================================

/// Body of a token endpoint request.
#[derive(Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum TokenGrant<'a> {
    /// Exchange an authorization code.
    AuthorizationCode {
        /// OAuth client id.
        client_id: &'a str,
        /// Code from the redirect.
        code: &'a str,
        /// PKCE verifier.
        code_verifier: &'a str,
        /// Redirect URI used for the authorization request.
        redirect_uri: &'a str,
    },
    /// Refresh an access token.
    RefreshToken {
        /// OAuth client id.
        client_id: &'a str,
        /// Stored refresh token.
        refresh_token: &'a str,
    },
}

impl TokenGrant<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Body of the password login request.
#[derive(Serialize)]
pub struct PasswordLoginRequest<'a> {
    /// OAuth client id.
    pub client_id: &'a str,
    /// Redirect URI.
    pub redirect_uri: &'a str,
    /// Identity provider tenant.
    pub tenant: &'a str,
    /// Always `code`.
    pub response_type: &'a str,
    /// Space-separated scopes.
    pub scope: String,
    /// API audience.
    pub audience: &'a str,
    /// Session `state`.
    pub state: &'a str,
    /// Random nonce.
    pub nonce: &'a str,
    /// Account e-mail.
    pub username: &'a str,
    /// Account password.
    pub password: &'a str,
    /// Database connection.
    pub connection: &'a str,
    /// PKCE challenge.
    pub code_challenge: &'a str,
    /// Always `S256`.
    pub code_challenge_method: &'a str,
}

// ============================================================================
// Transport
// ============================================================================

/// Issues the identity provider's HTTP exchanges.
#[derive(Debug, Clone)]
pub struct AuthTransport {
    http: HttpClient,
    endpoints: AuthEndpoints,
}

impl AuthTransport {
    /// Creates a transport.
    pub fn new(http: HttpClient, endpoints: AuthEndpoints) -> Self {
        Self { http, endpoints }
    }

    /// The configured endpoints.
    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    /// GETs the authorization endpoint without following redirects.
    ///
    /// Returns the redirect target, or `None` when the endpoint answered
    /// without redirecting.
    ///
    /// # Errors
    ///
    /// Transport failures and 4xx/5xx statuses are communication errors.
    #[instrument(skip(self, query))]
    pub async fn authorize(&self, query: &[(&str, &str)]) -> Result<Option<Url>, FetchError> {
        let response = self
            .http
            .get_without_redirect(&self.endpoints.authorize_url, query)
            .await?;

        let status = response.status();
        if status.is_redirection() {
            let location = response.location();
            debug!(has_location = location.is_some(), "Authorization redirect");
            return Ok(location);
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::status(status, &body));
        }
        debug!(status = %status, "Authorization endpoint did not redirect");
        Ok(None)
    }

    /// POSTs credentials to the password login endpoint.
    ///
    /// Returns the HTML body of the auto-submit form.
    ///
    /// # Errors
    ///
    /// A non-success status is an authentication failure carrying the first
    /// 200 characters of the body.
    #[instrument(skip(self, request))]
    pub async fn password_login(
        &self,
        request: &PasswordLoginRequest<'_>,
    ) -> Result<String, FetchError> {
        let response = self
            .http
            .post_json(&self.endpoints.login_url, request)
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = %status, "Password login rejected");
            return Err(FetchError::AuthenticationFailed(format!(
                "login failed with HTTP {}: {}",
                status.as_u16(),
                body_snippet(&body)
            )));
        }
        debug!(len = body.len(), "Password login accepted");
        Ok(body)
    }

    /// POSTs the hidden form fields, following redirects.
    ///
    /// Returns the final URL of the redirect chain.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AuthenticationFailed` for an `action` that is
    /// not a valid URL, and communication errors for transport failures.
    #[instrument(skip(self, form))]
    pub async fn submit_form(&self, form: &LoginForm) -> Result<Url, FetchError> {
        let action = self.resolve_action(&form.action)?;
        debug!(fields = form.fields.len(), "Submitting login form");

        let response = self.http.post_form(action.as_str(), &form.fields).await?;
        let final_url = response.url().clone();
        debug!(status = %response.status(), "Login form submitted");
        Ok(final_url)
    }

    /// Resolves a possibly relative form `action` against the login URL.
    fn resolve_action(&self, action: &str) -> Result<Url, FetchError> {
        let base = Url::parse(&self.endpoints.login_url)
            .map_err(|e| FetchError::Internal(format!("invalid login URL: {e}")))?;
        base.join(action).map_err(|e| {
            FetchError::AuthenticationFailed(format!("invalid login form action: {e}"))
        })
    }

    /// POSTs a grant to the token endpoint.
    ///
    /// # Errors
    ///
    /// - refresh grant answered with 403: `FetchError::RefreshRejected`
    /// - code grant answered with 4xx: `FetchError::AuthenticationFailed`
    /// - any other non-2xx status: `FetchError::Status`
    /// - an undecodable success body: `FetchError::AuthenticationFailed`
    #[instrument(skip(self, grant), fields(grant_type = grant.name()))]
    pub async fn exchange(&self, grant: &TokenGrant<'_>) -> Result<TokenResponse, FetchError> {
        let response = self
            .http
            .post_json(&self.endpoints.token_url, grant)
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = %status, "Token endpoint returned an error");
            return Err(classify_token_error(grant, status, &body));
        }

        serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
            FetchError::AuthenticationFailed(format!("invalid token response: {e}"))
        })
    }
}

/// Maps a failed token endpoint status to an error.
fn classify_token_error(grant: &TokenGrant<'_>, status: StatusCode, body: &str) -> FetchError {
    match grant {
        TokenGrant::RefreshToken { .. } if status == StatusCode::FORBIDDEN => {
            FetchError::RefreshRejected
        }
        TokenGrant::AuthorizationCode { .. } if status.is_client_error() => {
            FetchError::AuthenticationFailed(format!(
                "code exchange failed with HTTP {}: {}",
                status.as_u16(),
                body_snippet(body)
            ))
        }
        _ => FetchError::status(status, body),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockito::Matcher;
    use serde_json::json;

    fn transport(server: &mockito::Server) -> AuthTransport {
        AuthTransport::new(
            HttpClient::new().unwrap(),
            AuthEndpoints::with_base_url(&server.url()),
        )
    }

    fn refresh_grant() -> TokenGrant<'static> {
        TokenGrant::RefreshToken {
            client_id: "client",
            refresh_token: "r1",
        }
    }

    #[test]
    fn test_grant_serialization() {
        let body = serde_json::to_value(refresh_grant()).unwrap();
        assert_eq!(
            body,
            json!({ "grant_type": "refresh_token", "client_id": "client", "refresh_token": "r1" })
        );

        let code = TokenGrant::AuthorizationCode {
            client_id: "c",
            code: "abc",
            code_verifier: "v",
            redirect_uri: "https://x",
        };
        let body = serde_json::to_value(code).unwrap();
        assert_eq!(body["grant_type"], "authorization_code");
        assert_eq!(body["code_verifier"], "v");
    }

    #[tokio::test]
    async fn test_refresh_403_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({ "grant_type": "refresh_token" })))
            .with_status(403)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = transport(&server).exchange(&refresh_grant()).await.unwrap_err();
        assert!(matches!(err, FetchError::RefreshRejected));
        assert_eq!(err.kind(), ErrorKind::Authentication);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_other_errors_are_communication_errors() {
        for status in [400, 401, 429, 500, 503] {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/oauth/token")
                .with_status(status)
                .with_body("nope")
                .create_async()
                .await;

            let err = transport(&server).exchange(&refresh_grant()).await.unwrap_err();
            assert!(
                matches!(err, FetchError::Status { .. }),
                "status {status} gave {err:?}"
            );
            assert_eq!(err.kind(), ErrorKind::Communication, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_code_exchange_4xx_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let grant = TokenGrant::AuthorizationCode {
            client_id: "c",
            code: "bad",
            code_verifier: "v",
            redirect_uri: "r",
        };
        let err = transport(&server).exchange(&grant).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_exchange_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"a","id_token":"i","expires_in":86400,"token_type":"Bearer"}"#)
            .create_async()
            .await;

        let token = transport(&server).exchange(&refresh_grant()).await.unwrap();
        assert_eq!(token.access_token, "a");
        assert_eq!(token.expires_in, Some(86400));
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_password_login_failure_carries_body_prefix() {
        let mut server = mockito::Server::new_async().await;
        let long_body = format!("Wrong email or password.{}", "x".repeat(500));
        server
            .mock("POST", "/usernamepassword/login")
            .with_status(401)
            .with_body(long_body)
            .create_async()
            .await;

        let t = transport(&server);
        let endpoints = t.endpoints().clone();
        let request = PasswordLoginRequest {
            client_id: &endpoints.client_id,
            redirect_uri: &endpoints.redirect_uri,
            tenant: &endpoints.tenant,
            response_type: "code",
            scope: endpoints.scope_string(),
            audience: &endpoints.audience,
            state: "s",
            nonce: "n",
            username: "me@example.com",
            password: "pw",
            connection: &endpoints.connection,
            code_challenge: "c",
            code_challenge_method: "S256",
        };
        let err = t.password_login(&request).await.unwrap_err();
        let FetchError::AuthenticationFailed(msg) = err else {
            panic!("expected authentication failure");
        };
        assert!(msg.contains("Wrong email or password."));
        assert!(msg.len() < 260);
    }

    #[tokio::test]
    async fn test_authorize_without_redirect() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/authorize")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html></html>")
            .create_async()
            .await;

        let location = transport(&server).authorize(&[("state", "x")]).await.unwrap();
        assert!(location.is_none());
    }
}
