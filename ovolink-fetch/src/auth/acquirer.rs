//! Credential acquisition.
//!
//! Two strategies end in the same token-endpoint exchange:
//!
//! ## Authorization code + PKCE
//!
//! 1. [`CredentialAcquirer::authorization_request`] builds the URL the user
//!    opens in a browser, plus the verifier/state to keep
//! 2. The browser is redirected back with `code`
//! 3. [`CredentialAcquirer::exchange_code`] trades it for tokens
//!
//! ## Scripted password login
//!
//! Used when no browser redirect is available:
//!
//! 1. GET `/authorize` without following redirects to capture the session
//!    `state` (falling back to the locally generated one)
//! 2. POST username/password with the PKCE challenge and `state`
//! 3. Extract the auto-submit form from the returned HTML
//! 4. POST the form, follow redirects, read `code` from the final URL
//! 5. Exchange the code as above
//!
//! ```ignore
//! let acquirer = CredentialAcquirer::new(AuthTransport::new(http, AuthEndpoints::default()));
//! let credentials = acquirer.password_login("me@example.com", &password).await?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use ovolink_core::CredentialSet;

use super::login_form::{FormExtractor, RegexFormExtractor};
use super::pkce::{random_token, PkceChallenge, CHALLENGE_METHOD};
use super::token_store::credentials_from_response;
use super::transport::{AuthTransport, PasswordLoginRequest, TokenGrant};
use super::endpoints::AuthEndpoints;
use crate::error::FetchError;

/// Random bytes behind `state` and `nonce`.
const OPAQUE_VALUE_BYTES: usize = 32;

// ============================================================================
// Authorization Request
// ============================================================================

/// A prepared authorization-code request.
///
/// The PKCE verifier and `state` must be kept until the redirect comes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// URL to open in a browser.
    pub url: String,
    /// Opaque `state` echoed back by the redirect.
    pub state: String,
    /// Random `nonce` bound into the identity token.
    pub nonce: String,
    /// Verifier/challenge pair.
    pub pkce: PkceChallenge,
}

impl AuthorizationRequest {
    /// Creates a request with fresh PKCE, `state` and `nonce` values.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Internal` if randomness is unavailable or the
    /// authorize URL is invalid.
    pub fn generate(endpoints: &AuthEndpoints) -> Result<Self, FetchError> {
        let pkce = PkceChallenge::generate()?;
        let state = random_token(OPAQUE_VALUE_BYTES)?;
        let nonce = random_token(OPAQUE_VALUE_BYTES)?;

        let scope = endpoints.scope_string();
        let query = authorize_query(endpoints, &scope, &state, &nonce, &pkce);
        let url = Url::parse_with_params(&endpoints.authorize_url, &query)
            .map_err(|e| FetchError::Internal(format!("invalid authorize URL: {e}")))?;

        Ok(Self {
            url: url.into(),
            state,
            nonce,
            pkce,
        })
    }
}

/// Query parameters of the authorization endpoint.
fn authorize_query<'a>(
    endpoints: &'a AuthEndpoints,
    scope: &'a str,
    state: &'a str,
    nonce: &'a str,
    pkce: &'a PkceChallenge,
) -> Vec<(&'static str, &'a str)> {
    vec![
        ("client_id", endpoints.client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", endpoints.redirect_uri.as_str()),
        ("scope", scope),
        ("audience", endpoints.audience.as_str()),
        ("state", state),
        ("nonce", nonce),
        ("code_challenge", pkce.challenge()),
        ("code_challenge_method", CHALLENGE_METHOD),
    ]
}

/// Reads a query parameter from a URL.
fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Credential Acquirer
// ============================================================================

/// Produces fresh credential sets.
#[derive(Clone)]
pub struct CredentialAcquirer {
    transport: AuthTransport,
    extractor: Arc<dyn FormExtractor>,
}

impl std::fmt::Debug for CredentialAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAcquirer")
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl CredentialAcquirer {
    /// Creates an acquirer using the regex form extractor.
    pub fn new(transport: AuthTransport) -> Self {
        Self {
            transport,
            extractor: Arc::new(RegexFormExtractor::new()),
        }
    }

    /// Replaces the login form extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn FormExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// The configured endpoints.
    pub fn endpoints(&self) -> &AuthEndpoints {
        self.transport.endpoints()
    }

    /// Prepares an authorization-code + PKCE request.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationRequest::generate`].
    pub fn authorization_request(&self) -> Result<AuthorizationRequest, FetchError> {
        AuthorizationRequest::generate(self.endpoints())
    }

    /// Exchanges an authorization code for credentials.
    ///
    /// # Errors
    ///
    /// 4xx answers are authentication errors; other failures are
    /// communication errors.
    #[instrument(skip(self, code, code_verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<CredentialSet, FetchError> {
        let endpoints = self.endpoints();
        let grant = TokenGrant::AuthorizationCode {
            client_id: &endpoints.client_id,
            code,
            code_verifier,
            redirect_uri: &endpoints.redirect_uri,
        };
        let response = self.transport.exchange(&grant).await?;
        info!("Authorization code exchanged");
        Ok(credentials_from_response(response, Utc::now()))
    }

    /// Refreshes credentials with a refresh token.
    ///
    /// The returned set keeps `refresh_token` when the endpoint omits a new
    /// one.
    ///
    /// # Errors
    ///
    /// `FetchError::RefreshRejected` on HTTP 403, communication errors for
    /// any other failure status.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<CredentialSet, FetchError> {
        let grant = TokenGrant::RefreshToken {
            client_id: &self.endpoints().client_id,
            refresh_token,
        };
        let response = self.transport.exchange(&grant).await?;
        debug!(rotated = response.refresh_token.is_some(), "Token refreshed");
        Ok(credentials_from_response(response, Utc::now())
            .with_fallback_refresh_token(Some(refresh_token)))
    }

    /// Runs the scripted username/password login.
    ///
    /// # Errors
    ///
    /// Authentication errors for rejected credentials, an unparseable login
    /// response, or a redirect chain without `code`.
    #[instrument(skip(self, password))]
    pub async fn password_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<CredentialSet, FetchError> {
        let endpoints = self.endpoints();
        let pkce = PkceChallenge::generate()?;
        let local_state = random_token(OPAQUE_VALUE_BYTES)?;
        let nonce = random_token(OPAQUE_VALUE_BYTES)?;
        let scope = endpoints.scope_string();

        // 1. Session state from the authorize redirect
        let query = authorize_query(endpoints, &scope, &local_state, &nonce, &pkce);
        let state = match self.transport.authorize(&query).await? {
            Some(location) => query_param(&location, "state").unwrap_or_else(|| {
                debug!("Authorize redirect carried no state, using local state");
                local_state.clone()
            }),
            None => local_state.clone(),
        };

        // 2. Credentials
        let request = PasswordLoginRequest {
            client_id: &endpoints.client_id,
            redirect_uri: &endpoints.redirect_uri,
            tenant: &endpoints.tenant,
            response_type: "code",
            scope: scope.clone(),
            audience: &endpoints.audience,
            state: &state,
            nonce: &nonce,
            username,
            password,
            connection: &endpoints.connection,
            code_challenge: pkce.challenge(),
            code_challenge_method: CHALLENGE_METHOD,
        };
        let html = self.transport.password_login(&request).await?;

        // 3. Auto-submit form
        let form = self.extractor.extract(&html)?;
        debug!(fields = form.fields.len(), "Extracted login form");

        // 4. Callback redirect chain
        let final_url = self.transport.submit_form(&form).await?;
        let Some(code) = query_param(&final_url, "code") else {
            let reason = query_param(&final_url, "error_description")
                .or_else(|| query_param(&final_url, "error"))
                .unwrap_or_else(|| "no authorization code in redirect".to_string());
            warn!(reason = %reason, "Login redirect did not yield a code");
            return Err(FetchError::AuthenticationFailed(reason));
        };

        // 5. Token exchange
        self.exchange_code(&code, pkce.verifier()).await
    }
}

// ============================================================================
// Tests
// ============================================================================
