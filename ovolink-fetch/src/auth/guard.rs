//! Auth guard wrapped around every authenticated call.
//!
//! Before a call:
//! - no access token: fail with [`FetchError::NotAuthenticated`]
//! - expired with a refresh token: refresh inline, persist, proceed
//! - expired without a refresh token: proceed; the call is expected to fail
//!   downstream with an authentication error
//!
//! After a call, [`decode_authenticated_json`] checks the status and the
//! `content-type` before decoding, so an HTML login page served with 200
//! surfaces as an authentication error rather than a parse error.

use std::sync::Arc;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use ovolink_core::{CredentialSet, CredentialSink};

use super::acquirer::CredentialAcquirer;
use super::token_store::TokenStore;
use crate::error::{body_snippet, FetchError};
use crate::host::http::ResponseExt;

// ============================================================================
// Auth Guard
// ============================================================================

/// Owns the [`TokenStore`] and keeps it fresh.
pub struct AuthGuard {
    store: RwLock<TokenStore>,
    acquirer: CredentialAcquirer,
    sink: Option<Arc<dyn CredentialSink>>,
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("acquirer", &self.acquirer)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthGuard {
    /// Creates a guard over `store`.
    pub fn new(acquirer: CredentialAcquirer, store: TokenStore) -> Self {
        Self {
            store: RwLock::new(store),
            acquirer,
            sink: None,
        }
    }

    /// Writes every refreshed credential set to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn CredentialSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The credential acquirer used for refreshes.
    pub fn acquirer(&self) -> &CredentialAcquirer {
        &self.acquirer
    }

    /// A copy of the current credentials.
    pub async fn credentials(&self) -> Option<CredentialSet> {
        self.store.read().await.current_credentials().cloned()
    }

    /// Returns true if an access token is held and not expired.
    pub async fn is_authenticated(&self) -> bool {
        let store = self.store.read().await;
        store.has_access_token() && !store.is_expired()
    }

    /// Returns true if the held token needs refreshing.
    pub async fn is_expired(&self) -> bool {
        self.store.read().await.is_expired()
    }

    /// Installs credentials from a login or code exchange and persists them.
    pub async fn install(&self, credentials: CredentialSet) {
        let current = {
            let mut store = self.store.write().await;
            store.replace(credentials);
            store.current_credentials().cloned()
        };
        if let Some(current) = current {
            self.persist(&current).await;
        }
    }

    /// Returns credentials valid for the next call, refreshing if needed.
    ///
    /// # Errors
    ///
    /// `FetchError::NotAuthenticated` without an access token; any refresh
    /// failure is returned unchanged.
    #[instrument(skip(self))]
    pub async fn ensure_fresh(&self) -> Result<CredentialSet, FetchError> {
        {
            let store = self.store.read().await;
            let Some(current) = store.current_credentials() else {
                return Err(FetchError::NotAuthenticated);
            };
            if current.access_token.is_empty() {
                return Err(FetchError::NotAuthenticated);
            }
            if !store.is_expired() {
                return Ok(current.clone());
            }
            if store.refresh_token().is_none() {
                warn!("Access token expired and no refresh token is available");
                return Ok(current.clone());
            }
        }

        self.refresh_if_expired().await
    }

    /// Refreshes unconditionally.
    ///
    /// # Errors
    ///
    /// `FetchError::NotAuthenticated` without a refresh token, otherwise
    /// any refresh failure.
    #[instrument(skip(self))]
    pub async fn force_refresh(&self) -> Result<CredentialSet, FetchError> {
        let mut store = self.store.write().await;
        let refresh_token = store
            .refresh_token()
            .map(ToString::to_string)
            .ok_or(FetchError::NotAuthenticated)?;
        let refreshed = self.refresh_locked(&mut store, &refresh_token).await?;
        drop(store);
        self.persist(&refreshed).await;
        Ok(refreshed)
    }

    /// Refreshes under the write lock, re-checking expiry first so
    /// concurrent callers refresh only once.
    async fn refresh_if_expired(&self) -> Result<CredentialSet, FetchError> {
        let mut store = self.store.write().await;
        let Some(current) = store.current_credentials().cloned() else {
            return Err(FetchError::NotAuthenticated);
        };
        if !store.is_expired() {
            debug!("Token already refreshed by a concurrent caller");
            return Ok(current);
        }
        let Some(refresh_token) = store.refresh_token().map(ToString::to_string) else {
            return Ok(current);
        };

        let refreshed = self.refresh_locked(&mut store, &refresh_token).await?;
        drop(store);
        self.persist(&refreshed).await;
        Ok(refreshed)
    }

    async fn refresh_locked(
        &self,
        store: &mut TokenStore,
        refresh_token: &str,
    ) -> Result<CredentialSet, FetchError> {
        debug!("Refreshing access token");
        let credentials = self.acquirer.refresh(refresh_token).await.map_err(|e| {
            warn!(error = %e, "Token refresh failed");
            e
        })?;
        store.replace(credentials);
        info!("Access token refreshed");
        store
            .current_credentials()
            .cloned()
            .ok_or(FetchError::NotAuthenticated)
    }

    /// Writes credentials to the sink. Failures are logged, not returned.
    async fn persist(&self, credentials: &CredentialSet) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.persist(credentials).await {
            warn!(error = %e, "Failed to persist refreshed credentials");
        }
    }
}

// ============================================================================
// Response Decoding
// ============================================================================

/// Decodes the JSON body of an authenticated call.
///
/// - 401/403: authentication error
/// - other non-2xx: communication error
/// - non-JSON `content-type`: authentication error (HTML login page)
/// - undecodable JSON: API error
///
/// # Errors
///
/// See above.
pub async fn decode_authenticated_json<T: DeserializeOwned>(
    response: Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::AuthenticationFailed(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body_snippet(&body)
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::status(status, &body));
    }
    if !response.is_json() {
        let content_type = response.content_type();
        warn!(content_type = %content_type, "Non-JSON response to an authenticated call");
        return Err(FetchError::HtmlResponse {
            content_type: if content_type.is_empty() {
                "no content type".to_string()
            } else {
                content_type
            },
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| FetchError::InvalidResponse(format!("malformed JSON: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
