//! Credential types.
//!
//! A [`CredentialSet`] is always replaced as a whole. The only value carried
//! over between sets is the refresh token, and only when the token endpoint
//! omits a new one (see [`CredentialSet::with_fallback_refresh_token`]).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Safety buffer subtracted from `expires_at` when checking expiry.
pub const EXPIRY_BUFFER_MINUTES: i64 = 5;

// ============================================================================
// Credential Set
// ============================================================================

/// Bearer/ID token pair with its absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    /// OAuth access token sent as `authorization: Bearer ...`.
    pub access_token: String,
    /// OpenID identity token sent in the secondary identity header.
    pub id_token: String,
    /// Refresh token, absent for manually entered credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
}

impl CredentialSet {
    /// Creates a new credential set.
    pub fn new(
        access_token: impl Into<String>,
        id_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: id_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Returns true if the token is expired (with a 5 minute buffer).
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the token counts as expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - Duration::minutes(EXPIRY_BUFFER_MINUTES)
    }

    /// Returns true if a non-empty refresh token is present.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Time remaining until `expires_at`.
    pub fn time_until_expiry(&self) -> Duration {
        self.expires_at - Utc::now()
    }

    /// Keeps `previous` as the refresh token when this set has none.
    #[must_use]
    pub fn with_fallback_refresh_token(mut self, previous: Option<&str>) -> Self {
        if !self.has_refresh_token() {
            self.refresh_token = previous.map(ToString::to_string);
        }
        self
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_token", &"[redacted]")
            .field("id_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ============================================================================
// Token Response
// ============================================================================

/// Raw payload returned by the token endpoint.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Identity token.
    #[serde(default)]
    pub id_token: String,
    /// Refresh token (only when `offline_access` was granted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Token type, normally `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
