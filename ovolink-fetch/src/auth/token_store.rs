//! In-memory holder of the current credential set.
//!
//! The store performs no I/O. All mutation goes through
//! [`TokenStore::replace`], which swaps the whole set at once.

use chrono::{DateTime, Duration, Utc};
use ovolink_core::{CredentialSet, TokenResponse};
use tracing::debug;

use super::jwt::token_expiry;

/// Lifetime assumed when neither `expires_in` nor `exp` is available.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Derives the absolute expiry of an access token.
///
/// Order: a positive `expires_in`, then the token's `exp` claim, then
/// [`DEFAULT_TOKEN_LIFETIME_SECS`] from `now`.
pub fn derive_expiry(
    access_token: &str,
    expires_in: Option<i64>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(secs) = expires_in.filter(|s| *s > 0) {
        return now + Duration::seconds(secs);
    }
    token_expiry(access_token)
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS))
}

/// Converts a token endpoint payload into a credential set.
pub fn credentials_from_response(response: TokenResponse, now: DateTime<Utc>) -> CredentialSet {
    let expires_at = derive_expiry(&response.access_token, response.expires_in, now);
    CredentialSet::new(
        response.access_token,
        response.id_token,
        response.refresh_token.filter(|t| !t.is_empty()),
        expires_at,
    )
}

/// Owner of the current [`CredentialSet`].
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    current: Option<CredentialSet>,
}

impl TokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credentials`.
    pub fn with_credentials(credentials: CredentialSet) -> Self {
        Self {
            current: Some(credentials),
        }
    }

    /// The current credential set, if any.
    pub fn current_credentials(&self) -> Option<&CredentialSet> {
        self.current.as_ref()
    }

    /// Returns true if there are no credentials or they are within five
    /// minutes of expiry.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// [`Self::is_expired`] evaluated at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.current.as_ref().is_none_or(|c| c.is_expired_at(now))
    }

    /// Returns true if a non-empty access token is held.
    pub fn has_access_token(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| !c.access_token.is_empty())
    }

    /// The current refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|c| c.refresh_token.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Swaps in a new credential set.
    ///
    /// If `credentials` has no refresh token, the previous one is kept.
    pub fn replace(&mut self, credentials: CredentialSet) {
        let previous = self.refresh_token().map(ToString::to_string);
        let next = credentials.with_fallback_refresh_token(previous.as_deref());
        debug!(expires_at = %next.expires_at, has_refresh = next.has_refresh_token(), "Credentials replaced");
        self.current = Some(next);
    }

    /// Drops the current credentials.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::fake_jwt;
    use serde_json::json;

    fn response(access_token: &str, expires_in: Option<i64>, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access_token.to_string(),
            id_token: "id".to_string(),
            refresh_token: refresh.map(ToString::to_string),
            expires_in,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    #[test]
    fn test_empty_store_is_expired() {
        let store = TokenStore::new();
        assert!(store.is_expired());
        assert!(!store.has_access_token());
        assert!(store.current_credentials().is_none());
    }

    #[test]
    fn test_expires_in_expiry_window() {
        let now = Utc::now();
        let mut store = TokenStore::new();
        store.replace(credentials_from_response(response("opaque", Some(3600), None), now));

        assert!(!store.is_expired_at(now));
        assert!(!store.is_expired_at(now + Duration::minutes(54)));
        assert!(store.is_expired_at(now + Duration::minutes(55)));
    }

    #[test]
    fn test_exp_claim_used_without_expires_in() {
        let now = Utc::now();
        let exp = now.timestamp() + 7200;
        let token = fake_jwt(&json!({ "exp": exp }));
        let creds = credentials_from_response(response(&token, None, None), now);
        assert_eq!(creds.expires_at.timestamp(), exp);
    }

    #[test]
    fn test_default_lifetime_without_exp_or_expires_in() {
        let now = Utc::now();
        let token = fake_jwt(&json!({ "sub": "no-exp" }));
        let creds = credentials_from_response(response(&token, None, None), now);
        assert_eq!(creds.expires_at, now + Duration::hours(1));

        let opaque = credentials_from_response(response("opaque", Some(0), None), now);
        assert_eq!(opaque.expires_at, now + Duration::hours(1));
    }

    #[test]
    fn test_replace_keeps_refresh_token_when_omitted() {
        let now = Utc::now();
        let mut store = TokenStore::new();
        store.replace(credentials_from_response(response("a1", Some(60), Some("r1")), now));
        store.replace(credentials_from_response(response("a2", Some(60), None), now));

        let current = store.current_credentials().unwrap();
        assert_eq!(current.access_token, "a2");
        assert_eq!(store.refresh_token(), Some("r1"));

        store.replace(credentials_from_response(response("a3", Some(60), Some("r2")), now));
        assert_eq!(store.refresh_token(), Some("r2"));
    }

    #[test]
    fn test_clear() {
        let mut store =
            TokenStore::with_credentials(CredentialSet::new("a", "i", None, Utc::now()));
        assert!(store.has_access_token());
        store.clear();
        assert!(!store.has_access_token());
    }
}
