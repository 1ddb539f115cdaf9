//! JWT claim decoding.
//!
//! Tokens are opaque bearer credentials here, not trust anchors: the payload
//! is decoded for `exp` and `email` only and the signature is never checked.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::trace;

use crate::error::FetchError;

/// Claims ovolink reads from access and identity tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwtClaims {
    /// Expiry as seconds since the epoch.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Account holder e-mail (identity token).
    #[serde(default)]
    pub email: Option<String>,
}

impl JwtClaims {
    /// The `exp` claim as a timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Decodes the payload segment of a JWT.
///
/// # Errors
///
/// Returns `FetchError::InvalidIdentityToken` if the token is not a
/// three-part JWT or its payload is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<JwtClaims, FetchError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(FetchError::InvalidIdentityToken(format!(
            "expected 3 parts, got {}",
            parts.len()
        )));
    }

    let payload_b64 = parts[1];
    let decoded = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| STANDARD.decode(payload_b64))
        .map_err(|e| FetchError::InvalidIdentityToken(format!("base64 decode error: {e}")))?;

    trace!(len = decoded.len(), "Decoded JWT payload");

    serde_json::from_slice(&decoded)
        .map_err(|e| FetchError::InvalidIdentityToken(format!("JSON parse error: {e}")))
}

/// Reads the `exp` claim of a token, ignoring any decode failure.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    decode_claims(token).ok().and_then(|c| c.expires_at())
}

/// Reads the `email` claim of an identity token.
///
/// # Errors
///
/// Returns `FetchError::InvalidIdentityToken` if the token cannot be
/// decoded or carries no non-empty `email`.
pub fn email_claim(id_token: &str) -> Result<String, FetchError> {
    decode_claims(id_token)?
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| FetchError::InvalidIdentityToken("email not found in ID token".to_string()))
}

/// Builds an unsigned JWT with the given JSON payload. Test helper.
#[cfg(test)]
pub(crate) fn fake_jwt(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_exp_and_email() {
        let token = fake_jwt(&json!({ "exp": 1_700_000_000, "email": "me@example.com" }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(email_claim(&token).unwrap(), "me@example.com");
        assert_eq!(
            token_expiry(&token).unwrap().timestamp(),
            1_700_000_000
        );
    }

    #[test]
    fn test_missing_email_is_identity_error() {
        let token = fake_jwt(&json!({ "sub": "x" }));
        let err = email_claim(&token).unwrap_err();
        assert!(matches!(err, FetchError::InvalidIdentityToken(_)));
        assert!(err.requires_reauth());
    }

    #[test]
    fn test_opaque_token_has_no_expiry() {
        assert!(token_expiry("not-a-jwt").is_none());
        assert!(token_expiry("a.!!!.c").is_none());
    }
}
