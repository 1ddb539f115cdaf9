//! PKCE (RFC 7636) and opaque random values.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Number of random bytes behind a verifier, `state` or `nonce`.
const RANDOM_BYTES: usize = 32;

/// The only challenge method ovolink sends.
pub const CHALLENGE_METHOD: &str = "S256";

/// Returns `len` random bytes, base64url encoded without padding.
///
/// # Errors
///
/// Returns `FetchError::Internal` if the system RNG fails.
pub fn random_token(len: usize) -> Result<String, FetchError> {
    let mut bytes = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| FetchError::Internal("system random generator failed".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Verifier/challenge pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    verifier: String,
    challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh pair from 32 random bytes.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Internal` if the system RNG fails.
    pub fn generate() -> Result<Self, FetchError> {
        Ok(Self::from_verifier(random_token(RANDOM_BYTES)?))
    }

    /// Derives the challenge for an existing verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let hash = digest(&SHA256, verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hash.as_ref());
        Self {
            verifier,
            challenge,
        }
    }

    /// The secret sent to the token endpoint.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// The hash sent to the authorization endpoint.
    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"[redacted]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_vector() {
        let pkce = PkceChallenge::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(pkce.challenge(), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGEg3Ecmcg");
    }

    #[test]
    fn test_generated_verifier_shape() {
        let pkce = PkceChallenge::generate().unwrap();
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(pkce.verifier().len(), 43);
        assert!(!pkce.verifier().contains('='));
        assert!(!pkce.challenge().contains('='));
        assert_eq!(pkce.challenge().len(), 43);
    }

    #[test]
    fn test_random_tokens_differ() {
        assert_ne!(random_token(32).unwrap(), random_token(32).unwrap());
    }

    #[test]
    fn test_debug_hides_verifier() {
        let pkce = PkceChallenge::from_verifier("super-secret-verifier");
        assert!(!format!("{pkce:?}").contains("super-secret"));
    }
}
