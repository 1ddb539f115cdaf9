//! OAuth endpoint configuration.

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Identity provider base URL.
pub const AUTH_BASE_URL: &str = "https://login.ovoenergy.com.au";

/// Customer portal base URL.
pub const PORTAL_BASE_URL: &str = "https://my.ovoenergy.com.au";

/// Public OAuth client id of the customer portal.
pub const CLIENT_ID: &str = "5JHnPn71qgV3LmF3I3xX0KvfRBdROVhR";

/// Requested scopes. `offline_access` is what yields a refresh token.
pub const SCOPES: &[&str] = &["openid", "profile", "email", "offline_access"];

/// Database connection used by the password login.
pub const CONNECTION: &str = "prod-myovo-auth";

/// Identity provider tenant sent with the password login.
pub const TENANT: &str = "ovoenergy-au";

// ============================================================================
// Endpoints
// ============================================================================

/// Every URL and constant the authentication flows need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// Authorization endpoint (GET).
    pub authorize_url: String,
    /// Password login endpoint (POST JSON).
    pub login_url: String,
    /// Token endpoint (POST JSON).
    pub token_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// Redirect URI registered for the client.
    pub redirect_uri: String,
    /// API audience.
    pub audience: String,
    /// Requested scopes.
    pub scopes: Vec<String>,
    /// Password login connection.
    pub connection: String,
    /// Password login tenant.
    pub tenant: String,
}

impl AuthEndpoints {
    /// Points every endpoint at `base_url`, keeping the client constants.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            authorize_url: format!("{base}/authorize"),
            login_url: format!("{base}/usernamepassword/login"),
            token_url: format!("{base}/oauth/token"),
            redirect_uri: format!("{base}/callback?login=oea"),
            audience: format!("{base}/api"),
            ..Self::default()
        }
    }

    /// Space-separated scope string.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: format!("{AUTH_BASE_URL}/authorize"),
            login_url: format!("{AUTH_BASE_URL}/usernamepassword/login"),
            token_url: format!("{AUTH_BASE_URL}/oauth/token"),
            client_id: CLIENT_ID.to_string(),
            redirect_uri: format!("{PORTAL_BASE_URL}?login=oea"),
            audience: format!("{AUTH_BASE_URL}/api"),
            scopes: SCOPES.iter().map(ToString::to_string).collect(),
            connection: CONNECTION.to_string(),
            tenant: TENANT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_defaults() {
        let e = AuthEndpoints::default();
        assert_eq!(e.token_url, "https://login.ovoenergy.com.au/oauth/token");
        assert_eq!(e.audience, "https://login.ovoenergy.com.au/api");
        assert_eq!(e.redirect_uri, "https://my.ovoenergy.com.au?login=oea");
        assert_eq!(e.scope_string(), "openid profile email offline_access");
    }

    #[test]
    fn test_with_base_url() {
        let e = AuthEndpoints::with_base_url("http://127.0.0.1:9000/");
        assert_eq!(e.authorize_url, "http://127.0.0.1:9000/authorize");
        assert_eq!(e.login_url, "http://127.0.0.1:9000/usernamepassword/login");
        assert_eq!(e.client_id, CLIENT_ID);
    }
}
