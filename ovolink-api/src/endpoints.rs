//! Data endpoint configuration.

use serde::{Deserialize, Serialize};

/// Customer portal origin.
pub const API_BASE_URL: &str = "https://my.ovoenergy.com.au";

/// Header carrying the identity token on every data call.
pub const ID_TOKEN_HEADER: &str = "myovo-id-token";

/// GraphQL URL and browser-context headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// `origin` header value.
    pub origin: String,
}

impl ApiEndpoints {
    /// Points the endpoint at `base_url`.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            graphql_url: format!("{base}/graphql"),
            origin: base.to_string(),
        }
    }

    /// `referer` header value for a portal page path.
    pub fn referer(&self, path: &str) -> String {
        format!("{}/{}", self.origin, path.trim_start_matches('/'))
    }
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self::with_base_url(API_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let e = ApiEndpoints::default();
        assert_eq!(e.graphql_url, "https://my.ovoenergy.com.au/graphql");
        assert_eq!(e.referer("usage"), "https://my.ovoenergy.com.au/usage");
        assert_eq!(e.referer(""), "https://my.ovoenergy.com.au/");
    }
}
