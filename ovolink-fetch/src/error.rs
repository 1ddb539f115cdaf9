//! Fetch error types.
//!
//! Every failure is classified into exactly one [`ErrorKind`]:
//!
//! - **Authentication** - missing, invalid or rejected credentials, and HTML
//!   served where JSON was expected. Callers must re-authenticate.
//! - **Communication** - transport failures and unexpected HTTP statuses.
//!   Transient; the next scheduled cycle may succeed.
//! - **Api** - well-formed responses carrying GraphQL errors or missing
//!   fields. Fails the cycle, not retried within it.

use thiserror::Error;

/// Maximum number of body characters carried in an error.
pub const BODY_SNIPPET_CHARS: usize = 200;

/// Returns the first [`BODY_SNIPPET_CHARS`] characters of `body`.
pub fn body_snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}

// ============================================================================
// Error Kind
// ============================================================================

/// Classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Credentials must be re-established.
    Authentication,
    /// Transient network or server failure.
    Communication,
    /// The API answered, but not with usable data.
    Api,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication error",
            Self::Communication => "communication error",
            Self::Api => "API error",
        })
    }
}

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for authentication and data fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    /// No access token is configured.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Login, code exchange or an authenticated call was refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The refresh token itself was rejected (HTTP 403).
    #[error("Refresh token rejected, re-authentication required")]
    RefreshRejected,

    /// The identity token could not be decoded or lacks a required claim.
    #[error("Invalid identity token: {0}")]
    InvalidIdentityToken(String),

    /// An HTML page was served instead of JSON.
    #[error("Expected JSON but received {content_type}, session is not authenticated")]
    HtmlResponse {
        /// The content type actually received.
        content_type: String,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Unexpected HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Leading part of the response body.
        body: String,
    },

    /// The GraphQL response carried an `errors` array.
    #[error("GraphQL errors: {}", .0.join(", "))]
    GraphQl(Vec<String>),

    /// A well-formed response lacked an expected field.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The contact lookup returned no open account.
    #[error("No active accounts found")]
    NoActiveAccounts,

    /// Local failure unrelated to the remote side.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Returns the error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated
            | Self::AuthenticationFailed(_)
            | Self::RefreshRejected
            | Self::InvalidIdentityToken(_)
            | Self::HtmlResponse { .. } => ErrorKind::Authentication,
            Self::Http(_) | Self::Status { .. } | Self::Internal(_) => ErrorKind::Communication,
            Self::GraphQl(_) | Self::InvalidResponse(_) | Self::NoActiveAccounts => ErrorKind::Api,
        }
    }

    /// Returns true if a later attempt may succeed without user action.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Communication
    }

    /// Returns true if the user has to log in again.
    pub fn requires_reauth(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    /// Builds a status error from a response body.
    pub fn status(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Status {
            status: status.as_u16(),
            body: body_snippet(body),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpError::Request(err))
    }
}

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

// ============================================================================
// Tests
// ============================================================================
