// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ovolink Fetch
//!
//! HTTP host and authentication layer for ovolink.
//!
//! ## Host APIs
//!
//! - [`host::http`] - HTTP client with tracing, cookie session and domain
//!   allowlist
//!
//! ## Authentication
//!
//! The [`auth`] module obtains and keeps valid the OAuth2 bearer/ID token
//! pair:
//!
//! - [`TokenStore`] - Current credentials and their expiry
//! - [`AuthTransport`] - Authorization, password-login and token exchanges
//! - [`CredentialAcquirer`] - PKCE code exchange and scripted password login
//! - [`AuthGuard`] - Refresh-before-call and response classification
//!
//! ## Example
//!
//! ```ignore
//! use ovolink_fetch::{AuthEndpoints, AuthGuard, AuthTransport, CredentialAcquirer, HttpClient, TokenStore};
//!
//! let http = HttpClient::for_ovo()?;
//! let acquirer = CredentialAcquirer::new(AuthTransport::new(http, AuthEndpoints::default()));
//! let credentials = acquirer.password_login("me@example.com", &password).await?;
//!
//! let guard = AuthGuard::new(acquirer, TokenStore::with_credentials(credentials));
//! let fresh = guard.ensure_fresh().await?;
//! ```

// Core modules
pub mod auth;
pub mod error;
pub mod host;

// Re-export key types at crate root

// Errors
pub use error::{ErrorKind, FetchError, HttpError};

// Host APIs
pub use host::http::{HttpClient, ResponseExt};

// Authentication
pub use auth::acquirer::{AuthorizationRequest, CredentialAcquirer};
pub use auth::endpoints::AuthEndpoints;
pub use auth::guard::{decode_authenticated_json, AuthGuard};
pub use auth::jwt::{decode_claims, email_claim, JwtClaims};
pub use auth::login_form::{FormExtractor, LoginForm, RegexFormExtractor};
pub use auth::pkce::PkceChallenge;
pub use auth::token_store::{credentials_from_response, derive_expiry, TokenStore};
pub use auth::transport::AuthTransport;
