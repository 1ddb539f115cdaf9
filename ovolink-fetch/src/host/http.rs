//! HTTP client with tracing, a shared cookie session, and domain allowlist.
//!
//! This module provides a wrapped HTTP client that adds:
//! - Request/response tracing
//! - Domain allowlist for security
//! - One cookie jar shared by the redirecting and non-redirecting clients,
//!   so a login session survives across the authorize/login/callback steps
//! - Convenience methods for the request shapes the auth and data layers use

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap};
use reqwest::{redirect, Client, Response};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::HttpError;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum redirects followed by the redirecting client.
const MAX_REDIRECTS: usize = 10;

/// User agent string for ovolink.
const USER_AGENT: &str = concat!("ovolink/", env!("CARGO_PKG_VERSION"));

/// Domains ovolink talks to in production.
pub const OVO_DOMAINS: &[&str] = &["ovoenergy.com.au"];

// ============================================================================
// HTTP Client
// ============================================================================

/// HTTP client wrapper with tracing, cookies, and domain allowlist.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    no_redirect: Client,
    allowed_domains: Option<Vec<String>>,
}

impl HttpClient {
    /// Creates a new HTTP client with default settings.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Build` if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Build` if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        Self::build(timeout, None)
    }

    /// Creates a client restricted to the given domains and their subdomains.
    ///
    /// Redirects to any other host are refused.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Build` if the TLS backend cannot be initialised.
    pub fn with_allowed_domains(domains: Vec<String>) -> Result<Self, HttpError> {
        Self::build(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Some(domains))
    }

    /// Creates a client restricted to the production OVO domains.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Build` if the TLS backend cannot be initialised.
    pub fn for_ovo() -> Result<Self, HttpError> {
        Self::with_allowed_domains(OVO_DOMAINS.iter().map(ToString::to_string).collect())
    }

    fn build(timeout: Duration, allowed_domains: Option<Vec<String>>) -> Result<Self, HttpError> {
        let jar = Arc::new(Jar::default());

        let build = |policy: redirect::Policy| {
            Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .cookie_provider(Arc::clone(&jar))
                .redirect(policy)
                .build()
                .map_err(|e| HttpError::Build(e.to_string()))
        };

        Ok(Self {
            inner: build(redirect_policy(allowed_domains.clone()))?,
            no_redirect: build(redirect::Policy::none())?,
            allowed_domains,
        })
    }

    /// Checks if a URL's domain is allowed.
    fn is_domain_allowed(&self, url: &str) -> Result<(), HttpError> {
        let Some(ref allowed) = self.allowed_domains else {
            return Ok(()); // No restrictions
        };

        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("No host in URL".to_string()))?;

        if host_allowed(allowed, host) {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }

    /// Performs a GET request without following redirects.
    ///
    /// Used to capture the `Location` of an authorization redirect.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_without_redirect<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        query: &T,
    ) -> Result<Response, HttpError> {
        self.is_domain_allowed(url)?;
        debug!("GET request (no redirect)");

        let response = self.no_redirect.get(url).query(query).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a POST request with JSON body.
    #[instrument(skip(self, body), fields(url = %url))]
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, HttpError> {
        self.post_json_with_headers(url, HeaderMap::new(), body).await
    }

    /// Performs a POST request with JSON body and custom headers.
    #[instrument(skip(self, headers, body), fields(url = %url))]
    pub async fn post_json_with_headers<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
    ) -> Result<Response, HttpError> {
        self.is_domain_allowed(url)?;
        debug!("POST request with JSON");

        let response = self
            .inner
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a POST request with form data, following redirects.
    ///
    /// The returned response's [`Response::url`] is the final URL of the
    /// redirect chain.
    #[instrument(skip(self, form), fields(url = %url))]
    pub async fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<Response, HttpError> {
        self.is_domain_allowed(url)?;
        debug!("POST request with form data");

        let response = self.inner.post(url).form(form).send().await?;
        debug!(status = %response.status(), final_url = %response.url(), "Response received");
        Ok(response)
    }
}

/// Returns true if `host` is one of `allowed` or a subdomain of one.
fn host_allowed(allowed: &[String], host: &str) -> bool {
    allowed
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
}

/// Redirect policy of the following client; every hop must stay allowed.
fn redirect_policy(allowed_domains: Option<Vec<String>>) -> redirect::Policy {
    let Some(allowed) = allowed_domains else {
        return redirect::Policy::limited(MAX_REDIRECTS);
    };
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let host = attempt.url().host_str().unwrap_or_default().to_string();
        if host_allowed(&allowed, &host) {
            attempt.follow()
        } else {
            warn!(host = %host, "Refusing redirect to a domain outside the allowlist");
            attempt.error(HttpError::DomainNotAllowed(host))
        }
    })
}

// ============================================================================
// Response Extensions
// ============================================================================

/// Extension trait for Response handling.
pub trait ResponseExt {
    /// The `content-type` header, lowercased, or an empty string.
    fn content_type(&self) -> String;

    /// Returns true if the body is declared as JSON.
    fn is_json(&self) -> bool;

    /// The `Location` header resolved against the request URL.
    fn location(&self) -> Option<Url>;
}

impl ResponseExt for Response {
    fn content_type(&self) -> String {
        self.headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    fn is_json(&self) -> bool {
        is_json_content_type(&self.content_type())
    }

    fn location(&self) -> Option<Url> {
        let raw = self
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())?;
        self.url().join(raw).ok()
    }
}

/// Returns true for `application/json` and `+json` media types.
pub fn is_json_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

// ============================================================================
// Tests
// ============================================================================
