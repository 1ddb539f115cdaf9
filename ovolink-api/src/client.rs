//! GraphQL client for the customer portal.
//!
//! Every call goes through the [`AuthGuard`]: credentials are refreshed
//! inline when expired, and the response is classified before decoding.
//!
//! # Request Headers
//!
//! ```text
//! POST https://my.ovoenergy.com.au/graphql
//! authorization: Bearer <access_token>
//! myovo-id-token: <id_token>
//! accept: */*
//! content-type: application/json
//! origin: https://my.ovoenergy.com.au
//! referer: https://my.ovoenergy.com.au/usage
//! ```
//!
//! # Response Envelope
//!
//! ```json
//! { "data": { "GetIntervalData": { "daily": {...}, ... } }, "errors": [...] }
//! ```
//!
//! A non-empty `errors` array fails the call with every message; a missing
//! `data` envelope or operation field is a protocol error.

use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, instrument, warn};

use ovolink_core::{Account, AccountId, CredentialSet, IntervalData, UsageData};
use ovolink_fetch::{decode_authenticated_json, email_claim, AuthGuard, FetchError, HttpClient};

use crate::endpoints::{ApiEndpoints, ID_TOKEN_HEADER};
use crate::queries::{
    GET_CONTACT_INFO, GET_CONTACT_INFO_QUERY, GET_HOURLY_DATA, GET_HOURLY_DATA_QUERY,
    GET_INTERVAL_DATA, GET_INTERVAL_DATA_QUERY,
};

/// Date format of the hourly query.
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Response Envelope
// ============================================================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactInfo {
    #[serde(default)]
    accounts: Option<Vec<Account>>,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated client for the usage GraphQL API.
#[derive(Debug, Clone)]
pub struct OvoApiClient {
    http: HttpClient,
    guard: Arc<AuthGuard>,
    endpoints: ApiEndpoints,
}

impl OvoApiClient {
    /// Creates a client for the production endpoint.
    pub fn new(http: HttpClient, guard: Arc<AuthGuard>) -> Self {
        Self::with_endpoints(http, guard, ApiEndpoints::default())
    }

    /// Creates a client for custom endpoints.
    pub fn with_endpoints(http: HttpClient, guard: Arc<AuthGuard>, endpoints: ApiEndpoints) -> Self {
        Self {
            http,
            guard,
            endpoints,
        }
    }

    /// The auth guard in front of every call.
    pub fn guard(&self) -> &Arc<AuthGuard> {
        &self.guard
    }

    /// Returns true if the held access token is present and not expired.
    pub async fn is_authenticated(&self) -> bool {
        self.guard.is_authenticated().await
    }

    fn headers(&self, credentials: &CredentialSet, referer_path: &str) -> Result<HeaderMap, FetchError> {
        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|_| FetchError::AuthenticationFailed("token contains invalid header characters".to_string()))
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, value(&format!("Bearer {}", credentials.access_token))?);
        headers.insert(HeaderName::from_static(ID_TOKEN_HEADER), value(&credentials.id_token)?);
        headers.insert(ORIGIN, value(&self.endpoints.origin)?);
        headers.insert(REFERER, value(&self.endpoints.referer(referer_path))?);
        Ok(headers)
    }

    /// Runs one GraphQL operation and decodes `data.<operation>`.
    async fn execute<T: DeserializeOwned>(
        &self,
        credentials: &CredentialSet,
        operation: &str,
        query: &str,
        variables: Value,
        referer_path: &str,
    ) -> Result<T, FetchError> {
        let payload = json!({
            "operationName": operation,
            "variables": variables,
            "query": query,
        });

        let response = self
            .http
            .post_json_with_headers(
                &self.endpoints.graphql_url,
                self.headers(credentials, referer_path)?,
                &payload,
            )
            .await?;

        let envelope: GraphQlResponse = decode_authenticated_json(response).await?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors
                .into_iter()
                .map(|e| e.message.unwrap_or_else(|| "Unknown error".to_string()))
                .collect();
            error!(operation, errors = ?messages, "GraphQL errors");
            return Err(FetchError::GraphQl(messages));
        }

        let mut data = envelope
            .data
            .filter(|d| !d.is_null())
            .ok_or_else(|| FetchError::InvalidResponse("response has no data".to_string()))?;

        let field = data
            .get_mut(operation)
            .map(Value::take)
            .filter(|v| !v.is_null())
            .ok_or_else(|| FetchError::InvalidResponse(format!("response has no {operation}")))?;

        serde_json::from_value(field)
            .map_err(|e| FetchError::InvalidResponse(format!("malformed {operation}: {e}")))
    }

    /// Fetches the accounts of the logged-in customer.
    ///
    /// # Errors
    ///
    /// `FetchError::InvalidIdentityToken` if the ID token has no `email`
    /// claim, plus any error of the underlying call.
    #[instrument(skip(self))]
    pub async fn contact_info(&self) -> Result<Vec<Account>, FetchError> {
        let credentials = self.guard.ensure_fresh().await?;
        let email = email_claim(&credentials.id_token)?;

        let info: ContactInfo = self
            .execute(
                &credentials,
                GET_CONTACT_INFO,
                GET_CONTACT_INFO_QUERY,
                json!({ "input": { "email": email } }),
                "/",
            )
            .await?;
        let accounts = info.accounts.unwrap_or_default();
        debug!(count = accounts.len(), "Fetched contact info");
        Ok(accounts)
    }

    /// Ids of every open account, in response order.
    ///
    /// # Errors
    ///
    /// `FetchError::NoActiveAccounts` if every account is closed.
    pub async fn account_ids(&self) -> Result<Vec<AccountId>, FetchError> {
        let ids: Vec<AccountId> = self
            .contact_info()
            .await?
            .iter()
            .filter(|a| a.is_active())
            .filter_map(Account::account_id)
            .collect();
        if ids.is_empty() {
            warn!("No active accounts found");
            return Err(FetchError::NoActiveAccounts);
        }
        Ok(ids)
    }

    /// The first open account.
    ///
    /// # Errors
    ///
    /// See [`Self::account_ids`].
    pub async fn primary_account_id(&self) -> Result<AccountId, FetchError> {
        self.account_ids()
            .await?
            .into_iter()
            .next()
            .ok_or(FetchError::NoActiveAccounts)
    }

    /// Fetches daily, monthly and yearly usage.
    ///
    /// # Errors
    ///
    /// Any authentication, communication or API error.
    #[instrument(skip(self), fields(account = %account_id))]
    pub async fn fetch_interval_data(&self, account_id: &AccountId) -> Result<IntervalData, FetchError> {
        let credentials = self.guard.ensure_fresh().await?;
        let data: IntervalData = self
            .execute(
                &credentials,
                GET_INTERVAL_DATA,
                GET_INTERVAL_DATA_QUERY,
                json!({ "input": { "accountId": account_id.as_str() } }),
                "/usage",
            )
            .await?;
        debug!(
            daily = data.daily.solar.len() + data.daily.export.len(),
            "Fetched interval data"
        );
        Ok(data)
    }

    /// Fetches hourly usage for `[start_date, end_date]`.
    ///
    /// # Errors
    ///
    /// Any authentication, communication or API error.
    #[instrument(skip(self), fields(account = %account_id))]
    pub async fn fetch_hourly_data(
        &self,
        account_id: &AccountId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<UsageData, FetchError> {
        let credentials = self.guard.ensure_fresh().await?;
        let data: UsageData = self
            .execute(
                &credentials,
                GET_HOURLY_DATA,
                GET_HOURLY_DATA_QUERY,
                json!({
                    "input": {
                        "accountId": account_id.as_str(),
                        "startDate": start_date.format(DATE_FORMAT).to_string(),
                        "endDate": end_date.format(DATE_FORMAT).to_string(),
                    }
                }),
                "/usage",
            )
            .await?;
        debug!(
            solar = data.solar.len(),
            export = data.export.len(),
            "Fetched hourly data"
        );
        Ok(data)
    }

    /// Performs one interval fetch to verify the setup.
    ///
    /// # Errors
    ///
    /// The classified error of the failed fetch.
    pub async fn test_connection(&self, account_id: &AccountId) -> Result<(), FetchError> {
        self.fetch_interval_data(account_id).await.map(|_| ()).map_err(|e| {
            error!(error = %e, "Connection test failed");
            e
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
