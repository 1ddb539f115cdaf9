//! Billing account types.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Billing account identifier.
///
/// Resolved once per configured instance and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The API sends ids as either numbers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One account from `GetContactInfo`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account id used by the data queries.
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    /// Human-facing account number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: Option<String>,
    /// Customer id.
    #[serde(default, deserialize_with = "string_or_number")]
    pub customer_id: Option<String>,
    /// Whether the account is closed.
    #[serde(default)]
    pub closed: Option<bool>,
    /// Billing system name.
    #[serde(default)]
    pub system: Option<String>,
    /// Whether the site has solar.
    #[serde(default)]
    pub has_solar: Option<bool>,
}

impl Account {
    /// Returns true if the account is open. A missing flag counts as open.
    pub fn is_active(&self) -> bool {
        !self.closed.unwrap_or(false)
    }

    /// Returns the account id, if present.
    pub fn account_id(&self) -> Option<AccountId> {
        self.id.as_deref().map(AccountId::from)
    }
}
