//! Persisted credential blob.
//!
//! Two layouts are accepted on disk:
//!
//! ```json
//! { "token": { "access_token": "...", "id_token": "...", "refresh_token": "...",
//!              "expires_in": 86400, "expires_at": 1709251200.0 },
//!   "account_id": "30001" }
//! ```
//!
//! written by the OAuth flows, and the flat layout of manually pasted
//! tokens:
//!
//! ```json
//! { "access_token": "...", "id_token": "...", "refresh_token": null }
//! ```
//!
//! A blob is written back in the layout it was read in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ovolink_core::{AccountId, CoreError, CredentialSet, CredentialSink};
use ovolink_fetch::auth::jwt::token_expiry;
use ovolink_fetch::derive_expiry;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::persistence::{load_json, remove_file, save_json};

// ============================================================================
// On-disk Shapes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_in: Option<i64>,
    /// Epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BlobFile {
    OAuth {
        token: StoredToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<AccountId>,
    },
    Manual {
        #[serde(flatten)]
        token: StoredToken,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        account_id: Option<AccountId>,
    },
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

#[allow(clippy::cast_precision_loss)]
fn to_epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

impl StoredToken {
    fn into_credentials(self, now: DateTime<Utc>) -> CredentialSet {
        let expires_at = self
            .expires_at
            .and_then(from_epoch_secs)
            .or_else(|| token_expiry(&self.access_token))
            .unwrap_or_else(|| derive_expiry(&self.access_token, self.expires_in, now));
        CredentialSet::new(
            self.access_token,
            self.id_token,
            self.refresh_token.filter(|t| !t.is_empty()),
            expires_at,
        )
    }

    fn from_credentials(credentials: &CredentialSet, now: DateTime<Utc>) -> Self {
        Self {
            access_token: credentials.access_token.clone(),
            id_token: credentials.id_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
            expires_in: Some((credentials.expires_at - now).num_seconds().max(0)),
            expires_at: Some(to_epoch_secs(credentials.expires_at)),
        }
    }
}

// ============================================================================
// Credential Blob
// ============================================================================

/// Which on-disk shape a blob uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialLayout {
    /// Nested `token` object written by the OAuth flows.
    OAuth,
    /// Flat tokens entered by hand.
    Manual,
}

/// Credentials plus the account they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialBlob {
    /// Current credential set.
    pub credentials: CredentialSet,
    /// Resolved account, if any.
    pub account_id: Option<AccountId>,
    /// On-disk shape.
    pub layout: CredentialLayout,
}

impl CredentialBlob {
    /// A blob in the OAuth layout.
    pub fn oauth(credentials: CredentialSet) -> Self {
        Self {
            credentials,
            account_id: None,
            layout: CredentialLayout::OAuth,
        }
    }

    /// A blob in the manual-token layout.
    pub fn manual(credentials: CredentialSet) -> Self {
        Self {
            credentials,
            account_id: None,
            layout: CredentialLayout::Manual,
        }
    }

    /// Parses a blob from JSON text.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidCredentials` if neither layout matches or the
    /// access token is empty.
    pub fn parse(json: &str, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let file: BlobFile = serde_json::from_str(json).map_err(|_| {
            StoreError::InvalidCredentials("expected a token object or access_token/id_token".to_string())
        })?;
        Self::from_file(file, now)
    }

    fn from_file(file: BlobFile, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let (token, account_id, layout) = match file {
            BlobFile::OAuth { token, account_id } => (token, account_id, CredentialLayout::OAuth),
            BlobFile::Manual { token, account_id } => (token, account_id, CredentialLayout::Manual),
        };
        if token.access_token.is_empty() {
            return Err(StoreError::InvalidCredentials("access_token is empty".to_string()));
        }
        Ok(Self {
            credentials: token.into_credentials(now),
            account_id,
            layout,
        })
    }

    fn to_file(&self, now: DateTime<Utc>) -> BlobFile {
        let token = StoredToken::from_credentials(&self.credentials, now);
        let account_id = self.account_id.clone();
        match self.layout {
            CredentialLayout::OAuth => BlobFile::OAuth { token, account_id },
            CredentialLayout::Manual => BlobFile::Manual { token, account_id },
        }
    }
}

// ============================================================================
// Credential File
// ============================================================================

/// The credential blob on disk.
///
/// Writes are serialized so a refresh write-back and an account-id
/// update cannot interleave.
#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialFile {
    /// Blob at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the blob; `None` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Any read or parse failure of an existing file.
    pub async fn load(&self) -> Result<Option<CredentialBlob>, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No credential file");
            return Ok(None);
        }
        let value: serde_json::Value = load_json(&self.path).await?;
        let file: BlobFile = serde_json::from_value(value).map_err(|_| {
            StoreError::InvalidCredentials(format!("unrecognized layout in {}", self.path.display()))
        })?;
        CredentialBlob::from_file(file, Utc::now()).map(Some)
    }

    /// Writes the blob.
    ///
    /// # Errors
    ///
    /// Any serialization or write failure.
    pub async fn save(&self, blob: &CredentialBlob) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        save_json(&self.path, &blob.to_file(Utc::now())).await
    }

    /// Replaces the credentials, keeping layout and account id.
    ///
    /// A missing file is created in the OAuth layout.
    ///
    /// # Errors
    ///
    /// Any read or write failure.
    pub async fn update_credentials(&self, credentials: &CredentialSet) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let blob = match self.load().await? {
            Some(mut blob) => {
                blob.credentials = credentials.clone();
                blob
            }
            None => CredentialBlob::oauth(credentials.clone()),
        };
        save_json(&self.path, &blob.to_file(Utc::now())).await?;
        info!(path = %self.path.display(), expires_at = %credentials.expires_at, "Credentials saved");
        Ok(())
    }

    /// Records the resolved account id.
    ///
    /// # Errors
    ///
    /// `StoreError::InvalidCredentials` if no blob exists yet.
    pub async fn set_account_id(&self, account_id: &AccountId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut blob = self
            .load()
            .await?
            .ok_or_else(|| StoreError::InvalidCredentials("no credentials saved".to_string()))?;
        blob.account_id = Some(account_id.clone());
        save_json(&self.path, &blob.to_file(Utc::now())).await
    }

    /// Deletes the blob.
    ///
    /// # Errors
    ///
    /// Any IO error other than "not found".
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        remove_file(&self.path).await
    }
}

#[async_trait]
impl CredentialSink for CredentialFile {
    async fn persist(&self, credentials: &CredentialSet) -> Result<(), CoreError> {
        self.update_credentials(credentials).await.map_err(CoreError::from)
    }
}
