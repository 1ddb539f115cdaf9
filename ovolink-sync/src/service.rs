//! Service facade for one configured account.
//!
//! Setup loads the persisted credential blob, refreshes an expired token
//! before the first data call, resolves the account id once and wires the
//! poll coordinator to the statistics store.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use ovolink_api::{ApiEndpoints, OvoApiClient};
use ovolink_core::{AccountId, CredentialSet, PollResult};
use ovolink_fetch::{
    decode_claims, derive_expiry, AuthEndpoints, AuthGuard, AuthTransport, CredentialAcquirer,
    FetchError, HttpClient, TokenStore,
};
use ovolink_store::{
    credentials_path, keychain, CredentialBlob, CredentialFile, CredentialLayout, Settings,
    SettingsStore, SqliteStatisticsStore, StatisticsMerger, UsageStore,
};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::coordinator::{PollCoordinator, PollRunner, Reauthenticator};
use crate::error::SyncError;
use crate::scheduler::DailyScheduler;

// ============================================================================
// Passwords
// ============================================================================

/// Where unattended re-login reads the account password from.
pub trait PasswordSource: std::fmt::Debug + Send + Sync {
    /// Password of `username`, if one was saved.
    fn password(&self, username: &str) -> Option<String>;
}

/// Passwords saved with `login --save-password`.
#[derive(Debug, Default)]
pub struct KeychainPasswords;

impl PasswordSource for KeychainPasswords {
    fn password(&self, username: &str) -> Option<String> {
        keychain::get_password(username)
    }
}

// ============================================================================
// Service Config
// ============================================================================

/// Paths and endpoints of one service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding settings, credentials and statistics.
    pub config_dir: PathBuf,
    /// OAuth endpoints.
    pub auth: AuthEndpoints,
    /// Data endpoints.
    pub api: ApiEndpoints,
    /// Restrict HTTP to the production domains.
    pub restrict_domains: bool,
    /// Password lookup for unattended re-login.
    pub passwords: Arc<dyn PasswordSource>,
}

impl ServiceConfig {
    /// Production endpoints with state in `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            auth: AuthEndpoints::default(),
            api: ApiEndpoints::default(),
            restrict_domains: true,
            passwords: Arc::new(KeychainPasswords),
        }
    }

    /// Reads re-login passwords from `passwords` instead of the keychain.
    #[must_use]
    pub fn with_password_source(mut self, passwords: Arc<dyn PasswordSource>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Points auth and data endpoints at other hosts.
    #[must_use]
    pub fn with_base_urls(mut self, auth_base: &str, api_base: &str) -> Self {
        self.auth = AuthEndpoints::with_base_url(auth_base);
        self.api = ApiEndpoints::with_base_url(api_base);
        self.restrict_domains = false;
        self
    }

    /// HTTP client for this instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn http_client(&self) -> Result<HttpClient, FetchError> {
        let client = if self.restrict_domains {
            HttpClient::for_ovo()?
        } else {
            HttpClient::new()?
        };
        Ok(client)
    }

    /// Credential acquirer sharing `http`'s cookie session.
    pub fn acquirer(&self, http: HttpClient) -> CredentialAcquirer {
        CredentialAcquirer::new(AuthTransport::new(http, self.auth.clone()))
    }

    /// The persisted credential blob.
    pub fn credential_file(&self) -> CredentialFile {
        CredentialFile::new(credentials_path(&self.config_dir))
    }
}

// ============================================================================
// Credential Setup
// ============================================================================

/// Saves credentials from a login or code exchange.
///
/// An existing account id is kept.
///
/// # Errors
///
/// Any read or write failure of the credential blob.
pub async fn save_login(config: &ServiceConfig, credentials: &CredentialSet) -> Result<(), SyncError> {
    let file = config.credential_file();
    let account_id = file.load().await.ok().flatten().and_then(|b| b.account_id);
    let blob = CredentialBlob {
        credentials: credentials.clone(),
        account_id,
        layout: CredentialLayout::OAuth,
    };
    file.save(&blob).await?;
    info!(expires_at = %credentials.expires_at, "Login saved");
    Ok(())
}

/// Saves pasted tokens in the manual layout.
///
/// Expiry comes from the access token's `exp` claim, or one hour.
///
/// # Errors
///
/// `FetchError::InvalidIdentityToken` if the ID token cannot be decoded,
/// plus any write failure.
pub async fn save_manual_tokens(
    config: &ServiceConfig,
    access_token: &str,
    id_token: &str,
) -> Result<CredentialSet, SyncError> {
    decode_claims(id_token)?;
    let credentials = CredentialSet::new(
        access_token.trim(),
        id_token.trim(),
        None,
        derive_expiry(access_token.trim(), None, Utc::now()),
    );
    config
        .credential_file()
        .save(&CredentialBlob::manual(credentials.clone()))
        .await?;
    info!(expires_at = %credentials.expires_at, "Manual tokens saved");
    Ok(credentials)
}

/// Scripted login with a saved password, for sessions the server rejected.
#[derive(Debug)]
struct PasswordRelogin {
    guard: Arc<AuthGuard>,
    username: Option<String>,
    passwords: Arc<dyn PasswordSource>,
}

impl PasswordRelogin {
    /// Logs in again; `false` without a username or saved password.
    async fn relogin(&self) -> Result<bool, SyncError> {
        let Some(username) = self.username.as_deref() else {
            return Ok(false);
        };
        let Some(password) = self.passwords.password(username) else {
            return Ok(false);
        };
        info!("Logging in again with the stored password");
        let credentials = self.guard.acquirer().password_login(username, &password).await?;
        self.guard.install(credentials).await;
        Ok(true)
    }
}

#[async_trait]
impl Reauthenticator for PasswordRelogin {
    async fn reauthenticate(&self) -> Result<bool, SyncError> {
        self.relogin().await
    }
}

// ============================================================================
// Session
// ============================================================================

/// An authenticated client over the persisted credential blob.
#[derive(Debug)]
pub struct Session {
    /// Data client; refreshed tokens are written back to `credential_file`.
    pub api: Arc<OvoApiClient>,
    /// The persisted blob.
    pub credential_file: Arc<CredentialFile>,
    /// Account id stored in the blob, if any.
    pub stored_account: Option<AccountId>,
    relogin: Arc<PasswordRelogin>,
}

impl ServiceConfig {
    /// Loads the credential blob and refreshes an expired token.
    ///
    /// When the refresh is rejected and `username` has a keychain
    /// password, logs in again instead.
    ///
    /// # Errors
    ///
    /// - `FetchError::NotAuthenticated` without saved credentials
    /// - the refresh error when an expired token cannot be refreshed
    pub async fn open_session(&self, username: Option<&str>) -> Result<Session, SyncError> {
        let credential_file = Arc::new(self.credential_file());
        let blob = credential_file
            .load()
            .await?
            .ok_or(FetchError::NotAuthenticated)?;

        let http = self.http_client()?;
        let guard = Arc::new(
            AuthGuard::new(
                self.acquirer(http.clone()),
                TokenStore::with_credentials(blob.credentials.clone()),
            )
            .with_sink(credential_file.clone()),
        );
        let api = Arc::new(OvoApiClient::with_endpoints(http, Arc::clone(&guard), self.api.clone()));
        let relogin = Arc::new(PasswordRelogin {
            guard,
            username: username.map(str::to_string),
            passwords: Arc::clone(&self.passwords),
        });

        if blob.credentials.is_expired() {
            if blob.credentials.has_refresh_token() {
                info!("Stored token expired, refreshing");
                if let Err(e) = relogin.guard.force_refresh().await {
                    if !e.requires_reauth() || !relogin.relogin().await? {
                        error!(error = %e, "Token refresh failed, re-add credentials");
                        return Err(e.into());
                    }
                }
            } else {
                warn!("Stored token expired and has no refresh token");
            }
        }

        Ok(Session {
            api,
            credential_file,
            stored_account: blob.account_id,
            relogin,
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// One configured account: client, poll coordinator and published state.
#[derive(Debug)]
pub struct OvoService {
    api: Arc<OvoApiClient>,
    coordinator: Arc<PollCoordinator>,
    settings: Settings,
}

impl OvoService {
    /// Builds the service from persisted state.
    ///
    /// # Errors
    ///
    /// - `FetchError::NotAuthenticated` without saved credentials
    /// - the refresh error when an expired token cannot be refreshed
    /// - any error of the account lookup
    /// - configuration and storage errors
    #[instrument(skip(config), fields(config_dir = %config.config_dir.display()))]
    pub async fn setup(config: &ServiceConfig) -> Result<Self, SyncError> {
        let settings_store = SettingsStore::load_from_dir(&config.config_dir).await;
        let settings = settings_store.get().await;
        settings.validate()?;
        let tz = settings.tz()?;

        let session = config.open_session(settings.username.as_deref()).await?;
        let Session {
            api,
            credential_file,
            stored_account,
            relogin,
        } = session;

        let account_id = match settings.account_id.clone().or(stored_account) {
            Some(id) => id,
            None => {
                let id = api.primary_account_id().await?;
                info!(account = %id, "Resolved account");
                credential_file.set_account_id(&id).await?;
                settings_store.update(|s| s.account_id = Some(id.clone())).await;
                settings_store.save().await?;
                id
            }
        };

        let mut coordinator = PollCoordinator::new(
            api.clone(),
            account_id,
            UsageStore::new(),
            tz,
            settings.hourly_lookback_days,
        )
        .with_reauthenticator(relogin);
        if settings.import_statistics {
            let store = SqliteStatisticsStore::open(&settings.statistics_db_path(&config.config_dir))?;
            coordinator = coordinator.with_merger(StatisticsMerger::new(Arc::new(store), tz));
        }

        Ok(Self {
            api,
            coordinator: Arc::new(coordinator),
            settings,
        })
    }

    /// The polled account.
    pub fn account_id(&self) -> &AccountId {
        self.coordinator.account_id()
    }

    /// Settings the service was built with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Data client.
    pub fn api(&self) -> &OvoApiClient {
        &self.api
    }

    /// Published state.
    pub fn usage(&self) -> &UsageStore {
        self.coordinator.usage()
    }

    /// Returns true if a non-expired access token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.api.is_authenticated().await
    }

    /// Runs one poll cycle, joining one already in flight.
    ///
    /// When the session is rejected and a password was saved, the cycle
    /// logs in again and retries once; joined callers share that login.
    ///
    /// # Errors
    ///
    /// The classified error of the cycle.
    pub async fn poll_once(&self) -> Result<PollResult, SyncError> {
        self.coordinator.poll_once().await
    }

    /// Starts a poll now without touching the daily timer.
    pub fn request_immediate_refresh(self: &Arc<Self>) -> JoinHandle<Result<PollResult, SyncError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.poll_once().await })
    }

    /// One interval fetch to verify the setup.
    ///
    /// # Errors
    ///
    /// The classified fetch error.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        Ok(self.api.test_connection(self.account_id()).await?)
    }

    /// Idle scheduler for the configured hour and zone.
    ///
    /// # Errors
    ///
    /// `SyncError::Config` for an unknown zone.
    pub fn scheduler(&self) -> Result<DailyScheduler, SyncError> {
        Ok(DailyScheduler::new(self.settings.update_hour, self.settings.tz()?))
    }
}

#[async_trait]
impl PollRunner for OvoService {
    async fn run_poll(&self) -> Result<PollResult, SyncError> {
        self.poll_once().await
    }
}
