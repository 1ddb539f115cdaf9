//! User settings with persistence.

use chrono_tz::Tz;
use ovolink_core::AccountId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::persistence::{load_json, save_json, settings_path, statistics_db_path};

/// Local hour of the daily poll.
pub const DEFAULT_UPDATE_HOUR: u32 = 2;

/// Zone the portal's wall-clock timestamps are read in.
pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";

/// Days of hourly history requested per poll.
pub const DEFAULT_HOURLY_LOOKBACK_DAYS: u32 = 7;

// ============================================================================
// Settings Types
// ============================================================================

/// User preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Login e-mail used by the scripted password flow.
    pub username: Option<String>,

    /// Resolved billing account, immutable once set.
    pub account_id: Option<AccountId>,

    /// Local hour (0-23) of the scheduled poll.
    pub update_hour: u32,

    /// IANA zone name.
    pub timezone: String,

    /// Days of hourly data fetched per poll.
    pub hourly_lookback_days: u32,

    /// Whether hourly data is merged into the statistics store.
    pub import_statistics: bool,

    /// Statistics database override.
    pub statistics_db: Option<PathBuf>,

    /// Default log level of the binary when `RUST_LOG` is unset.
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: None,
            account_id: None,
            update_hour: DEFAULT_UPDATE_HOUR,
            timezone: DEFAULT_TIMEZONE.to_string(),
            hourly_lookback_days: DEFAULT_HOURLY_LOOKBACK_DAYS,
            import_statistics: true,
            statistics_db: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Settings {
    /// Parses the configured zone.
    ///
    /// # Errors
    ///
    /// `StoreError::Config` for an unknown zone name.
    pub fn tz(&self) -> Result<Tz, StoreError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| StoreError::Config(format!("unknown timezone: {}", self.timezone)))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// `StoreError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.update_hour > 23 {
            return Err(StoreError::Config(format!(
                "update_hour must be 0-23, got {}",
                self.update_hour
            )));
        }
        if self.hourly_lookback_days == 0 {
            return Err(StoreError::Config("hourly_lookback_days must be at least 1".to_string()));
        }
        self.tz().map(|_| ())
    }

    /// Statistics database path, defaulting to the config directory.
    pub fn statistics_db_path(&self, config_dir: &Path) -> PathBuf {
        self.statistics_db
            .clone()
            .unwrap_or_else(|| statistics_db_path(config_dir))
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level logging.
    Error,
    /// Warning level logging.
    #[default]
    Warn,
    /// Info level logging.
    Info,
    /// Debug level logging.
    Debug,
    /// Trace level logging.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

// ============================================================================
// Settings Store
// ============================================================================

/// Settings with file persistence.
#[derive(Debug)]
pub struct SettingsStore {
    settings: Arc<RwLock<Settings>>,
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store with defaults, saving to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Settings::default())),
            path,
        }
    }

    /// Loads `settings.json` from a config directory.
    pub async fn load_from_dir(config_dir: &Path) -> Self {
        Self::load(settings_path(config_dir)).await
    }

    /// Loads settings from a path, falling back to defaults.
    pub async fn load(path: PathBuf) -> Self {
        let settings = if path.exists() {
            info!(path = %path.display(), "Loading settings");
            load_json(&path).await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            })
        } else {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            Settings::default()
        };

        Self {
            settings: Arc::new(RwLock::new(settings)),
            path,
        }
    }

    /// Gets a copy of the current settings.
    pub async fn get(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Updates the in-memory settings; call [`save`](Self::save) to persist.
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings.write().await;
        f(&mut settings);
    }

    /// Saves settings to disk.
    ///
    /// # Errors
    ///
    /// Returns error if settings cannot be written to disk.
    pub async fn save(&self) -> Result<(), StoreError> {
        let settings = self.settings.read().await.clone();
        save_json(&self.path, &settings).await?;
        info!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// File the settings are saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
