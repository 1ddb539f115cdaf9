// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ovolink Store
//!
//! Everything ovolink keeps between runs, plus the statistics merger.
//!
//! This crate provides:
//!
//! - **Settings**: user preferences persisted as JSON
//! - **CredentialFile**: the persisted credential blob, written back after
//!   every refresh
//! - **Keychain**: optional account password storage
//! - **SqliteStatisticsStore**: cumulative hourly statistics
//! - **StatisticsMerger**: gap-safe running sums over hourly batches
//! - **UsageStore**: the last good poll result with watch channels
//!
//! ## Usage
//!
//! ```ignore
//! use ovolink_store::{CredentialFile, SqliteStatisticsStore, StatisticsMerger};
//!
//! let credentials = CredentialFile::new(credentials_path(&dir));
//! let blob = credentials.load().await?;
//!
//! let merger = StatisticsMerger::new(Arc::new(SqliteStatisticsStore::open(&db)?), tz);
//! merger.import_hourly(&account, &series).await?;
//! ```

pub mod credentials;
pub mod error;
pub mod keychain;
pub mod merger;
pub mod persistence;
pub mod settings;
pub mod statistics;
pub mod usage_store;

pub use credentials::{CredentialBlob, CredentialFile, CredentialLayout};
pub use error::StoreError;
pub use merger::{SeriesImport, StatisticsMerger};
pub use persistence::{
    credentials_path, default_config_dir, ensure_dir, load_json, load_json_or_default,
    pending_authorization_path, remove_file, save_json, settings_path, statistics_db_path,
};
pub use settings::{LogLevel, Settings, SettingsStore};
pub use statistics::SqliteStatisticsStore;
pub use usage_store::UsageStore;
