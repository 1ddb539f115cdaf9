// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `ovolink` Core
//!
//! Core types, models, and collaborator traits shared by every `ovolink`
//! crate.
//!
//! ## Key Types
//!
//! ### Credentials
//! - [`CredentialSet`] - Bearer/ID token pair with its absolute expiry
//! - [`TokenResponse`] - Raw token-endpoint payload
//!
//! ### Usage Types
//! - [`UsagePeriodEntry`] - One bucket of usage as returned by the data API
//! - [`ChargeType`] - Tariff classification of an entry
//! - [`UsageData`] / [`IntervalData`] - Raw solar/export arrays
//!
//! ### Derived Views
//! - [`AggregatedSnapshot`] - "Latest" record for one granularity
//! - [`HourlySeries`] - Solar, grid and return-to-grid hourly sequences
//! - [`PollResult`] - Everything one poll cycle produces
//!
//! ### Statistics
//! - [`StatisticPoint`] / [`StatisticMetadata`] - Cumulative statistics rows
//! - [`StatisticsStore`] - External store for running sums
//! - [`CredentialSink`] - Write-back target for refreshed credentials

pub mod error;
pub mod models;
pub mod traits;

// Re-export error types
pub use error::CoreError;

// Re-export all model types
pub use models::{
    // Accounts
    Account,
    AccountId,
    // Credentials
    CredentialSet,
    TokenResponse,
    // Usage types
    Charge,
    ChargeType,
    IntervalData,
    UsageData,
    UsagePeriodEntry,
    // Derived views
    AggregatedSnapshot,
    Granularity,
    HourlySeries,
    HourlySeriesKind,
    PollResult,
    // Statistics
    RunningSumCheckpoint,
    StatisticMetadata,
    StatisticPoint,
    STATISTIC_SOURCE,
    // Helpers
    parse_wall_clock,
};

// Re-export traits
pub use traits::{CredentialSink, StatisticsStore};
