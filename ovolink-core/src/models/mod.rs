//! Domain models for ovolink.
//!
//! This module contains the core data structures representing credentials,
//! raw usage data, the derived snapshots handed to consumers, and the
//! cumulative statistics rows written to the external store.
//!
//! ## Submodules
//!
//! - [`account`] - Billing account types (AccountId, Account)
//! - [`credentials`] - Token types (CredentialSet, TokenResponse)
//! - [`usage`] - Raw API usage types (UsagePeriodEntry, ChargeType, IntervalData)
//! - [`snapshot`] - Derived views (AggregatedSnapshot, HourlySeries, PollResult)
//! - [`statistics`] - Statistics rows (StatisticPoint, StatisticMetadata)

mod account;
mod credentials;
mod snapshot;
mod statistics;
mod usage;

// Re-export everything at the models level
pub use account::{Account, AccountId};
pub use credentials::{CredentialSet, TokenResponse};
pub use snapshot::{AggregatedSnapshot, Granularity, HourlySeries, HourlySeriesKind, PollResult};
pub use statistics::{RunningSumCheckpoint, STATISTIC_SOURCE, StatisticMetadata, StatisticPoint};
pub use usage::{
    Charge, ChargeType, IntervalData, UsageData, UsagePeriodEntry, parse_wall_clock,
};
