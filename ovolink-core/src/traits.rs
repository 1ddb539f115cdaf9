//! Collaborator traits.
//!
//! These describe the external systems the pipeline talks to without
//! knowing how they are stored:
//!
//! - [`StatisticsStore`] - Prior-sum lookup and point import
//! - [`CredentialSink`] - Write-back of refreshed credentials

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{CredentialSet, StatisticMetadata, StatisticPoint};

/// External store of cumulative hourly statistics.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Returns the sum of the latest point whose start lies in
    /// `[window_start, window_end)`, or `None` when there is none.
    async fn prior_sum(
        &self,
        statistic_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Option<f64>, CoreError>;

    /// Inserts or replaces points, keyed by `(statistic_id, start)`.
    ///
    /// Either every point is written or none is.
    async fn import(
        &self,
        metadata: &StatisticMetadata,
        points: &[StatisticPoint],
    ) -> Result<(), CoreError>;
}

/// Persisted credential blob that receives refreshed credentials.
#[async_trait]
pub trait CredentialSink: Send + Sync {
    /// Writes the new credential set.
    async fn persist(&self, credentials: &CredentialSet) -> Result<(), CoreError>;
}
