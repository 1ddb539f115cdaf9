//! Output formatting for CLI.

mod json;
mod text;

use chrono::{DateTime, Utc};
use ovolink_core::AccountId;

pub use json::JsonFormatter;
pub use text::TextFormatter;

/// Entries shown per hourly series.
pub const RECENT_ENTRIES: usize = 24;

/// Local state reported by `status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Config directory in use.
    pub config_dir: String,
    /// Resolved account, if any.
    pub account_id: Option<AccountId>,
    /// Whether a credential blob exists.
    pub has_credentials: bool,
    /// Access token expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the session can be refreshed without logging in.
    pub has_refresh_token: bool,
    /// Configured poll hour.
    pub update_hour: u32,
    /// Configured zone.
    pub timezone: String,
    /// Next scheduled poll.
    pub next_poll: Option<DateTime<Utc>>,
    /// Statistic ids with their point counts.
    pub statistics: Vec<(String, usize)>,
}
