// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ovolink API
//!
//! GraphQL data client and usage reducer.
//!
//! ## Operations
//!
//! - `GetContactInfo` - Accounts of the logged-in customer
//! - `GetIntervalData` - Daily, monthly and yearly usage
//! - `GetHourlyData` - Hourly usage over a date range
//!
//! ## Example
//!
//! ```ignore
//! use ovolink_api::{reduce_hourly, reduce_interval, OvoApiClient};
//!
//! let client = OvoApiClient::new(http, guard);
//! let account = client.primary_account_id().await?;
//! let (daily, monthly, yearly) = reduce_interval(&client.fetch_interval_data(&account).await?);
//! ```

pub mod client;
pub mod endpoints;
pub mod queries;
pub mod reducer;

pub use client::OvoApiClient;
pub use endpoints::ApiEndpoints;
pub use reducer::{reduce_hourly, reduce_interval, reduce_usage};
