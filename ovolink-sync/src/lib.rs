// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # ovolink Sync
//!
//! Polling and lifecycle for one OVO account.
//!
//! This crate provides:
//!
//! - **PollCoordinator**: one poll cycle at a time per account; concurrent
//!   requests join the running cycle
//! - **DailyScheduler**: fires a poll once per day at a local hour
//! - **OvoService**: setup from persisted state plus the poll entry points
//!
//! ## Usage
//!
//! ```ignore
//! use ovolink_sync::{OvoService, ServiceConfig};
//!
//! let service = Arc::new(OvoService::setup(&ServiceConfig::new(dir)).await?);
//! let result = service.poll_once().await?;
//!
//! let scheduler = service.scheduler()?;
//! tokio::spawn(scheduler.run(service.clone(), manual_rx, shutdown_rx));
//! ```

pub mod coordinator;
pub mod error;
pub mod scheduler;
pub mod service;

pub use coordinator::{hourly_window, PollCoordinator, PollRunner, Reauthenticator, UsageSource};
pub use error::SyncError;
pub use scheduler::{next_fire, DailyScheduler, SchedulerState};
pub use service::{
    save_login, save_manual_tokens, KeychainPasswords, OvoService, PasswordSource, ServiceConfig,
    Session,
};
