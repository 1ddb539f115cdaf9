//! CLI command implementations.

pub mod accounts;
pub mod auth;
pub mod poll;
pub mod run;
pub mod status;

use std::path::PathBuf;

use ovolink_store::default_config_dir;
use ovolink_sync::ServiceConfig;

use crate::Cli;

/// Config directory from `--config-dir`, or the platform default.
pub fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(default_config_dir)
}

/// Production service config rooted at the config directory.
pub fn service_config(cli: &Cli) -> ServiceConfig {
    ServiceConfig::new(config_dir(cli))
}
