// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! ovolink CLI - OVO Energy Australia usage sync from the command line.
//!
//! # Examples
//!
//! ```bash
//! # Log in with e-mail and password, keeping the password in the keychain
//! ovolink login --username me@example.com --save-password
//!
//! # Browser flow: print the URL, then paste the redirect back
//! ovolink authorize
//! ovolink exchange --code 'https://my.ovoenergy.com.au/?code=...&state=...'
//!
//! # One poll cycle as JSON
//! ovolink poll --format json --pretty
//!
//! # Daemon with the daily schedule
//! ovolink run --now
//! ```

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use ovolink_fetch::FetchError;
use ovolink_store::{LogLevel, SettingsStore};
use ovolink_sync::SyncError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{accounts, auth, poll, run, status};

// ============================================================================
// CLI Definition
// ============================================================================

/// ovolink CLI - OVO Energy Australia usage sync.
#[derive(Parser)]
#[command(name = "ovolink")]
#[command(about = "OVO Energy Australia usage sync")]
#[command(long_about = r"
ovolink keeps an OVO Energy Australia session alive, polls solar and grid
usage once a day and merges hourly readings into cumulative statistics.

Examples:
  ovolink login -u me@example.com   # Scripted password login
  ovolink authorize                 # Browser login, step 1
  ovolink exchange --code <url>     # Browser login, step 2
  ovolink poll                      # One poll cycle
  ovolink run --now                 # Daemon
")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If none, runs 'status'.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Directory for settings, credentials and statistics.
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Log in with e-mail and password.
    Login(auth::LoginArgs),

    /// Print the browser authorization URL.
    Authorize,

    /// Complete the browser flow with the returned code.
    Exchange(auth::ExchangeArgs),

    /// Save pasted access and ID tokens.
    Tokens(auth::TokensArgs),

    /// List the accounts of the logged-in customer.
    #[command(visible_alias = "a")]
    Accounts,

    /// Run one poll cycle.
    #[command(visible_alias = "p")]
    Poll,

    /// Poll daily at the configured hour until interrupted.
    Run(run::RunArgs),

    /// Show configuration and session state.
    #[command(visible_alias = "s")]
    Status,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Credentials missing or rejected.
    AuthRequired = 2,
}

impl ExitCode {
    /// Exit code for a failed command.
    fn for_error(error: &anyhow::Error) -> Self {
        let requires_reauth = error.chain().any(|cause| {
            cause
                .downcast_ref::<SyncError>()
                .is_some_and(SyncError::requires_reauth)
                || cause
                    .downcast_ref::<FetchError>()
                    .is_some_and(FetchError::requires_reauth)
        });
        if requires_reauth {
            Self::AuthRequired
        } else {
            Self::Error
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Filter used when `RUST_LOG` is unset; `--verbose` beats the saved level.
fn default_filter(verbose: bool, level: LogLevel) -> String {
    if verbose {
        "ovolink=debug,info".to_string()
    } else {
        format!("ovolink={level}")
    }
}

fn setup_logging(verbose: bool, quiet: bool, level: LogLevel) {
    if quiet {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, level)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = SettingsStore::load_from_dir(&commands::config_dir(&cli)).await.get().await;
    setup_logging(cli.verbose, cli.quiet, settings.log_level);

    let result = match &cli.command {
        Some(Commands::Login(args)) => auth::login(args, &cli).await,
        Some(Commands::Authorize) => auth::authorize(&cli).await,
        Some(Commands::Exchange(args)) => auth::exchange(args, &cli).await,
        Some(Commands::Tokens(args)) => auth::tokens(args, &cli).await,
        Some(Commands::Accounts) => accounts::run(&cli).await,
        Some(Commands::Poll) => poll::run(&cli).await,
        Some(Commands::Run(args)) => run::run(args, &cli).await,
        Some(Commands::Status) | None => status::run(&cli).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            let message = format!("{e:#}");
            match cli.format {
                OutputFormat::Json => {
                    if let Ok(json) = output::JsonFormatter::new(cli.pretty).format_error(&message) {
                        println!("{json}");
                    }
                }
                OutputFormat::Text => {
                    eprintln!("{}", output::TextFormatter::new(!cli.no_color).format_error(&message));
                }
            }
        }
        std::process::exit(ExitCode::for_error(&e) as i32);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["ovolink", "poll", "--format", "json", "--pretty"]);
        assert!(matches!(cli.command, Some(Commands::Poll)));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.pretty);
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false, LogLevel::Warn), "ovolink=warn");
        assert_eq!(default_filter(false, LogLevel::Trace), "ovolink=trace");
        assert_eq!(default_filter(true, LogLevel::Error), "ovolink=debug,info");
    }

    #[test]
    fn test_exit_code_for_auth_errors() {
        let sync: anyhow::Error = SyncError::Fetch(Arc::new(FetchError::RefreshRejected)).into();
        assert!(matches!(ExitCode::for_error(&sync), ExitCode::AuthRequired));

        let wrapped = anyhow::Error::from(FetchError::NotAuthenticated).context("poll failed");
        assert!(matches!(ExitCode::for_error(&wrapped), ExitCode::AuthRequired));

        let other = anyhow::anyhow!("disk full");
        assert!(matches!(ExitCode::for_error(&other), ExitCode::Error));
    }
}
