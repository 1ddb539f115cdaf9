//! Text output formatting with colors.

use chrono::{DateTime, Local, Utc};
use ovolink_core::{Account, AggregatedSnapshot, Granularity, HourlySeries, HourlySeriesKind, PollResult};

use super::StatusReport;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Formats one poll result.
    pub fn format_result(&self, result: &PollResult) -> String {
        let mut lines = Vec::new();

        lines.push(format!(
            "{} {}",
            self.bold(&format!("Account {}", result.account_id)),
            self.dim(&format!("(fetched {})", format_local(result.fetched_at)))
        ));
        lines.push("─".repeat(50));
        lines.push(format!(
            "{:<10} {:>14} {:>14} {:>16}",
            "",
            self.bold("Solar"),
            self.bold("Grid"),
            self.bold("Return to grid")
        ));

        for granularity in Granularity::SNAPSHOTS {
            if let Some(snapshot) = result.snapshot(granularity) {
                lines.push(self.format_snapshot(granularity, snapshot));
            }
        }

        match &result.hourly {
            Some(hourly) => {
                lines.push(String::new());
                lines.push(self.format_hourly(hourly));
            }
            None => {
                lines.push(String::new());
                lines.push(self.yellow("Hourly data unavailable"));
            }
        }

        lines.join("\n")
    }

    /// Formats one snapshot row: energy then charge.
    fn format_snapshot(&self, granularity: Granularity, snapshot: &AggregatedSnapshot) -> String {
        if snapshot.is_empty() {
            return format!("{:<10} {}", granularity.as_str(), self.dim("no data"));
        }
        format!(
            "{:<10} {:>14} {:>14} {:>16}",
            granularity.as_str(),
            format_energy(snapshot.solar_consumption, snapshot.solar_charge),
            format_energy(snapshot.grid_consumption, snapshot.grid_charge),
            self.green(&format_energy(
                snapshot.return_to_grid,
                snapshot.return_to_grid_charge
            )),
        )
    }

    /// Formats hourly series counts and batch totals.
    pub fn format_hourly(&self, hourly: &HourlySeries) -> String {
        let mut lines = vec![self.bold("Hourly")];
        for kind in HourlySeriesKind::ALL {
            lines.push(format!(
                "  {:<26} {:>4} entries {:>10.2} kWh",
                kind.display_name(),
                hourly.count(kind),
                hourly.total(kind)
            ));
        }
        lines.join("\n")
    }

    /// Formats the account list; closed accounts are dimmed.
    pub fn format_accounts(&self, accounts: &[Account]) -> String {
        if accounts.is_empty() {
            return self.yellow("No accounts found");
        }

        let mut lines = vec![format!(
            "{:<12} {:<12} {:<8} {}",
            self.bold("Id"),
            self.bold("Number"),
            self.bold("Solar"),
            self.bold("Status")
        )];
        for account in accounts {
            let status = if account.is_active() {
                self.green("open")
            } else {
                self.dim("closed")
            };
            let solar = match account.has_solar {
                Some(true) => "yes",
                Some(false) => "no",
                None => "−",
            };
            lines.push(format!(
                "{:<12} {:<12} {:<8} {}",
                account.id.as_deref().unwrap_or("−"),
                account.number.as_deref().unwrap_or("−"),
                solar,
                status
            ));
        }
        lines.join("\n")
    }

    /// Formats local session and schedule state.
    pub fn format_status(&self, report: &StatusReport) -> String {
        let mut lines = vec![self.bold("ovolink status"), "─".repeat(50)];

        lines.push(format!("Config:    {}", report.config_dir));
        lines.push(format!(
            "Account:   {}",
            report
                .account_id
                .as_ref()
                .map_or_else(|| self.dim("not resolved"), |id| self.cyan(id.as_str()))
        ));

        let session = match report.expires_at {
            None => self.red("no credentials (run `ovolink login`)"),
            Some(at) if at <= Utc::now() && !report.has_refresh_token => {
                self.red(&format!("expired {} (run `ovolink login`)", format_local(at)))
            }
            Some(at) if at <= Utc::now() => {
                self.yellow(&format!("expired {}, will refresh", format_local(at)))
            }
            Some(at) => self.green(&format!("valid until {}", format_local(at))),
        };
        lines.push(format!("Session:   {session}"));
        if report.has_credentials {
            lines.push(format!(
                "Refresh:   {}",
                if report.has_refresh_token { "yes" } else { "no" }
            ));
        }

        lines.push(format!(
            "Schedule:  daily at {:02}:00 {}",
            report.update_hour, report.timezone
        ));
        if let Some(next) = report.next_poll {
            lines.push(format!("Next poll: {}", format_local(next)));
        }

        if !report.statistics.is_empty() {
            lines.push(String::new());
            lines.push(self.bold("Statistics"));
            for (id, count) in &report.statistics {
                lines.push(format!("  {id:<48} {count:>6} points"));
            }
        }

        lines.join("\n")
    }

    /// Formats an error line.
    pub fn format_error(&self, error: &str) -> String {
        format!("{} {}", self.red("✗"), error)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// `12.50 kWh $3.10`
pub(crate) fn format_energy(kwh: f64, charge: f64) -> String {
    format!("{kwh:.2} kWh ${charge:.2}")
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
