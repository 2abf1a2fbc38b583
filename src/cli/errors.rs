//! Error log CLI commands

use clap::{value_parser, Subcommand};

use super::AppContext;
use crate::config::MAX_RETENTION_DAYS;
use crate::error::{BackupResult, ErrorKind};
use crate::recovery::ErrorLogFilter;

/// Error log subcommands
#[derive(Subcommand)]
pub enum ErrorCommands {
    /// Show recent errors, newest first
    List {
        /// Only this kind, e.g. connection or DISK_SPACE_ERROR
        #[arg(short, long, value_parser = parse_kind)]
        kind: Option<ErrorKind>,

        /// Only unresolved errors
        #[arg(long)]
        unresolved: bool,

        /// Number of errors to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show counts by kind and severity
    Stats {
        /// Window in days
        #[arg(
            long,
            default_value = "7",
            value_parser = value_parser!(i64).range(1..=MAX_RETENTION_DAYS)
        )]
        days: i64,
    },

    /// Print a full error report
    Report {
        /// Window in days
        #[arg(
            long,
            default_value = "7",
            value_parser = value_parser!(i64).range(1..=MAX_RETENTION_DAYS)
        )]
        days: i64,
    },

    /// Drop errors older than the retention window
    Prune {
        /// Retention in days; the configured value when absent
        #[arg(long, value_parser = value_parser!(i64).range(0..=MAX_RETENTION_DAYS))]
        days: Option<i64>,
    },
}

/// Accepts a kind's code with or without the `_ERROR` suffix, any case
fn parse_kind(value: &str) -> Result<ErrorKind, String> {
    let wanted = value.trim().to_uppercase().replace('-', "_");
    ErrorKind::ALL
        .into_iter()
        .find(|kind| {
            let code = kind.code();
            code == wanted || code.strip_suffix("_ERROR") == Some(wanted.as_str())
        })
        .or_else(|| (wanted == "CREATION").then_some(ErrorKind::Creation))
        .ok_or_else(|| format!("unknown error kind '{}'", value))
}

/// Handle an errors command
pub async fn handle_error_command(context: &AppContext, cmd: ErrorCommands) -> BackupResult<()> {
    let log = &context.error_log;

    match cmd {
        ErrorCommands::List {
            kind,
            unresolved,
            limit,
        } => {
            let filter = ErrorLogFilter {
                kind,
                resolved: unresolved.then_some(false),
                limit: Some(limit),
                ..ErrorLogFilter::default()
            };
            let entries = log.query(&filter).await?;
            if entries.is_empty() {
                println!("No errors logged.");
                return Ok(());
            }

            for entry in &entries {
                println!(
                    "[{}] {:<8} {} (attempt {}){}: {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.severity,
                    entry.error_type.code(),
                    entry.attempt,
                    entry
                        .operation
                        .as_deref()
                        .map(|op| format!(" in {}", op))
                        .unwrap_or_default(),
                    entry.message
                );
                if entry.resolved {
                    println!(
                        "  resolved{}",
                        entry
                            .resolution_strategy
                            .as_deref()
                            .map(|s| format!(" via {}", s))
                            .unwrap_or_default()
                    );
                }
            }
        }

        ErrorCommands::Stats { days } => {
            let stats = log.stats(days).await?;
            println!("Error Statistics (last {} day(s))", stats.window_days);
            println!("=================================");
            println!("Total:      {}", stats.total);
            println!("Resolved:   {}", stats.resolved);
            println!("Unresolved: {}", stats.unresolved);
            if !stats.most_common.is_empty() {
                println!();
                println!("Most common:");
                for (kind, count) in &stats.most_common {
                    println!("  {:<22} {}", kind.code(), count);
                }
            }
        }

        ErrorCommands::Report { days } => {
            print!("{}", log.report(days, 10).await?);
        }

        ErrorCommands::Prune { days } => {
            let days = days.unwrap_or(context.settings.error_log.retention_days);
            let removed = log.cleanup(days).await?;
            println!("Removed {} error(s) older than {} day(s).", removed, days);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("connection"), Ok(ErrorKind::Connection));
        assert_eq!(parse_kind("DISK_SPACE_ERROR"), Ok(ErrorKind::DiskSpace));
        assert_eq!(parse_kind("disk-space"), Ok(ErrorKind::DiskSpace));
        assert_eq!(parse_kind("creation"), Ok(ErrorKind::Creation));
        assert!(parse_kind("bogus").is_err());
    }
}
