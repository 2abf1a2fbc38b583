//! Audit log CLI commands

use clap::{value_parser, Subcommand};

use super::AppContext;
use crate::audit::{AuditFilter, Operation};
use crate::config::{cutoff_days_ago, MAX_RETENTION_DAYS};
use crate::error::BackupResult;

/// Audit subcommands
#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show recent audit entries, newest first
    List {
        /// Only this operation (create, delete, validate, cleanup, ...)
        #[arg(short, long)]
        operation: Option<String>,

        /// Only entries by this user id
        #[arg(short, long)]
        user: Option<String>,

        /// Only failed operations
        #[arg(long)]
        failed: bool,

        /// Only entries from the last N days
        #[arg(long, value_parser = value_parser!(i64).range(0..=MAX_RETENTION_DAYS))]
        days: Option<i64>,

        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show counts per operation and outcome
    Stats,

    /// Drop entries older than the given number of days
    Prune {
        #[arg(
            long,
            default_value = "90",
            value_parser = value_parser!(i64).range(0..=MAX_RETENTION_DAYS)
        )]
        days: i64,
    },
}

/// Handle an audit command
pub async fn handle_audit_command(context: &AppContext, cmd: AuditCommands) -> BackupResult<()> {
    let logger = &context.audit;

    match cmd {
        AuditCommands::List {
            operation,
            user,
            failed,
            days,
            limit,
        } => {
            let filter = AuditFilter {
                user_id: user,
                operation: operation.map(|op| Operation::from(op.to_lowercase())),
                success: failed.then_some(false),
                start: days.map(cutoff_days_ago).transpose()?,
                limit: Some(limit),
                ..AuditFilter::default()
            };

            let entries = logger.get_entries(&filter).await?;
            if entries.is_empty() {
                println!("No audit entries found.");
                return Ok(());
            }
            for entry in &entries {
                println!("{}", entry.format_human_readable());
            }
        }

        AuditCommands::Stats => {
            let stats = logger.stats().await?;
            println!("Audit Statistics");
            println!("================");
            println!("Total entries: {}", stats.total);
            println!("  Successful:  {}", stats.successful);
            println!("  Failed:      {}", stats.failed);
            if !stats.by_operation.is_empty() {
                println!();
                println!("By operation:");
                for (operation, count) in &stats.by_operation {
                    println!("  {:<14} {}", operation, count);
                }
            }
        }

        AuditCommands::Prune { days } => {
            let removed = logger.cleanup_old_entries(days).await?;
            println!(
                "Removed {} audit entr{} older than {} day(s).",
                removed,
                if removed == 1 { "y" } else { "ies" },
                days
            );
        }
    }

    Ok(())
}
