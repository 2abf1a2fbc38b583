//! Registry CLI commands
//!
//! Statistics, retention cleanup, consistency checks and settings for the
//! backup registry.

use std::path::PathBuf;

use clap::{value_parser, Subcommand};

use super::AppContext;
use crate::audit::{AuditEntry, Operation};
use crate::config::MAX_RETENTION_DAYS;
use crate::display::{format_backup_list, format_size};
use crate::error::BackupResult;
use crate::storage::{CleanupResult, SettingsUpdate};

/// Registry subcommands
#[derive(Subcommand)]
pub enum RegistryCommands {
    /// Show backup counts, sizes and retention settings
    Stats,

    /// Remove backups according to the retention policy
    Cleanup {
        /// Remove backups older than this many days instead
        #[arg(long, value_parser = value_parser!(i64).range(0..=MAX_RETENTION_DAYS))]
        older_than: Option<i64>,

        /// Keep only this many newest backups instead
        #[arg(long)]
        keep: Option<usize>,

        /// Remove failed backups only
        #[arg(long, conflicts_with_all = ["older_than", "keep"])]
        failed: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Check records against their files and drop orphans
    Validate,

    /// Find backups whose file name or creator contains a term
    Search {
        term: String,
    },

    /// Show or change retention settings
    Settings {
        /// Maximum number of backups to keep
        #[arg(long)]
        max_backups: Option<usize>,

        /// Days to keep backups
        #[arg(long, value_parser = value_parser!(i64).range(0..=MAX_RETENTION_DAYS))]
        retention_days: Option<i64>,

        /// Default backup directory
        #[arg(long)]
        directory: Option<PathBuf>,
    },
}

/// Handle a registry command
pub async fn handle_registry_command(
    context: &AppContext,
    cmd: RegistryCommands,
) -> BackupResult<()> {
    let registry = &context.registry;

    match cmd {
        RegistryCommands::Stats => {
            let stats = registry.stats().await?;
            let settings = registry.settings().await?;
            let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
                d.map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "-".to_string())
            };

            println!("Registry Statistics");
            println!("===================");
            println!("Total backups: {}", stats.total);
            println!("  Successful:  {}", stats.successful);
            println!("  Failed:      {}", stats.failed);
            println!("  In progress: {}", stats.in_progress);
            println!("Total size:    {}", format_size(stats.total_size));
            println!("Oldest:        {}", date(stats.oldest));
            println!("Newest:        {}", date(stats.newest));
            println!();
            println!(
                "Retention: keep {} backup(s) for {} day(s)",
                settings.max_backups, settings.retention_days
            );
            println!("Directory: {}", settings.default_directory.display());
        }

        RegistryCommands::Cleanup {
            older_than,
            keep,
            failed,
            force,
        } => {
            let settings = registry.settings().await?;
            let description = if failed {
                "failed backups".to_string()
            } else {
                match (older_than, keep) {
                    (None, None) => format!(
                        "failed backups, backups older than {} day(s), and all but the newest {}",
                        settings.retention_days, settings.max_backups
                    ),
                    (Some(days), None) => format!("backups older than {} day(s)", days),
                    (None, Some(count)) => format!("all but the newest {} backup(s)", count),
                    (Some(days), Some(count)) => format!(
                        "backups older than {} day(s), then all but the newest {}",
                        days, count
                    ),
                }
            };

            if !force {
                println!("This will remove {}.", description);
                println!("To proceed, run again with --force flag:");
                println!("  pgvault registry cleanup --force");
                return Ok(());
            }

            let result = if failed {
                registry.cleanup_failed().await?
            } else if older_than.is_none() && keep.is_none() {
                registry.full_cleanup().await?
            } else {
                let mut result = CleanupResult::default();
                if let Some(days) = older_than {
                    result.merge(registry.cleanup_by_age(days).await?);
                }
                if let Some(count) = keep {
                    result.merge(registry.cleanup_by_count(count).await?);
                }
                result
            };

            context
                .audit
                .log_operation(
                    AuditEntry::new(&context.actor(), Operation::Cleanup, result.errors.is_empty())
                        .metadata("removed", result.removed)
                        .metadata("freedBytes", result.freed_bytes)
                        .metadata("errors", result.errors.len()),
                )
                .await;

            println!(
                "Removed {} backup(s), freed {}.",
                result.removed,
                format_size(result.freed_bytes)
            );
            for error in &result.errors {
                println!("  Error: {}", error);
            }
        }

        RegistryCommands::Validate => {
            let validation = registry.validate().await?;
            if validation.valid {
                println!("Registry is consistent.");
                return Ok(());
            }

            println!("Registry Issues");
            println!("===============");
            for issue in &validation.issues {
                println!("  - {}", issue);
            }
            if !validation.fixes.is_empty() {
                println!();
                println!("Fixes applied:");
                for fix in &validation.fixes {
                    println!("  - {}", fix);
                }
            }
        }

        RegistryCommands::Search { term } => {
            let records = registry.search(&term).await?;
            if records.is_empty() {
                println!("No backups match '{}'.", term);
            } else {
                print!("{}", format_backup_list(&records));
            }
        }

        RegistryCommands::Settings {
            max_backups,
            retention_days,
            directory,
        } => {
            let unchanged = max_backups.is_none() && retention_days.is_none() && directory.is_none();
            let settings = if unchanged {
                registry.settings().await?
            } else {
                let updated = registry
                    .update_settings(SettingsUpdate {
                        max_backups,
                        retention_days,
                        default_directory: directory,
                    })
                    .await?;
                println!("Registry settings updated.");
                updated
            };

            println!("Max backups:    {}", settings.max_backups);
            println!("Retention days: {}", settings.retention_days);
            println!("Directory:      {}", settings.default_directory.display());
        }
    }

    Ok(())
}
