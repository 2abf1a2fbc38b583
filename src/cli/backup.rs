//! Backup CLI commands
//!
//! Implements CLI commands for creating, inspecting, validating and
//! deleting backups.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;

use super::AppContext;
use crate::backup::{BackupOptions, ProgressStatus, ProgressUpdate};
use crate::display::{
    format_backup_details, format_backup_list, format_duration_ms, format_size,
    format_validation_result, format_validation_results,
};
use crate::error::{BackupError, BackupResult};
use crate::models::BackupStatus;
use crate::storage::RecordQuery;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// File name inside the backup directory
        #[arg(short, long)]
        filename: Option<String>,

        /// Directory to write the backup into
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Dump the schema only
        #[arg(long, conflicts_with = "data_only")]
        schema_only: bool,

        /// Dump the data only
        #[arg(long)]
        data_only: bool,

        /// Gzip the finished dump
        #[arg(long, conflicts_with = "no_compress")]
        compress: bool,

        /// Leave the dump uncompressed
        #[arg(long)]
        no_compress: bool,
    },

    /// List registered backups, newest first
    List {
        /// Only backups with this status (success, failed, in_progress)
        #[arg(short, long)]
        status: Option<BackupStatus>,

        /// Number of backups to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Number of backups to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show information about a specific backup
    Info {
        /// Backup id, unique id prefix, or 'latest'
        backup: String,
    },

    /// Validate backups by id, or a file by path
    Validate {
        /// Backup ids or prefixes
        #[arg(required_unless_present = "file")]
        backups: Vec<String>,

        /// Validate this file instead of registered backups
        #[arg(long, conflicts_with = "backups")]
        file: Option<PathBuf>,

        /// Expected MD5 checksum of --file
        #[arg(long, requires = "file")]
        checksum: Option<String>,
    },

    /// Check every successful backup against its recorded checksum
    Verify,

    /// List successful backups whose files look corrupted
    Corrupted,

    /// Delete a backup file and its record
    Delete {
        /// Backup id, unique id prefix, or 'latest'
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub async fn handle_backup_command(context: &AppContext, cmd: BackupCommands) -> BackupResult<()> {
    let service = context.backup_service();

    match cmd {
        BackupCommands::Create {
            filename,
            directory,
            schema_only,
            data_only,
            compress,
            no_compress,
        } => {
            let options = BackupOptions {
                filename,
                directory,
                include_data: !schema_only,
                include_schema: !data_only,
                compress: match (compress, no_compress) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                created_by: Some(context.actor().email),
            };

            println!("Creating backup...");
            let service = service.with_progress(Arc::new(|update: ProgressUpdate| {
                if update.status == ProgressStatus::InProgress {
                    println!("  [{:>3}%] {}", update.percent, update.message);
                }
            }));
            let outcome = service.create_backup(options).await;

            if !outcome.success {
                return Err(BackupError::creation(
                    outcome
                        .error
                        .unwrap_or_else(|| "Backup failed".to_string()),
                ));
            }

            println!("Backup created: {}", outcome.filename.unwrap_or_default());
            if let Some(path) = &outcome.file_path {
                println!("Location: {}", path.display());
            }
            println!("ID:       {}", outcome.backup_id.unwrap_or_default());
            println!("Size:     {}", format_size(outcome.size));
            println!("Checksum: {}", outcome.checksum.unwrap_or_default());
            println!("Duration: {}", format_duration_ms(outcome.duration_ms));
        }

        BackupCommands::List {
            status,
            limit,
            offset,
        } => {
            let query = RecordQuery {
                status,
                limit,
                offset,
                ..RecordQuery::default()
            };
            let records = service.list_backups(&query).await?;

            print!("{}", format_backup_list(&records));
            if records.is_empty() {
                println!();
                println!("Create one with: pgvault backup create");
            }
        }

        BackupCommands::Info { backup } => {
            let record = context.resolve_backup(&backup).await?;
            print!("{}", format_backup_details(&record));
            if !record.file_path.exists() {
                println!();
                println!("WARNING: backup file is missing");
            }
        }

        BackupCommands::Validate {
            backups,
            file,
            checksum,
        } => {
            if let Some(path) = file {
                let result = service
                    .validate_backup_detailed(&path, checksum.as_deref())
                    .await;
                print!("{}", format_validation_result(&path, &result));
                if !result.is_valid {
                    return Err(BackupError::corruption(format!(
                        "Backup {} failed validation",
                        path.display()
                    )));
                }
                return Ok(());
            }

            let mut ids = Vec::with_capacity(backups.len());
            for backup in &backups {
                ids.push(context.resolve_backup(backup).await?.id);
            }
            let results = service.validate_backups_by_ids(&ids).await?;
            print!("{}", format_validation_results(&results));

            let invalid = results.values().filter(|r| !r.is_valid).count();
            println!();
            println!("{} of {} backup(s) valid", results.len() - invalid, results.len());
            if invalid > 0 {
                return Err(BackupError::corruption(format!(
                    "{} backup(s) failed validation",
                    invalid
                )));
            }
        }

        BackupCommands::Verify => {
            let report = service.integrity_check().await?;
            print!("{}", report.report);
            println!();
            println!("{}", report.message);
            if !report.success {
                return Err(BackupError::corruption(report.message));
            }
        }

        BackupCommands::Corrupted => {
            let corrupted = service.detect_corrupted_backups().await?;
            if corrupted.is_empty() {
                println!("No corrupted backups found.");
            } else {
                println!("Corrupted Backups");
                println!("=================");
                print!("{}", format_backup_list(&corrupted));
            }
        }

        BackupCommands::Delete { backup, force } => {
            let record = context.resolve_backup(&backup).await?;

            if !force {
                print!("{}", format_backup_details(&record));
                println!();
                println!("To delete this backup, run again with --force flag:");
                println!("  pgvault backup delete {} --force", record.id);
                return Ok(());
            }

            if service.delete_backup(&record.id).await? {
                println!(
                    "Deleted backup {} ({} freed).",
                    record.filename,
                    format_size(record.size)
                );
            } else {
                println!("Backup {} was already gone.", record.id);
            }
        }
    }

    Ok(())
}
