//! Backup creation and management
//!
//! # Architecture
//!
//! - `BackupService`: runs the creation pipeline and the operations over
//!   registered backups (list, validate, integrity check, delete)
//! - `DumpRunner`: seam around the external dump utility; `PgDumpRunner`
//!   spawns `pg_dump`
//! - `compress_file`: gzip of finished dumps
//!
//! # Pipeline
//!
//! options → target directory → disk space → dump → checksum → validation
//! → optional compression → registry record. Each step has its own retry
//! policy and the pipeline as a whole is retried too. A failed creation
//! still yields a [`BackupOutcome`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pgvault::backup::{BackupOptions, BackupService, PgDumpRunner};
//!
//! let service = BackupService::new(registry, Arc::new(PgDumpRunner::default()),
//!     settings.backup.clone(), settings.effective_database_url(), Some(error_log));
//! let outcome = service.create_backup(BackupOptions::default()).await;
//! if !outcome.success {
//!     eprintln!("{}", outcome.error.unwrap_or_default());
//! }
//! ```

mod compress;
mod dump;
mod options;
mod service;

pub use compress::compress_file;
pub use dump::{ConnectionParams, DumpRequest, DumpRunner, PgDumpRunner, DEFAULT_PORT};
pub use options::{
    BackupOptions, BackupOutcome, DumpMode, ProgressSink, ProgressStatus, ProgressUpdate,
};
pub use service::{default_backup_filename, BackupService, IntegrityReport, ServicePolicies};
