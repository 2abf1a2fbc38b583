//! pgvault - database backup lifecycle manager
//!
//! This library provides the core functionality for the pgvault command
//! line tool: creating PostgreSQL dumps, validating their integrity,
//! tracking them in a registry, enforcing retention, and monitoring the
//! whole setup on a schedule.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: The typed `BackupError` and its classification
//! - `recovery`: Normalization, retry with backoff, fallbacks, error log
//! - `models`: Backup records
//! - `storage`: JSON file storage and the backup registry
//! - `validation`: Checksums, SQL structure and corruption checks
//! - `backup`: The backup creation pipeline and related operations
//! - `monitoring`: Scheduled cleanup, health checks, metrics, alerts
//! - `audit`: Audit logging system
//! - `cli` / `display`: Command handlers and terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use pgvault::config::{Settings, VaultPaths};
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths).await?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod recovery;
pub mod storage;
pub mod validation;

pub use error::{BackupError, BackupResult, ErrorKind, Severity};
