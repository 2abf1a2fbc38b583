//! Configuration module for pgvault
//!
//! This module provides:
//! - Data directory resolution
//! - Settings persistence with per-field defaults

pub mod paths;
pub mod retention;
pub mod settings;

pub use paths::VaultPaths;
pub use retention::{check_retention_days, cutoff_days_ago, MAX_RETENTION_DAYS};
pub use settings::{
    AuditSettings, BackupSettings, ErrorLogSettings, MonitoringConfig, Settings,
};
