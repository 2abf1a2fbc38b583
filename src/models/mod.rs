//! Core data models for pgvault
//!
//! Backup records are the only persisted domain entity; alerts, validation
//! results and audit entries live with the components that own them.

pub mod backup;

pub use backup::{BackupRecord, BackupStatus};
