//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod audit;
pub mod backup;
pub mod context;
pub mod errors;
pub mod monitor;
pub mod registry;

pub use audit::{handle_audit_command, AuditCommands};
pub use backup::{handle_backup_command, BackupCommands};
pub use context::AppContext;
pub use errors::{handle_error_command, ErrorCommands};
pub use monitor::{handle_monitor_command, MonitorCommands};
pub use registry::{handle_registry_command, RegistryCommands};
