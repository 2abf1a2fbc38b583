//! Display formatting for terminal output
//!
//! Provides utilities for formatting backups, validation results and
//! monitoring data for terminal display.

pub mod backup;
pub mod format;
pub mod monitor;

pub use backup::{
    format_backup_details, format_backup_list, format_validation_result,
    format_validation_results,
};
pub use format::{format_age, format_duration_ms, format_size};
pub use monitor::{format_alert, format_health_report, format_metrics};
