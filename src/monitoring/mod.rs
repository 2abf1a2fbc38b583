//! Scheduled maintenance, health checks, metrics and alerts
//!
//! `BackupMonitor` owns the background jobs: retention cleanup and health
//! checks on cron schedules, metrics on a fixed interval. Alerts are kept
//! in memory only and capped.

mod alerts;
mod health;
mod metrics;
mod monitor;
mod scheduler;

pub use alerts::{Alert, AlertStore, AlertType};
pub use health::{
    check_backup_integrity, check_disk_headroom, check_file_permissions, DatabaseProbe,
    HealthChecks, HealthReport, HealthStatus, TcpDatabaseProbe, DISK_USAGE_LIMIT,
    INTEGRITY_SAMPLE,
};
pub use metrics::{compute_metrics, BackupMetrics};
pub use monitor::{BackupMonitor, MonitorStatus, CLEANUP_JOB, HEALTH_CHECK_JOB, METRICS_JOB};
pub use scheduler::{parse_schedule, Scheduler, Trigger};
