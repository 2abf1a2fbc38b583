//! Health, metrics and alert display formatting

use super::format::format_duration_ms;
use crate::monitoring::{Alert, BackupMetrics, HealthReport};

fn mark(passed: bool) -> &'static str {
    if passed {
        "ok"
    } else {
        "FAILED"
    }
}

pub fn format_health_report(report: &HealthReport) -> String {
    let checks = &report.checks;
    let mut output = String::new();
    output.push_str(&format!(
        "Health: {} (checked in {})\n",
        report.status.to_string().to_uppercase(),
        format_duration_ms(report.duration_ms)
    ));
    output.push_str(&format!("  Disk space:          {}\n", mark(checks.disk_space)));
    output.push_str(&format!("  Backup integrity:    {}\n", mark(checks.backup_integrity)));
    output.push_str(&format!("  Database connection: {}\n", mark(checks.database_connection)));
    output.push_str(&format!("  File permissions:    {}\n", mark(checks.file_permissions)));
    output
}

pub fn format_metrics(metrics: &BackupMetrics) -> String {
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    let mut output = String::new();
    output.push_str("Backup Metrics\n");
    output.push_str("==============\n");
    output.push_str(&format!("Total backups:    {}\n", metrics.total_backups));
    output.push_str(&format!("Total size:       {:.2} GB\n", metrics.total_size_gb));
    output.push_str(&format!("Success rate:     {:.2}%\n", metrics.success_rate));
    output.push_str(&format!(
        "Average duration: {:.2} min\n",
        metrics.average_duration_minutes
    ));
    output.push_str(&format!("Failed backups:   {}\n", metrics.corrupted_backups));
    output.push_str(&format!("Oldest backup:    {}\n", date(metrics.oldest_backup)));
    output.push_str(&format!("Newest backup:    {}\n", date(metrics.newest_backup)));
    output
}

pub fn format_alert(alert: &Alert) -> String {
    format!(
        "[{}] {:<7} {}{}",
        alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        alert.alert_type.to_string().to_uppercase(),
        alert.message,
        if alert.resolved { " (resolved)" } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupRecord;
    use crate::monitoring::{compute_metrics, AlertStore, AlertType, HealthChecks};
    use std::path::PathBuf;

    #[test]
    fn test_format_health_report() {
        let report = HealthReport::new(
            HealthChecks {
                disk_space: true,
                backup_integrity: true,
                database_connection: false,
                file_permissions: true,
            },
            12,
        );
        let output = format_health_report(&report);
        assert!(output.starts_with("Health: CRITICAL"));
        assert!(output.contains("Database connection: FAILED"));
        assert!(output.contains("Disk space:          ok"));
    }

    #[test]
    fn test_format_metrics() {
        let records = vec![BackupRecord::new("a.sql", PathBuf::from("/a.sql"), 10, "x")];
        let output = format_metrics(&compute_metrics(&records));
        assert!(output.contains("Total backups:    1"));
        assert!(output.contains("Success rate:     100.00%"));
    }

    #[test]
    fn test_format_alert() {
        let mut store = AlertStore::new(5);
        let alert = store.create(AlertType::Warning, "disk filling up", None);
        let output = format_alert(&alert);
        assert!(output.contains("WARNING"));
        assert!(output.contains("disk filling up"));
        assert!(!output.contains("resolved"));
    }
}
