//! Aggregate metrics over registered backups

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{BackupRecord, BackupStatus};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetrics {
    pub total_backups: usize,
    #[serde(rename = "totalSizeGB")]
    pub total_size_gb: f64,
    /// Percentage of successful records; 0 when there are none
    pub success_rate: f64,
    /// Mean duration of successful backups
    pub average_duration_minutes: f64,
    /// Failed records
    pub corrupted_backups: usize,
    pub oldest_backup: Option<DateTime<Utc>>,
    pub newest_backup: Option<DateTime<Utc>>,
    pub collected_at: DateTime<Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn compute_metrics(records: &[BackupRecord]) -> BackupMetrics {
    let total = records.len();
    let successful: Vec<&BackupRecord> = records.iter().filter(|r| r.is_success()).collect();
    let total_bytes: u64 = records.iter().map(|r| r.size).sum();

    let success_rate = if total == 0 {
        0.0
    } else {
        successful.len() as f64 / total as f64 * 100.0
    };

    let average_duration_minutes = if successful.is_empty() {
        0.0
    } else {
        let total_ms: u64 = successful.iter().map(|r| r.duration_ms).sum();
        total_ms as f64 / successful.len() as f64 / 60_000.0
    };

    BackupMetrics {
        total_backups: total,
        total_size_gb: round2(total_bytes as f64 / GIB),
        success_rate: round2(success_rate),
        average_duration_minutes: round2(average_duration_minutes),
        corrupted_backups: records
            .iter()
            .filter(|r| r.status == BackupStatus::Failed)
            .count(),
        oldest_backup: records.iter().map(|r| r.created_at).min(),
        newest_backup: records.iter().map(|r| r.created_at).max(),
        collected_at: Utc::now(),
    }
}
