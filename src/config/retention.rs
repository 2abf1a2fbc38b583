//! Day-count retention windows

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{BackupError, BackupResult};

/// Longest retention window accepted anywhere (about a century)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Reject day counts outside `0..=MAX_RETENTION_DAYS`
pub fn check_retention_days(days: i64) -> BackupResult<i64> {
    if (0..=MAX_RETENTION_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(BackupError::validation(format!(
            "Retention must be between 0 and {} days, got {}",
            MAX_RETENTION_DAYS, days
        ))
        .with_context("days", days))
    }
}

/// The instant `days` days before now
pub fn cutoff_days_ago(days: i64) -> BackupResult<DateTime<Utc>> {
    let days = check_retention_days(days)?;
    TimeDelta::try_days(days)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| {
            BackupError::validation(format!("Retention of {} days is out of range", days))
        })
}
