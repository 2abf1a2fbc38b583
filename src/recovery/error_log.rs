//! Durable log of handled errors
//!
//! Stored as a single JSON array that is rewritten on every change and
//! capped at a maximum entry count (oldest entries are pruned first).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::cutoff_days_ago;
use crate::error::{BackupError, BackupResult, ErrorContext, ErrorKind, Severity};
use crate::storage::file_io::{read_json, write_json_atomic};

/// One occurrence of a handled error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub error_type: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_strategy: Option<String>,
}

impl ErrorLogEntry {
    pub fn from_error(error: &BackupError, attempt: u32, operation: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            error_type: error.kind,
            severity: error.severity,
            message: error.message.clone(),
            context: error.context.clone(),
            attempt,
            operation: operation.map(str::to_string),
            resolved: false,
            resolution_strategy: None,
        }
    }
}

/// Filter for [`ErrorLog::query`]
#[derive(Debug, Clone, Default)]
pub struct ErrorLogFilter {
    pub kind: Option<ErrorKind>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ErrorLogFilter {
    fn matches(&self, entry: &ErrorLogEntry) -> bool {
        self.kind.map_or(true, |k| entry.error_type == k)
            && self.severity.map_or(true, |s| entry.severity == s)
            && self.resolved.map_or(true, |r| entry.resolved == r)
            && self.since.map_or(true, |since| entry.timestamp >= since)
            && self.until.map_or(true, |until| entry.timestamp <= until)
    }
}

/// Aggregate statistics over a trailing window
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub window_days: i64,
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_type: BTreeMap<ErrorKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Most frequent kinds, most frequent first
    pub most_common: Vec<(ErrorKind, usize)>,
}

const MOST_COMMON_LIMIT: usize = 5;

/// Persistent error log backed by a JSON document
pub struct ErrorLog {
    path: PathBuf,
    max_entries: usize,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: PathBuf, max_entries: usize) -> Self {
        Self {
            path,
            max_entries,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// All entries in stored order
    pub async fn read_all(&self) -> BackupResult<Vec<ErrorLogEntry>> {
        read_json(&self.path).await
    }

    /// Append an entry, pruning the oldest beyond the cap
    pub async fn append(&self, entry: ErrorLogEntry) -> BackupResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.push(entry);

        if entries.len() > self.max_entries {
            entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        write_json_atomic(&self.path, &entries).await
    }

    /// Mark entries resolved with the given strategy; returns how many changed
    pub async fn mark_resolved(&self, ids: &[String], strategy: &str) -> BackupResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_all().await?;
        let mut changed = 0;

        for entry in entries.iter_mut().filter(|e| ids.contains(&e.id)) {
            if !entry.resolved {
                entry.resolved = true;
                entry.resolution_strategy = Some(strategy.to_string());
                changed += 1;
            }
        }

        if changed > 0 {
            write_json_atomic(&self.path, &entries).await?;
        }
        Ok(changed)
    }

    /// Entries matching the filter, newest first
    pub async fn query(&self, filter: &ErrorLogFilter) -> BackupResult<Vec<ErrorLogEntry>> {
        let mut entries: Vec<_> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Statistics over entries from the last `days` days
    pub async fn stats(&self, days: i64) -> BackupResult<ErrorStats> {
        let cutoff = cutoff_days_ago(days)?;
        let entries = self.read_all().await?;

        let mut stats = ErrorStats {
            window_days: days,
            ..ErrorStats::default()
        };

        for entry in entries.iter().filter(|e| e.timestamp >= cutoff) {
            stats.total += 1;
            if entry.resolved {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }
            *stats.by_type.entry(entry.error_type).or_default() += 1;
            *stats.by_severity.entry(entry.severity).or_default() += 1;
        }

        let mut ranked: Vec<_> = stats.by_type.iter().map(|(k, v)| (*k, *v)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(MOST_COMMON_LIMIT);
        stats.most_common = ranked;

        Ok(stats)
    }

    /// Remove entries older than `retention_days`; returns the removed count
    pub async fn cleanup(&self, retention_days: i64) -> BackupResult<usize> {
        let _guard = self.write_lock.lock().await;
        let cutoff = cutoff_days_ago(retention_days)?;
        let entries = self.read_all().await?;
        let before = entries.len();

        let kept: Vec<_> = entries.into_iter().filter(|e| e.timestamp >= cutoff).collect();
        let removed = before - kept.len();

        if removed > 0 {
            write_json_atomic(&self.path, &kept).await?;
        }
        Ok(removed)
    }

    /// Human-readable report of the statistics and most recent entries
    pub async fn report(&self, days: i64, recent: usize) -> BackupResult<String> {
        let stats = self.stats(days).await?;
        let latest = self
            .query(&ErrorLogFilter {
                limit: Some(recent),
                ..ErrorLogFilter::default()
            })
            .await?;

        let mut out = String::new();
        out.push_str("Error Report\n");
        out.push_str("============\n");
        out.push_str(&format!("Window: last {} day(s)\n", stats.window_days));
        out.push_str(&format!("Total errors: {}\n", stats.total));
        out.push_str(&format!("Resolved:     {}\n", stats.resolved));
        out.push_str(&format!("Unresolved:   {}\n", stats.unresolved));

        out.push_str("\nBy type:\n");
        for (kind, count) in &stats.by_type {
            out.push_str(&format!("  {:<22} {}\n", kind.code(), count));
        }

        out.push_str("\nBy severity:\n");
        for (severity, count) in &stats.by_severity {
            out.push_str(&format!("  {:<22} {}\n", severity, count));
        }

        if !stats.most_common.is_empty() {
            out.push_str("\nMost common:\n");
            for (i, (kind, count)) in stats.most_common.iter().enumerate() {
                out.push_str(&format!("  {}. {} ({})\n", i + 1, kind.code(), count));
            }
        }

        out.push_str("\nRecent errors:\n");
        if latest.is_empty() {
            out.push_str("  (none)\n");
        }
        for entry in &latest {
            let status = match &entry.resolution_strategy {
                Some(strategy) if entry.resolved => format!("resolved via {}", strategy),
                _ if entry.resolved => "resolved".to_string(),
                _ => "unresolved".to_string(),
            };
            out.push_str(&format!(
                "  [{}] {} {} (attempt {}, {}): {}\n",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.severity,
                entry.error_type.code(),
                entry.attempt,
                status,
                entry.message
            ));
        }

        Ok(out)
    }
}
