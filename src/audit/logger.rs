//! Audit logger for the append-only audit log
//!
//! Each entry is written as a single JSON line. The log is rotated by size
//! and a bounded number of rotated generations is retained. Writing to the
//! audit log never fails the caller: problems are reported through
//! `tracing` and swallowed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::cutoff_days_ago;
use crate::error::BackupResult;

use super::entry::{AuditEntry, Operation};

/// Filter for [`AuditLogger::get_entries`]
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub operation: Option<Operation>,
    pub success: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.user_id.as_ref().map_or(true, |u| &entry.user_id == u)
            && self.operation.as_ref().map_or(true, |op| &entry.operation == op)
            && self.success.map_or(true, |s| entry.success == s)
            && self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
    }
}

/// Aggregate view of the audit log
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub by_operation: BTreeMap<String, usize>,
    /// Ten most recent entries, newest first
    pub recent: Vec<AuditEntry>,
}

const RECENT_ENTRIES: usize = 10;

/// Handles writing audit entries to the audit log file
pub struct AuditLogger {
    log_path: PathBuf,
    max_file_size: u64,
    max_files: usize,
    write_lock: Mutex<()>,
}

impl AuditLogger {
    /// Create a new AuditLogger writing to `log_path`
    pub fn new(log_path: PathBuf, max_file_size: u64, max_files: usize) -> Self {
        Self {
            log_path,
            max_file_size,
            max_files,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    /// Stamp and append an entry. Never fails; errors are only logged.
    pub async fn log_operation(&self, entry: AuditEntry) {
        let operation = entry.operation.clone();
        if let Err(e) = self.try_log(entry).await {
            warn!(operation = %operation, error = %e, "failed to write audit entry");
        }
    }

    async fn try_log(&self, mut entry: AuditEntry) -> BackupResult<()> {
        entry.id = Uuid::new_v4().to_string();
        entry.timestamp = Utc::now();

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.rotate_if_needed().await?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(operation = %entry.operation, user = %entry.user_id, "audit entry written");
        Ok(())
    }

    async fn rotate_if_needed(&self) -> BackupResult<()> {
        let size = match fs::metadata(&self.log_path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size <= self.max_file_size {
            return Ok(());
        }

        let suffix = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let rotated = PathBuf::from(format!("{}.{}", self.log_path.display(), suffix));
        fs::rename(&self.log_path, &rotated).await?;
        info!(rotated = %rotated.display(), size, "rotated audit log");

        self.prune_rotated().await
    }

    /// Rotated generations of this log, newest first
    pub async fn rotated_files(&self) -> BackupResult<Vec<PathBuf>> {
        let (Some(dir), Some(name)) = (self.log_path.parent(), self.log_path.file_name()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}.", name.to_string_lossy());

        let mut rotated = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with(&prefix) && !file_name.ends_with(".tmp") {
                rotated.push(entry.path());
            }
        }
        rotated.sort();
        rotated.reverse();
        Ok(rotated)
    }

    async fn prune_rotated(&self) -> BackupResult<()> {
        for stale in self.rotated_files().await?.into_iter().skip(self.max_files) {
            if let Err(e) = fs::remove_file(&stale).await {
                warn!(file = %stale.display(), error = %e, "failed to remove rotated audit log");
            }
        }
        Ok(())
    }

    /// Read every parseable entry in file order; malformed lines are skipped
    pub async fn read_all(&self) -> BackupResult<Vec<AuditEntry>> {
        let contents = match fs::read_to_string(&self.log_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(parse_lines(&contents, &self.log_path))
    }

    /// Entries matching the filter, newest first
    pub async fn get_entries(&self, filter: &AuditFilter) -> BackupResult<Vec<AuditEntry>> {
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

    pub async fn stats(&self) -> BackupResult<AuditStats> {
        let mut entries = self.read_all().await?;
        let mut stats = AuditStats::default();

        for entry in &entries {
            stats.total += 1;
            if entry.success {
                stats.successful += 1;
            } else {
                stats.failed += 1;
            }
            *stats
                .by_operation
                .entry(entry.operation.as_str().to_string())
                .or_default() += 1;
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(RECENT_ENTRIES);
        stats.recent = entries;

        Ok(stats)
    }

    /// Rewrite the log keeping only entries newer than `days_to_keep` days.
    /// Kept lines are written back unchanged. Returns the removed count.
    pub async fn cleanup_old_entries(&self, days_to_keep: i64) -> BackupResult<usize> {
        let _guard = self.write_lock.lock().await;
        let cutoff = cutoff_days_ago(days_to_keep)?;

        let contents = match fs::read_to_string(&self.log_path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut kept = String::with_capacity(contents.len());
        let mut removed = 0;

        for line in contents.lines() {
            let expired = serde_json::from_str::<AuditEntry>(line)
                .map(|entry| entry.timestamp < cutoff)
                .unwrap_or(false);
            if expired {
                removed += 1;
            } else if !line.trim().is_empty() {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if removed > 0 {
            write_atomic(&self.log_path, kept.as_bytes()).await?;
            info!(removed, days_to_keep, "pruned audit log");
        }
        Ok(removed)
    }
}

fn parse_lines(contents: &str, path: &Path) -> Vec<AuditEntry> {
    let mut entries = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                file = %path.display(),
                line = line_num + 1,
                error = %e,
                "skipping malformed audit entry"
            ),
        }
    }
    entries
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> BackupResult<()> {
    let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&temp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::Actor;
    use chrono::Duration;
    use tempfile::TempDir;

    fn create_test_logger() -> (AuditLogger, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("audit.log");
        let logger = AuditLogger::new(log_path, 10 * 1024 * 1024, 5);
        (logger, temp_dir)
    }

    fn entry(operation: Operation, success: bool) -> AuditEntry {
        AuditEntry::new(&Actor::new("u1", "u1@example.com", "admin"), operation, success)
    }

    fn line_with_age(op: &str, age_days: i64) -> String {
        let mut e = entry(Operation::from(op.to_string()), true);
        e.timestamp = Utc::now() - Duration::days(age_days);
        serde_json::to_string(&e).unwrap()
    }

    #[tokio::test]
    async fn test_log_and_read() {
        let (logger, _temp) = create_test_logger();
        logger.log_operation(entry(Operation::Create, true).resource("bk-1")).await;

        let entries = logger.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Create);
        assert_eq!(entries[0].resource_id.as_deref(), Some("bk-1"));
    }

    #[tokio::test]
    async fn test_logging_failure_is_swallowed() {
        let temp_dir = TempDir::new().unwrap();
        // The parent "directory" is a regular file, so the write must fail
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let logger = AuditLogger::new(blocker.join("audit.log"), 1024, 5);
        logger.log_operation(entry(Operation::List, true)).await;
        assert!(logger.read_all().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (logger, _temp) = create_test_logger();
        logger.log_operation(entry(Operation::Create, true)).await;
        let mut file = OpenOptions::new().append(true).open(logger.path()).await.unwrap();
        file.write_all(b"{not json}\n").await.unwrap();
        drop(file);
        logger.log_operation(entry(Operation::Delete, false)).await;

        assert_eq!(logger.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_filters_and_limit() {
        let (logger, _temp) = create_test_logger();
        logger.log_operation(entry(Operation::Create, true)).await;
        logger.log_operation(entry(Operation::Delete, false)).await;
        logger.log_operation(entry(Operation::Create, false)).await;

        let creates = logger
            .get_entries(&AuditFilter {
                operation: Some(Operation::Create),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(creates.len(), 2);
        assert!(creates[0].timestamp >= creates[1].timestamp);

        let failures = logger
            .get_entries(&AuditFilter {
                success: Some(false),
                limit: Some(1),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);

        let nobody = logger
            .get_entries(&AuditFilter {
                user_id: Some("someone-else".into()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert!(nobody.is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let (logger, _temp) = create_test_logger();
        for _ in 0..12 {
            logger.log_operation(entry(Operation::List, true)).await;
        }
        logger.log_operation(entry(Operation::Delete, false)).await;

        let stats = logger.stats().await.unwrap();
        assert_eq!(stats.total, 13);
        assert_eq!(stats.successful, 12);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.by_operation["list"], 12);
        assert_eq!(stats.recent.len(), 10);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_lines_verbatim() {
        let (logger, _temp) = create_test_logger();
        std::fs::create_dir_all(logger.path().parent().unwrap()).unwrap();

        let recent_a = line_with_age("create", 1);
        let recent_b = line_with_age("validate", 0);
        let contents = format!(
            "{}\n{}\n{}\n{}\n",
            line_with_age("create", 40),
            recent_a,
            line_with_age("delete", 31),
            recent_b
        );
        std::fs::write(logger.path(), contents).unwrap();

        let removed = logger.cleanup_old_entries(30).await.unwrap();
        assert_eq!(removed, 2);

        let remaining = std::fs::read_to_string(logger.path()).unwrap();
        assert_eq!(remaining, format!("{}\n{}\n", recent_a, recent_b));
    }

    #[tokio::test]
    async fn test_cleanup_rejects_negative_window() {
        let (logger, _temp) = create_test_logger();
        std::fs::create_dir_all(logger.path().parent().unwrap()).unwrap();
        let line = line_with_age("create", 0);
        std::fs::write(logger.path(), format!("{}\n", line)).unwrap();

        assert!(logger.cleanup_old_entries(-1).await.is_err());
        assert!(logger.cleanup_old_entries(100_000_000).await.is_err());
        assert_eq!(std::fs::read_to_string(logger.path()).unwrap(), format!("{}\n", line));
    }

    #[tokio::test]
    async fn test_rotation_keeps_bounded_generations() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(log_path.clone(), 10, 2);

        for _ in 0..5 {
            logger.log_operation(entry(Operation::List, true)).await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let rotated = logger.rotated_files().await.unwrap();
        assert_eq!(rotated.len(), 2);
        assert!(log_path.exists());
        assert_eq!(logger.read_all().await.unwrap().len(), 1);
    }
}
