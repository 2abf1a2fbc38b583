//! Backup registry: the durable document of backup records and retention
//! settings
//!
//! Every mutation reads the whole document, changes it and rewrites it
//! atomically. Mutations within one process are serialized by an async
//! mutex; separate processes writing the same document are not coordinated.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{check_retention_days, cutoff_days_ago};
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupRecord, BackupStatus};

use super::file_io::{read_json_required, write_json_atomic};

/// Retention settings stored alongside the records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySettings {
    pub max_backups: usize,
    pub retention_days: i64,
    pub default_directory: PathBuf,
}

impl RegistrySettings {
    pub fn with_directory(default_directory: PathBuf) -> Self {
        Self {
            max_backups: 10,
            retention_days: 30,
            default_directory,
        }
    }
}

/// The persisted registry document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub backups: Vec<BackupRecord>,
    pub last_cleanup: DateTime<Utc>,
    pub settings: RegistrySettings,
}

impl RegistryDocument {
    fn empty(settings: RegistrySettings) -> Self {
        Self {
            backups: Vec::new(),
            last_cleanup: Utc::now(),
            settings,
        }
    }

    fn position(&self, id: &str) -> BackupResult<usize> {
        self.backups
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| BackupError::record_not_found(id))
    }
}

/// Partial update applied by [`BackupRegistry::update_record`]
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub status: Option<BackupStatus>,
    pub duration_ms: Option<u64>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
}

/// Partial update of the registry settings
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub max_backups: Option<usize>,
    pub retention_days: Option<i64>,
    pub default_directory: Option<PathBuf>,
}

/// Filters and pagination for [`BackupRegistry::list_records`]
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub status: Option<BackupStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RecordQuery {
    fn matches(&self, record: &BackupRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.from.map_or(true, |from| record.created_at >= from)
            && self.to.map_or(true, |to| record.created_at <= to)
    }
}

/// Aggregate registry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub total_size: u64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub removed: usize,
    pub freed_bytes: u64,
    pub errors: Vec<String>,
}

impl CleanupResult {
    pub fn merge(&mut self, other: CleanupResult) {
        self.removed += other.removed;
        self.freed_bytes += other.freed_bytes;
        self.errors.extend(other.errors);
    }
}

/// Result of checking every record against its backing file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryValidation {
    pub valid: bool,
    pub issues: Vec<String>,
    pub fixes: Vec<String>,
}

/// Whether a missing backing file counts as a cleanup error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingFile {
    Report,
    Ignore,
}

/// Durable store of backup records
pub struct BackupRegistry {
    path: PathBuf,
    defaults: RegistrySettings,
    write_lock: Mutex<()>,
}

impl BackupRegistry {
    /// Create a registry stored at `path`; `defaults` seed a new document
    pub fn new(path: PathBuf, defaults: RegistrySettings) -> Self {
        Self {
            path,
            defaults,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the metadata and default backup directories and an empty
    /// document if none exists. Idempotent.
    pub async fn initialize(&self) -> BackupResult<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::create_dir_all(&self.defaults.default_directory).await?;

        if !fs::try_exists(&self.path).await? {
            info!(path = %self.path.display(), "creating backup registry");
            write_json_atomic(&self.path, &RegistryDocument::empty(self.defaults.clone())).await?;
        }
        Ok(())
    }

    /// Load the whole document; a missing document reads as empty
    pub async fn load(&self) -> BackupResult<RegistryDocument> {
        let exists = fs::try_exists(&self.path).await.map_err(|e| {
            BackupError::registry(format!("Failed to load registry: {}", e))
                .with_context("path", self.path.display().to_string())
        })?;
        if !exists {
            return Ok(RegistryDocument::empty(self.defaults.clone()));
        }
        read_json_required(&self.path)
            .await
            .map_err(|e| BackupError::registry(format!("Failed to load registry: {}", e.message)))
    }

    async fn save(&self, document: &RegistryDocument) -> BackupResult<()> {
        write_json_atomic(&self.path, document)
            .await
            .map_err(|e| BackupError::registry(format!("Failed to save registry: {}", e.message)))
    }

    /// Add a record; identifiers must be unique
    pub async fn add_record(&self, record: BackupRecord) -> BackupResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        if document.backups.iter().any(|b| b.id == record.id) {
            return Err(BackupError::registry(format!(
                "Backup record already exists: {}",
                record.id
            ))
            .with_context("backupId", record.id.as_str()));
        }

        debug!(id = %record.id, filename = %record.filename, "adding backup record");
        document.backups.push(record);
        self.save(&document).await
    }

    /// Update fields of an existing record
    pub async fn update_record(&self, id: &str, update: RecordUpdate) -> BackupResult<BackupRecord> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let index = document.position(id)?;

        let record = &mut document.backups[index];
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(duration_ms) = update.duration_ms {
            record.duration_ms = duration_ms;
        }
        if let Some(size) = update.size {
            record.size = size;
        }
        if let Some(checksum) = update.checksum {
            record.checksum = checksum;
        }
        let updated = record.clone();

        self.save(&document).await?;
        Ok(updated)
    }

    /// Remove a record (the backing file is left alone)
    pub async fn remove_record(&self, id: &str) -> BackupResult<BackupRecord> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let index = document.position(id)?;
        let removed = document.backups.remove(index);
        self.save(&document).await?;
        Ok(removed)
    }

    pub async fn get_record(&self, id: &str) -> BackupResult<Option<BackupRecord>> {
        let document = self.load().await?;
        Ok(document.backups.into_iter().find(|b| b.id == id))
    }

    /// Records matching the query, newest first
    pub async fn list_records(&self, query: &RecordQuery) -> BackupResult<Vec<BackupRecord>> {
        let document = self.load().await?;
        let mut records: Vec<_> = document
            .backups
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let records = records.into_iter().skip(query.offset);
        Ok(match query.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        })
    }

    /// Case-insensitive search over filename and creator, newest first
    pub async fn search(&self, term: &str) -> BackupResult<Vec<BackupRecord>> {
        let needle = term.to_lowercase();
        let mut records: Vec<_> = self
            .load()
            .await?
            .backups
            .into_iter()
            .filter(|r| {
                r.filename.to_lowercase().contains(&needle)
                    || r
                        .created_by
                        .as_deref()
                        .map_or(false, |c| c.to_lowercase().contains(&needle))
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    pub async fn stats(&self) -> BackupResult<RegistryStats> {
        let document = self.load().await?;
        let mut stats = RegistryStats::default();

        for record in &document.backups {
            stats.total += 1;
            stats.total_size += record.size;
            match record.status {
                BackupStatus::Success => stats.successful += 1,
                BackupStatus::Failed => stats.failed += 1,
                BackupStatus::InProgress => stats.in_progress += 1,
            }
        }
        stats.oldest = document.backups.iter().map(|b| b.created_at).min();
        stats.newest = document.backups.iter().map(|b| b.created_at).max();

        Ok(stats)
    }

    pub async fn settings(&self) -> BackupResult<RegistrySettings> {
        Ok(self.load().await?.settings)
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> BackupResult<RegistrySettings> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        if let Some(max_backups) = update.max_backups {
            document.settings.max_backups = max_backups;
        }
        if let Some(retention_days) = update.retention_days {
            document.settings.retention_days = check_retention_days(retention_days)?;
        }
        if let Some(directory) = update.default_directory {
            document.settings.default_directory = directory;
        }

        self.save(&document).await?;
        Ok(document.settings)
    }

    /// Remove records (and files) older than `retention_days`, excluding
    /// in-progress backups
    #[instrument(skip(self))]
    pub async fn cleanup_by_age(&self, retention_days: i64) -> BackupResult<CleanupResult> {
        let cutoff = cutoff_days_ago(retention_days)?;
        self.cleanup_where(MissingFile::Report, |doc| {
            doc.backups
                .iter()
                .filter(|b| b.status != BackupStatus::InProgress && b.created_at < cutoff)
                .map(|b| b.id.clone())
                .collect()
        })
        .await
    }

    /// Remove the oldest successful backups beyond `max_backups`
    #[instrument(skip(self))]
    pub async fn cleanup_by_count(&self, max_backups: usize) -> BackupResult<CleanupResult> {
        self.cleanup_where(MissingFile::Report, |doc| {
            let mut successful: Vec<_> = doc.backups.iter().filter(|b| b.is_success()).collect();
            successful.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            successful
                .into_iter()
                .skip(max_backups)
                .map(|b| b.id.clone())
                .collect()
        })
        .await
    }

    /// Remove every failed backup record; file deletion is best-effort
    #[instrument(skip(self))]
    pub async fn cleanup_failed(&self) -> BackupResult<CleanupResult> {
        self.cleanup_where(MissingFile::Ignore, |doc| {
            doc.backups
                .iter()
                .filter(|b| b.status == BackupStatus::Failed)
                .map(|b| b.id.clone())
                .collect()
        })
        .await
    }

    /// Age, count and failed cleanup using the stored settings
    pub async fn full_cleanup(&self) -> BackupResult<CleanupResult> {
        let settings = self.settings().await?;
        let mut result = self.cleanup_by_age(settings.retention_days).await?;
        result.merge(self.cleanup_by_count(settings.max_backups).await?);
        result.merge(self.cleanup_failed().await?);
        info!(
            removed = result.removed,
            freed_bytes = result.freed_bytes,
            errors = result.errors.len(),
            "full registry cleanup finished"
        );
        Ok(result)
    }

    async fn cleanup_where<F>(&self, missing: MissingFile, select: F) -> BackupResult<CleanupResult>
    where
        F: FnOnce(&RegistryDocument) -> Vec<String>,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let candidates = select(&document);
        let mut result = CleanupResult::default();
        let mut removed_ids = Vec::new();

        for id in candidates {
            let Some(record) = document.backups.iter().find(|b| b.id == id) else {
                continue;
            };

            match fs::remove_file(&record.file_path).await {
                Ok(()) => {
                    result.freed_bytes += record.size;
                    removed_ids.push(id);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if missing == MissingFile::Report {
                        result.errors.push(format!(
                            "{}: backing file already missing ({})",
                            record.filename,
                            record.file_path.display()
                        ));
                    }
                    removed_ids.push(id);
                }
                Err(e) => {
                    if missing == MissingFile::Ignore {
                        removed_ids.push(id);
                    } else {
                        warn!(file = %record.file_path.display(), error = %e, "failed to delete backup file");
                        result
                            .errors
                            .push(format!("{}: failed to delete file: {}", record.filename, e));
                    }
                }
            }
        }

        document.backups.retain(|b| !removed_ids.contains(&b.id));
        result.removed = removed_ids.len();
        document.last_cleanup = Utc::now();
        self.save(&document).await?;

        Ok(result)
    }

    /// Check every record's backing file and drop orphaned records
    #[instrument(skip(self))]
    pub async fn validate(&self) -> BackupResult<RegistryValidation> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        let mut validation = RegistryValidation::default();
        let mut orphans = Vec::new();

        for record in &document.backups {
            match fs::try_exists(&record.file_path).await {
                Ok(true) => {}
                Ok(false) => {
                    validation.issues.push(format!(
                        "Orphan record {} ({}): file not found at {}",
                        record.id,
                        record.filename,
                        record.file_path.display()
                    ));
                    orphans.push(record.id.clone());
                }
                Err(e) => {
                    warn!(file = %record.file_path.display(), error = %e, "could not check backup file");
                    validation.issues.push(format!(
                        "Could not verify {} ({}) at {}: {}",
                        record.id,
                        record.filename,
                        record.file_path.display(),
                        e
                    ));
                }
            }
        }

        if !orphans.is_empty() {
            document.backups.retain(|b| !orphans.contains(&b.id));
            self.save(&document).await?;
            for id in &orphans {
                validation.fixes.push(format!("Removed orphan record {}", id));
            }
            warn!(count = orphans.len(), "removed orphaned registry records");
        }

        validation.valid = validation.issues.is_empty();
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn create_test_registry() -> (BackupRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = BackupRegistry::new(
            temp_dir.path().join("metadata").join("registry.json"),
            RegistrySettings::with_directory(temp_dir.path().join("backups")),
        );
        registry.initialize().await.unwrap();
        (registry, temp_dir)
    }

    fn record_with_file(dir: &Path, name: &str, age_days: i64, status: BackupStatus) -> BackupRecord {
        let path = dir.join("backups").join(name);
        std::fs::write(&path, "-- dump\nCREATE TABLE t (id int);\n").unwrap();
        let mut record = BackupRecord::new(name, path, 32, "d41d8cd98f00b204e9800998ecf8427e");
        record.created_at = Utc::now() - Duration::days(age_days);
        record.status = status;
        record
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (registry, temp) = create_test_registry().await;
        let record = record_with_file(temp.path(), "a.sql", 0, BackupStatus::Success);
        registry.add_record(record).await.unwrap();

        registry.initialize().await.unwrap();
        assert_eq!(registry.load().await.unwrap().backups.len(), 1);
        assert!(temp.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_add_rejects_duplicates() {
        let (registry, temp) = create_test_registry().await;
        let record = record_with_file(temp.path(), "a.sql", 0, BackupStatus::Success);

        registry.add_record(record.clone()).await.unwrap();
        let err = registry.add_record(record).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Registry);
    }

    #[tokio::test]
    async fn test_update_and_remove_unknown_ids() {
        let (registry, _temp) = create_test_registry().await;

        let err = registry
            .update_record("missing", RecordUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Registry);
        assert!(registry.remove_record("missing").await.is_err());
        assert!(registry.get_record("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_record_fields() {
        let (registry, temp) = create_test_registry().await;
        let record = record_with_file(temp.path(), "a.sql", 0, BackupStatus::InProgress);
        let id = record.id.clone();
        registry.add_record(record).await.unwrap();

        let updated = registry
            .update_record(
                &id,
                RecordUpdate {
                    status: Some(BackupStatus::Success),
                    duration_ms: Some(1200),
                    ..RecordUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BackupStatus::Success);
        assert_eq!(registry.get_record(&id).await.unwrap().unwrap().duration_ms, 1200);
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let (registry, temp) = create_test_registry().await;
        for (name, age, status) in [
            ("old.sql", 3, BackupStatus::Success),
            ("new.sql", 0, BackupStatus::Success),
            ("mid.sql", 1, BackupStatus::Failed),
        ] {
            registry
                .add_record(record_with_file(temp.path(), name, age, status))
                .await
                .unwrap();
        }

        let all = registry.list_records(&RecordQuery::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["new.sql", "mid.sql", "old.sql"]);

        let successes = registry
            .list_records(&RecordQuery {
                status: Some(BackupStatus::Success),
                ..RecordQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(successes.len(), 2);

        let page = registry
            .list_records(&RecordQuery {
                offset: 1,
                limit: Some(1),
                ..RecordQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].filename, "mid.sql");
    }

    #[tokio::test]
    async fn test_search_and_stats() {
        let (registry, temp) = create_test_registry().await;
        let mut record = record_with_file(temp.path(), "nightly.sql", 0, BackupStatus::Success);
        record.created_by = Some("ops@example.com".into());
        registry.add_record(record).await.unwrap();
        registry
            .add_record(record_with_file(temp.path(), "manual.sql", 1, BackupStatus::Failed))
            .await
            .unwrap();

        assert_eq!(registry.search("NIGHT").await.unwrap().len(), 1);
        assert_eq!(registry.search("ops@").await.unwrap().len(), 1);

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_size, 64);
        assert!(stats.oldest < stats.newest);
    }

    #[tokio::test]
    async fn test_cleanup_by_age_skips_in_progress() {
        let (registry, temp) = create_test_registry().await;
        let old = record_with_file(temp.path(), "old.sql", 40, BackupStatus::Success);
        let old_path = old.file_path.clone();
        registry.add_record(old).await.unwrap();
        registry
            .add_record(record_with_file(temp.path(), "running.sql", 40, BackupStatus::InProgress))
            .await
            .unwrap();
        registry
            .add_record(record_with_file(temp.path(), "fresh.sql", 1, BackupStatus::Success))
            .await
            .unwrap();

        let result = registry.cleanup_by_age(30).await.unwrap();
        assert_eq!(result.removed, 1);
        assert_eq!(result.freed_bytes, 32);
        assert!(result.errors.is_empty());
        assert!(!old_path.exists());
        assert_eq!(registry.load().await.unwrap().backups.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_by_count_keeps_newest() {
        let (registry, temp) = create_test_registry().await;
        for age in 0..5 {
            registry
                .add_record(record_with_file(
                    temp.path(),
                    &format!("b{}.sql", age),
                    age,
                    BackupStatus::Success,
                ))
                .await
                .unwrap();
        }

        let result = registry.cleanup_by_count(3).await.unwrap();
        assert_eq!(result.removed, 2);

        let names: Vec<_> = registry
            .list_records(&RecordQuery::default())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["b0.sql", "b1.sql", "b2.sql"]);
    }

    #[tokio::test]
    async fn test_cleanup_failed_ignores_missing_files() {
        let (registry, temp) = create_test_registry().await;
        let failed = record_with_file(temp.path(), "failed.sql", 0, BackupStatus::Failed);
        std::fs::remove_file(&failed.file_path).unwrap();
        registry.add_record(failed).await.unwrap();

        let result = registry.cleanup_failed().await.unwrap();
        assert_eq!(result.removed, 1);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_continues_after_missing_file() {
        let (registry, temp) = create_test_registry().await;
        let gone = record_with_file(temp.path(), "gone.sql", 50, BackupStatus::Success);
        std::fs::remove_file(&gone.file_path).unwrap();
        registry.add_record(gone).await.unwrap();
        registry
            .add_record(record_with_file(temp.path(), "old.sql", 50, BackupStatus::Success))
            .await
            .unwrap();

        let result = registry.cleanup_by_age(30).await.unwrap();
        assert_eq!(result.removed, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("gone.sql"));
    }

    #[tokio::test]
    async fn test_validate_removes_only_orphans() {
        let (registry, temp) = create_test_registry().await;
        let kept = record_with_file(temp.path(), "kept.sql", 0, BackupStatus::Success);
        let kept_id = kept.id.clone();
        let orphan = record_with_file(temp.path(), "orphan.sql", 0, BackupStatus::Success);
        std::fs::remove_file(&orphan.file_path).unwrap();
        registry.add_record(kept).await.unwrap();
        registry.add_record(orphan).await.unwrap();

        let validation = registry.validate().await.unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.issues.len(), 1);
        assert_eq!(validation.fixes.len(), 1);

        let remaining = registry.load().await.unwrap().backups;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept_id);

        let again = registry.validate().await.unwrap();
        assert!(again.valid);
        assert!(again.fixes.is_empty());
    }

    #[tokio::test]
    async fn test_update_settings() {
        let (registry, _temp) = create_test_registry().await;
        let settings = registry
            .update_settings(SettingsUpdate {
                max_backups: Some(3),
                ..SettingsUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(settings.max_backups, 3);
        assert_eq!(registry.settings().await.unwrap().retention_days, 30);
    }

    #[tokio::test]
    async fn test_update_settings_rejects_out_of_range_retention() {
        let (registry, _temp) = create_test_registry().await;

        for days in [-1, 100_000_000] {
            let err = registry
                .update_settings(SettingsUpdate {
                    retention_days: Some(days),
                    ..SettingsUpdate::default()
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind, crate::error::ErrorKind::Validation);
        }
        assert_eq!(registry.settings().await.unwrap().retention_days, 30);
    }

    #[tokio::test]
    async fn test_stored_huge_retention_fails_cleanup_without_panicking() {
        let (registry, temp) = create_test_registry().await;
        let record = record_with_file(temp.path(), "a.sql", 400, BackupStatus::Success);
        let path = record.file_path.clone();
        registry.add_record(record).await.unwrap();

        let mut document = registry.load().await.unwrap();
        document.settings.retention_days = 100_000_000;
        registry.save(&document).await.unwrap();

        let err = registry.full_cleanup().await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
        assert!(path.exists());
        assert_eq!(registry.load().await.unwrap().backups.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_age_cleanup_removes_nothing() {
        let (registry, temp) = create_test_registry().await;
        let record = record_with_file(temp.path(), "fresh.sql", 0, BackupStatus::Success);
        let path = record.file_path.clone();
        registry.add_record(record).await.unwrap();

        assert!(registry.cleanup_by_age(-1).await.is_err());
        assert!(path.exists());
        assert_eq!(registry.load().await.unwrap().backups.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_keeps_records_it_cannot_check() {
        let (registry, temp) = create_test_registry().await;
        let blocker = temp.path().join("backups").join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();
        let mut unreadable = BackupRecord::new("inner.sql", blocker.join("inner.sql"), 1, "x");
        unreadable.id = "unreadable".into();
        registry.add_record(unreadable).await.unwrap();

        let validation = registry.validate().await.unwrap();
        assert!(!validation.valid);
        assert_eq!(validation.issues.len(), 1);
        assert!(validation.issues[0].starts_with("Could not verify unreadable"));
        assert!(validation.fixes.is_empty());
        assert_eq!(registry.load().await.unwrap().backups.len(), 1);
    }

    #[tokio::test]
    async fn test_load_reports_unreadable_document() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("metadata");
        std::fs::write(&blocker, "plain file").unwrap();
        let registry = BackupRegistry::new(
            blocker.join("registry.json"),
            RegistrySettings::with_directory(temp_dir.path().join("backups")),
        );

        let err = registry.load().await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Registry);
    }
}
