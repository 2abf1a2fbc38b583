//! Composed validation of a backup file

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, instrument, warn};

use super::checksum::{calculate_checksum, validate_checksum};
use super::structure::{inspect_corruption, validate_sql_structure, SqlStructure};

/// Files smaller than this cannot hold a meaningful dump
pub const MIN_BACKUP_SIZE: u64 = 100;

/// Files larger than this get a warning
pub const LARGE_BACKUP_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// How many files `validate_multiple_backups` checks concurrently
pub const VALIDATION_BATCH_SIZE: usize = 3;

const KNOWN_EXTENSIONS: &[&str] = &[".sql", ".sql.gz", ".gz", ".dump"];

/// Result of validating one backup file
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True exactly when `errors` is empty
    pub is_valid: bool,
    pub checksum: String,
    pub size: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validation_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure: Option<SqlStructure>,
}

impl ValidationResult {
    fn finish(mut self, started: Instant) -> Self {
        self.is_valid = self.errors.is_empty();
        self.validation_time_ms = started.elapsed().as_millis() as u64;
        self
    }
}

/// Runs existence, size, checksum, structure and corruption checks
#[derive(Debug, Clone)]
pub struct BackupValidator {
    min_size: u64,
    large_size: u64,
}

impl Default for BackupValidator {
    fn default() -> Self {
        Self {
            min_size: MIN_BACKUP_SIZE,
            large_size: LARGE_BACKUP_SIZE,
        }
    }
}

impl BackupValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size_limits(mut self, min_size: u64, large_size: u64) -> Self {
        self.min_size = min_size;
        self.large_size = large_size;
        self
    }

    /// Validate one file
    ///
    /// Never fails; every problem found is reported in the result.
    #[instrument(skip(self, expected_checksum), fields(path = %path.display()))]
    pub async fn validate_backup(
        &self,
        path: &Path,
        expected_checksum: Option<&str>,
    ) -> ValidationResult {
        let started = Instant::now();
        let mut result = ValidationResult::default();

        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                result
                    .errors
                    .push(format!("Backup file not found: {}", path.display()));
                return result.finish(started);
            }
            Err(e) => {
                result
                    .errors
                    .push(format!("Backup file is not accessible: {}", e));
                return result.finish(started);
            }
        };

        if !metadata.is_file() {
            result
                .errors
                .push(format!("Backup path is not a file: {}", path.display()));
            return result.finish(started);
        }

        if let Err(e) = fs::File::open(path).await {
            result
                .errors
                .push(format!("Backup file is not readable: {}", e));
            return result.finish(started);
        }

        if !has_known_extension(path) {
            result.warnings.push(format!(
                "Unexpected file extension: {}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            ));
        }

        result.size = metadata.len();
        if result.size < self.min_size {
            result.errors.push(format!(
                "Backup file too small: {} bytes (minimum {} bytes)",
                result.size, self.min_size
            ));
        } else if result.size > self.large_size {
            result.warnings.push(format!(
                "Backup file is very large: {} bytes",
                result.size
            ));
        }

        match calculate_checksum(path).await {
            Ok(checksum) => {
                if let Some(expected) = expected_checksum {
                    let comparison = validate_checksum(&checksum, expected);
                    if !comparison.matches {
                        result.errors.push(format!(
                            "Checksum mismatch: expected {}, got {}",
                            comparison.expected, comparison.actual
                        ));
                    }
                }
                result.checksum = checksum;
            }
            Err(e) => result
                .errors
                .push(format!("Checksum calculation failed: {}", e.message)),
        }

        match validate_sql_structure(path).await {
            Ok(structure) => {
                if !structure.has_header && !structure.has_footer {
                    result
                        .warnings
                        .push("Missing PostgreSQL dump header and completion marker".to_string());
                }
                if !structure.has_statements() {
                    result.errors.push(
                        "No SQL statements found (CREATE TABLE, INSERT INTO or COPY)".to_string(),
                    );
                } else if structure.table_count == 0 {
                    result.warnings.push("No tables found in backup".to_string());
                }
                result.structure = Some(structure);
            }
            Err(e) => result
                .errors
                .push(format!("SQL structure validation failed: {}", e.message)),
        }

        let corruption = inspect_corruption(path).await;
        if corruption.corrupted {
            result.errors.push(format!(
                "File corruption detected: {}",
                corruption.reason.unwrap_or_else(|| "unknown".to_string())
            ));
        }

        let result = result.finish(started);
        if result.is_valid {
            debug!(size = result.size, "Backup validated");
        } else {
            warn!(errors = ?result.errors, "Backup failed validation");
        }
        result
    }

    /// Validate many files, a few at a time
    pub async fn validate_multiple_backups(
        &self,
        paths: &[PathBuf],
        expected_checksums: &HashMap<PathBuf, String>,
    ) -> BTreeMap<PathBuf, ValidationResult> {
        let mut results = BTreeMap::new();

        for batch in paths.chunks(VALIDATION_BATCH_SIZE) {
            let checks = batch.iter().map(|path| async move {
                let expected = expected_checksums.get(path).map(String::as_str);
                (path.clone(), self.validate_backup(path, expected).await)
            });
            results.extend(join_all(checks).await);
        }

        results
    }
}

fn has_known_extension(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    KNOWN_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
