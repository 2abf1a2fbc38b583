//! Backup request options, progress reporting and outcomes

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::error::{BackupError, BackupResult};

/// Which parts of the database a dump contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpMode {
    /// Schema and data, with `--clean --create`
    Full,
    SchemaOnly,
    DataOnly,
}

/// What to back up and where
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// File name inside the target directory; timestamped when absent
    pub filename: Option<String>,
    /// Target directory; the registry default when absent
    pub directory: Option<PathBuf>,
    pub include_data: bool,
    pub include_schema: bool,
    /// Gzip the dump; the configured default when absent
    pub compress: Option<bool>,
    pub created_by: Option<String>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            filename: None,
            directory: None,
            include_data: true,
            include_schema: true,
            compress: None,
            created_by: None,
        }
    }
}

fn safe_filename_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,254}$").unwrap())
}

impl BackupOptions {
    /// Check the options without touching the filesystem
    pub fn validate(&self) -> BackupResult<()> {
        if let Some(filename) = &self.filename {
            if !safe_filename_re().is_match(filename) || filename.contains("..") {
                return Err(BackupError::validation(format!(
                    "Invalid backup filename '{}': use letters, digits, '.', '_' or '-'",
                    filename
                ))
                .with_context("filename", filename.clone()));
            }
        }
        self.dump_mode().map(|_| ())
    }

    pub fn dump_mode(&self) -> BackupResult<DumpMode> {
        match (self.include_schema, self.include_data) {
            (true, true) => Ok(DumpMode::Full),
            (true, false) => Ok(DumpMode::SchemaOnly),
            (false, true) => Ok(DumpMode::DataOnly),
            (false, false) => Err(BackupError::validation(
                "At least one of include data or include schema must be enabled",
            )),
        }
    }
}

/// Coarse state reported alongside progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
    Failed,
}

/// One progress notification from the creation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// 0 to 100
    pub percent: u8,
    pub message: String,
    pub status: ProgressStatus,
}

/// Observer for progress updates
pub type ProgressSink = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Structured result of a creation attempt; always returned, never thrown
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub success: bool,
    pub backup_id: Option<String>,
    pub filename: Option<String>,
    pub file_path: Option<PathBuf>,
    pub size: u64,
    pub checksum: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}
