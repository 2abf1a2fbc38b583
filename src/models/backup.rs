//! Backup record model
//!
//! One record per backup attempt, persisted in the registry document.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome state of a backup attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Success,
    Failed,
    InProgress,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupStatus::Success => write!(f, "success"),
            BackupStatus::Failed => write!(f, "failed"),
            BackupStatus::InProgress => write!(f, "in_progress"),
        }
    }
}

impl std::str::FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(BackupStatus::Success),
            "failed" => Ok(BackupStatus::Failed),
            "in_progress" | "in-progress" => Ok(BackupStatus::InProgress),
            other => Err(format!("Unknown backup status: {}", other)),
        }
    }
}

/// Metadata about one backup attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    /// Opaque unique identifier
    pub id: String,

    pub filename: String,

    /// Absolute path of the backing file
    pub file_path: PathBuf,

    /// Size in bytes
    pub size: u64,

    /// MD5 hex digest of the backing file
    pub checksum: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    pub status: BackupStatus,

    /// Time taken to create the backup, in milliseconds
    #[serde(rename = "duration")]
    pub duration_ms: u64,

    /// Version of the software that produced the backup
    pub version: String,

    pub schema_version: String,
}

impl BackupRecord {
    /// A successful backup record stamped with a fresh id and the current time
    pub fn new(filename: impl Into<String>, file_path: PathBuf, size: u64, checksum: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            file_path,
            size,
            checksum: checksum.into(),
            created_at: Utc::now(),
            created_by: None,
            status: BackupStatus::Success,
            duration_ms: 0,
            version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: "1".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BackupStatus::Success
    }

    /// Age of the backup relative to now
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&BackupStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!("failed".parse::<BackupStatus>().unwrap(), BackupStatus::Failed);
        assert!("bogus".parse::<BackupStatus>().is_err());
    }

    #[test]
    fn test_record_uses_document_field_names() {
        let record = BackupRecord::new("backup.sql", PathBuf::from("/b/backup.sql"), 10, "abc");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["filePath"], "/b/backup.sql");
        assert_eq!(json["duration"], 0);
        assert_eq!(json["status"], "success");
        assert!(json.get("createdBy").is_none());
        assert!(record.is_success());
    }
}
