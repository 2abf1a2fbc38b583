//! Health probes
//!
//! Each probe answers a single yes/no question and never fails; problems
//! are logged and count as a failed check.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::net::TcpStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backup::ConnectionParams;
use crate::models::BackupStatus;
use crate::storage::{BackupRegistry, RecordQuery};
use crate::validation::BackupValidator;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Fraction of the storage ceiling that may be used before the disk
/// check fails
pub const DISK_USAGE_LIMIT: f64 = 0.9;

/// How many of the most recent backups the integrity probe validates
pub const INTEGRITY_SAMPLE: usize = 5;

/// Can the source database be reached?
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Opens a TCP connection to the host and port named in the database URL
#[derive(Debug, Clone)]
pub struct TcpDatabaseProbe {
    database_url: Option<String>,
    timeout: Duration,
}

impl TcpDatabaseProbe {
    pub fn new(database_url: Option<String>) -> Self {
        Self {
            database_url,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DatabaseProbe for TcpDatabaseProbe {
    async fn check(&self) -> bool {
        let Some(url) = &self.database_url else {
            warn!("no database URL configured");
            return false;
        };
        let params = match ConnectionParams::from_url(url) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "cannot probe database");
                return false;
            }
        };

        let address = (params.host.as_str(), params.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(host = %params.host, port = params.port, error = %e, "database unreachable");
                false
            }
            Err(_) => {
                warn!(host = %params.host, port = params.port, "database connection timed out");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub disk_space: bool,
    pub backup_integrity: bool,
    pub database_connection: bool,
    pub file_permissions: bool,
}

impl HealthChecks {
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("diskSpace", self.disk_space),
            ("backupIntegrity", self.backup_integrity),
            ("databaseConnection", self.database_connection),
            ("filePermissions", self.file_permissions),
        ]
        .into_iter()
        .filter(|(_, passed)| !passed)
        .map(|(name, _)| name)
        .collect()
    }

    pub fn status(&self) -> HealthStatus {
        if !self.backup_integrity || !self.database_connection {
            HealthStatus::Critical
        } else if !self.disk_space || !self.file_permissions {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: HealthChecks,
    pub failed_checks: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl HealthReport {
    pub fn new(checks: HealthChecks, duration_ms: u64) -> Self {
        Self {
            status: checks.status(),
            failed_checks: checks.failed().into_iter().map(String::from).collect(),
            checks,
            timestamp: Utc::now(),
            duration_ms,
        }
    }
}

/// Registered backups use less than 90% of `max_storage_gb`
pub async fn check_disk_headroom(registry: &BackupRegistry, max_storage_gb: f64) -> bool {
    match registry.stats().await {
        Ok(stats) => {
            let used_gb = stats.total_size as f64 / GIB;
            let passed = used_gb < max_storage_gb * DISK_USAGE_LIMIT;
            debug!(used_gb, max_storage_gb, passed, "disk headroom check");
            passed
        }
        Err(e) => {
            warn!(error = %e, "disk headroom check failed");
            false
        }
    }
}

/// The most recent successful backups all validate
pub async fn check_backup_integrity(registry: &BackupRegistry, validator: &BackupValidator) -> bool {
    let query = RecordQuery {
        status: Some(BackupStatus::Success),
        limit: Some(INTEGRITY_SAMPLE),
        ..RecordQuery::default()
    };
    let records = match registry.list_records(&query).await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "integrity check could not read registry");
            return false;
        }
    };

    for record in &records {
        let expected = Some(record.checksum.as_str()).filter(|c| !c.is_empty());
        let result = validator.validate_backup(&record.file_path, expected).await;
        if !result.is_valid {
            warn!(id = %record.id, errors = ?result.errors, "backup failed integrity check");
            return false;
        }
    }
    true
}

/// The backup directory can be created, written, read and cleaned up
pub async fn check_file_permissions(directory: &Path) -> bool {
    let probe = directory.join(format!(".pgvault-health-{}", Uuid::new_v4()));
    let result = async {
        fs::create_dir_all(directory).await?;
        fs::write(&probe, b"ok").await?;
        let contents = fs::read(&probe).await?;
        fs::remove_file(&probe).await?;
        Ok::<bool, std::io::Error>(contents == b"ok")
    }
    .await;

    match result {
        Ok(passed) => passed,
        Err(e) => {
            warn!(dir = %directory.display(), error = %e, "permission check failed");
            let _ = fs::remove_file(&probe).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupRecord;
    use crate::storage::RegistrySettings;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn checks(disk: bool, integrity: bool, db: bool, perms: bool) -> HealthChecks {
        HealthChecks {
            disk_space: disk,
            backup_integrity: integrity,
            database_connection: db,
            file_permissions: perms,
        }
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(checks(true, true, true, true).status(), HealthStatus::Healthy);
        assert_eq!(checks(false, true, true, true).status(), HealthStatus::Warning);
        assert_eq!(checks(true, true, true, false).status(), HealthStatus::Warning);
        assert_eq!(checks(true, false, true, true).status(), HealthStatus::Critical);
        assert_eq!(checks(false, true, false, false).status(), HealthStatus::Critical);

        let report = HealthReport::new(checks(false, true, false, true), 3);
        assert_eq!(report.failed_checks, vec!["diskSpace", "databaseConnection"]);
    }

    #[tokio::test]
    async fn test_tcp_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reachable = TcpDatabaseProbe::new(Some(format!("postgres://u@127.0.0.1:{}/db", port)));
        assert!(reachable.check().await);

        drop(listener);
        let unreachable = TcpDatabaseProbe::new(Some(format!("postgres://u@127.0.0.1:{}/db", port)))
            .with_timeout(Duration::from_millis(500));
        assert!(!unreachable.check().await);

        assert!(!TcpDatabaseProbe::new(None).check().await);
    }

    #[tokio::test]
    async fn test_disk_headroom() {
        let temp_dir = TempDir::new().unwrap();
        let registry = BackupRegistry::new(
            temp_dir.path().join("registry.json"),
            RegistrySettings::with_directory(temp_dir.path().to_path_buf()),
        );
        registry
            .add_record(BackupRecord::new(
                "big.sql",
                temp_dir.path().join("big.sql"),
                (GIB * 0.95) as u64,
                "x",
            ))
            .await
            .unwrap();

        assert!(check_disk_headroom(&registry, 2.0).await);
        assert!(!check_disk_headroom(&registry, 1.0).await);
    }

    #[tokio::test]
    async fn test_integrity_with_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let registry = BackupRegistry::new(
            temp_dir.path().join("registry.json"),
            RegistrySettings::with_directory(temp_dir.path().to_path_buf()),
        );
        let validator = BackupValidator::new();

        assert!(check_backup_integrity(&registry, &validator).await);

        registry
            .add_record(BackupRecord::new("gone.sql", temp_dir.path().join("gone.sql"), 10, "x"))
            .await
            .unwrap();
        assert!(!check_backup_integrity(&registry, &validator).await);
    }

    #[tokio::test]
    async fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        assert!(check_file_permissions(&temp_dir.path().join("backups")).await);
        assert_eq!(std::fs::read_dir(temp_dir.path().join("backups")).unwrap().count(), 0);

        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        assert!(!check_file_permissions(&blocker.join("backups")).await);
    }
}
