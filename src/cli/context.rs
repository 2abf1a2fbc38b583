//! Shared state for command handlers
//!
//! Builds the registry, loggers and services from the resolved paths and
//! settings so every handler sees the same wiring.

use std::sync::Arc;

use crate::audit::{Actor, AuditLogger};
use crate::backup::{BackupService, PgDumpRunner};
use crate::config::{Settings, VaultPaths};
use crate::error::{BackupError, BackupResult};
use crate::models::BackupRecord;
use crate::monitoring::{BackupMonitor, TcpDatabaseProbe};
use crate::recovery::ErrorLog;
use crate::storage::{BackupRegistry, RegistrySettings};

pub struct AppContext {
    pub paths: VaultPaths,
    pub settings: Settings,
    pub registry: Arc<BackupRegistry>,
    pub audit: Arc<AuditLogger>,
    pub error_log: Arc<ErrorLog>,
}

impl AppContext {
    /// Load settings and open the stores under `paths`
    pub async fn load(paths: VaultPaths) -> BackupResult<Self> {
        let settings = Settings::load_or_create(&paths).await?;
        Ok(Self::with_settings(paths, settings))
    }

    pub fn with_settings(paths: VaultPaths, settings: Settings) -> Self {
        let registry = Arc::new(BackupRegistry::new(
            paths.registry_file(),
            RegistrySettings::with_directory(paths.backup_dir()),
        ));
        let audit = Arc::new(AuditLogger::new(
            paths.audit_log(),
            settings.audit.max_file_size,
            settings.audit.max_files,
        ));
        let error_log = Arc::new(ErrorLog::new(
            paths.error_log(),
            settings.error_log.max_entries,
        ));

        Self {
            paths,
            settings,
            registry,
            audit,
            error_log,
        }
    }

    /// The operator running the command, taken from the login name
    pub fn actor(&self) -> Actor {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "operator".to_string());
        Actor::new(user.clone(), format!("{}@localhost", user), "operator")
    }

    pub fn backup_service(&self) -> BackupService {
        let runner = Arc::new(PgDumpRunner::new(self.settings.backup.dump_binary.clone()));
        BackupService::new(
            Arc::clone(&self.registry),
            runner,
            self.settings.backup.clone(),
            self.settings.effective_database_url(),
            Some(Arc::clone(&self.error_log)),
        )
        .with_audit(Arc::clone(&self.audit), self.actor())
    }

    pub fn monitor(&self) -> BackupMonitor {
        BackupMonitor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.audit),
            Arc::new(TcpDatabaseProbe::new(self.settings.effective_database_url())),
            self.settings.monitoring.clone(),
        )
    }

    /// Find a record by full id, unique id prefix, or `latest`
    pub async fn resolve_backup(&self, id: &str) -> BackupResult<BackupRecord> {
        let document = self.registry.load().await?;

        if id.eq_ignore_ascii_case("latest") {
            return document
                .backups
                .iter()
                .filter(|r| r.is_success())
                .max_by_key(|r| r.created_at)
                .cloned()
                .ok_or_else(|| BackupError::registry("No successful backups registered"));
        }

        if let Some(record) = document.backups.iter().find(|r| r.id == id) {
            return Ok(record.clone());
        }

        let matches: Vec<&BackupRecord> = document
            .backups
            .iter()
            .filter(|r| r.id.starts_with(id))
            .collect();
        match matches.as_slice() {
            [record] => Ok((*record).clone()),
            [] => Err(BackupError::registry(format!("Backup not found: {}", id))
                .with_context("id", id)),
            _ => Err(BackupError::validation(format!(
                "Ambiguous backup id '{}' matches {} backups",
                id,
                matches.len()
            ))
            .with_context("id", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_context() -> (TempDir, AppContext) {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());
        let context = AppContext::with_settings(paths, Settings::default());
        (temp_dir, context)
    }

    #[tokio::test]
    async fn test_resolve_backup() {
        let (_temp, context) = create_test_context();
        let mut first = BackupRecord::new("a.sql", PathBuf::from("/a.sql"), 1, "x");
        first.id = "abc-111".into();
        let mut second = BackupRecord::new("b.sql", PathBuf::from("/b.sql"), 1, "x");
        second.id = "abd-222".into();
        context.registry.add_record(first).await.unwrap();
        context.registry.add_record(second.clone()).await.unwrap();

        assert_eq!(context.resolve_backup("abc-111").await.unwrap().filename, "a.sql");
        assert_eq!(context.resolve_backup("abd").await.unwrap().filename, "b.sql");
        assert!(context.resolve_backup("ab").await.is_err());
        assert!(context.resolve_backup("zzz").await.is_err());
        assert_eq!(context.resolve_backup("latest").await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_latest_without_backups() {
        let (_temp, context) = create_test_context();
        assert!(context.resolve_backup("latest").await.is_err());
    }
}
