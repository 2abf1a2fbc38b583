//! Path management for pgvault
//!
//! ## Path Resolution Order
//!
//! 1. `PGVAULT_DATA_DIR` environment variable (if set)
//! 2. The platform data directory (`~/.local/share/pgvault` on Linux,
//!    `~/Library/Application Support/pgvault` on macOS, `%APPDATA%\pgvault`
//!    on Windows)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{BackupError, BackupResult};

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "PGVAULT_DATA_DIR";

/// Manages all paths used by pgvault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Resolve the base directory from the environment or the platform
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if no home directory can be determined.
    pub fn new() -> BackupResult<Self> {
        let base_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => ProjectDirs::from("", "", "pgvault")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    BackupError::file_system("Could not determine a home directory for pgvault data")
                })?,
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Where dump files are written unless the registry says otherwise
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.base_dir.join("metadata")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.metadata_dir().join("registry.json")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.logs_dir().join("audit.log")
    }

    pub fn error_log(&self) -> PathBuf {
        self.logs_dir().join("errors.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Create the base, backup, metadata and log directories
    pub async fn ensure_directories(&self) -> BackupResult<()> {
        for dir in [
            self.base_dir.clone(),
            self.backup_dir(),
            self.metadata_dir(),
            self.logs_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                BackupError::from(e).with_context("path", dir.display().to_string())
            })?;
        }
        Ok(())
    }

    /// Check if pgvault has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}
