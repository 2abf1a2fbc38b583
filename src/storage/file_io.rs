//! File I/O utilities with atomic writes
//!
//! Provides safe JSON document operations that won't corrupt data on failure.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{BackupError, BackupResult};

/// Read JSON from a file, returning a default value if the file doesn't exist
pub async fn read_json<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let exists = fs::try_exists(path).await.map_err(|e| {
        BackupError::from(e).with_context("path", path.display().to_string())
    })?;
    if !exists {
        return Ok(T::default());
    }

    read_json_required(path).await
}

/// Read JSON from a file, returning an error if the file doesn't exist
pub async fn read_json_required<T, P>(path: P) -> BackupResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let contents = fs::read(path).await.map_err(|e| {
        BackupError::from(e).with_context("path", path.display().to_string())
    })?;

    serde_json::from_slice(&contents).map_err(|e| {
        BackupError::registry(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Write JSON to a file atomically (write to temp, then rename)
///
/// The file is either completely written or not modified at all.
pub async fn write_json_atomic<T, P>(path: P, data: &T) -> BackupResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            BackupError::from(e)
                .with_context("path", parent.display().to_string())
                .with_context("action", "create_dir")
        })?;
    }

    // Temp file must live in the same directory for the rename to be atomic
    let temp_path = path.with_extension("json.tmp");

    let bytes = serde_json::to_vec_pretty(data)
        .map_err(|e| BackupError::registry(format!("Failed to serialize data: {}", e)))?;

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(BackupError::from(e).with_context("path", path.display().to_string()));
    }

    Ok(())
}
