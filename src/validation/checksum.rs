//! MD5 checksums of backup files

use std::path::Path;

use md5::{Digest, Md5};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{BackupError, BackupResult};

const CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of comparing two checksums
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumComparison {
    pub matches: bool,
    /// Lowercased actual checksum
    pub actual: String,
    /// Lowercased expected checksum
    pub expected: String,
}

/// Stream a file through MD5 and return the lowercase hex digest
pub async fn calculate_checksum(path: &Path) -> BackupResult<String> {
    let mut file = File::open(path).await.map_err(|e| {
        BackupError::validation(format!(
            "Failed to open {} for checksum: {}",
            path.display(),
            e
        ))
        .with_context("path", path.display().to_string())
    })?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buffer).await.map_err(|e| {
            BackupError::validation(format!(
                "Failed to read {} for checksum: {}",
                path.display(),
                e
            ))
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Case-insensitive checksum comparison
pub fn validate_checksum(actual: &str, expected: &str) -> ChecksumComparison {
    let actual = actual.trim().to_lowercase();
    let expected = expected.trim().to_lowercase();
    ChecksumComparison {
        matches: actual == expected,
        actual,
        expected,
    }
}
