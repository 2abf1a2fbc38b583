//! Gzip compression of finished dumps

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{BackupError, BackupResult};

/// Compress `source` to `<source>.gz` and remove the original
///
/// On failure the partial archive is removed and the source is left alone.
pub async fn compress_file(source: &Path) -> BackupResult<PathBuf> {
    let source = source.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut name = source.as_os_str().to_owned();
        name.push(".gz");
        let target = PathBuf::from(name);

        if let Err(e) = gzip(&source, &target) {
            let _ = std::fs::remove_file(&target);
            return Err(BackupError::compression(format!(
                "Failed to compress {}: {}",
                source.display(),
                e
            ))
            .with_context("path", source.display().to_string()));
        }

        std::fs::remove_file(&source).map_err(|e| {
            BackupError::from(e).with_context("path", source.display().to_string())
        })?;
        Ok(target)
    })
    .await
    .map_err(|e| BackupError::compression(format!("Compression task failed: {}", e)))?
}

fn gzip(source: &Path, target: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(target)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    let mut writer = encoder.finish()?;
    io::Write::flush(&mut writer)?;
    writer.get_ref().sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_compress_replaces_source() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("backup.sql");
        std::fs::write(&source, "CREATE TABLE t (id int);\n").unwrap();

        let target = compress_file(&source).await.unwrap();
        assert_eq!(target, temp_dir.path().join("backup.sql.gz"));
        assert!(!source.exists());

        let mut contents = String::new();
        GzDecoder::new(File::open(&target).unwrap())
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "CREATE TABLE t (id int);\n");
    }

    #[tokio::test]
    async fn test_missing_source_is_compression_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = compress_file(&temp_dir.path().join("missing.sql"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Compression);
        assert!(!temp_dir.path().join("missing.sql.gz").exists());
    }
}
