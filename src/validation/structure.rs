//! Structural heuristics for SQL dump files
//!
//! These checks scan for the statements and comments a dump normally
//! contains; they do not parse SQL.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use serde::Serialize;

use crate::error::{BackupError, BackupResult};

const HEADER_MARKERS: &[&str] = &["-- PostgreSQL database dump", "-- Dumped from database version"];
const FOOTER_MARKER: &str = "-- PostgreSQL database dump complete";

/// Bytes decompressed when probing a compressed dump for corruption
const COMPRESSED_PROBE_BYTES: u64 = 1024;

/// What the structural scan found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlStructure {
    pub has_create_table: bool,
    pub has_insert: bool,
    pub has_copy: bool,
    pub has_header: bool,
    pub has_footer: bool,
    pub table_count: usize,
    /// INSERT plus COPY statement count
    pub estimated_records: usize,
}

impl SqlStructure {
    pub fn has_statements(&self) -> bool {
        self.has_create_table || self.has_insert || self.has_copy
    }

    fn scan_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.starts_with(FOOTER_MARKER) {
            self.has_footer = true;
        } else if HEADER_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
            self.has_header = true;
        }

        let tables = create_table_re().find_iter(line).count();
        let inserts = insert_re().find_iter(line).count();
        let copies = usize::from(copy_re().is_match(line));

        self.table_count += tables;
        self.estimated_records += inserts + copies;
        self.has_create_table |= tables > 0;
        self.has_insert |= inserts > 0;
        self.has_copy |= copies > 0;
    }
}

/// Result of the corruption heuristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionCheck {
    pub corrupted: bool,
    pub reason: Option<String>,
}

impl CorruptionCheck {
    fn clean() -> Self {
        Self {
            corrupted: false,
            reason: None,
        }
    }

    fn corrupted(reason: impl Into<String>) -> Self {
        Self {
            corrupted: true,
            reason: Some(reason.into()),
        }
    }
}

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bCREATE\s+(?:UNLOGGED\s+|TEMP\s+|TEMPORARY\s+)?TABLE\b").unwrap())
}

fn insert_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bINSERT\s+INTO\b").unwrap())
}

fn copy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*COPY\s+\S+.*\bFROM\s+stdin").unwrap())
}

/// Whether the path names a gzip-compressed dump
pub fn is_compressed(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

/// Scan a dump (decompressing `.gz` transparently) for structural markers
pub async fn validate_sql_structure(path: &Path) -> BackupResult<SqlStructure> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || scan_structure(&path))
        .await
        .map_err(|e| BackupError::validation(format!("Structure scan task failed: {}", e)))?
}

fn scan_structure(path: &PathBuf) -> BackupResult<SqlStructure> {
    let file = File::open(path).map_err(|e| {
        BackupError::validation(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let mut reader: Box<dyn BufRead> = if is_compressed(path) {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut structure = SqlStructure::default();
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let read = reader.read_until(b'\n', &mut raw).map_err(|e| {
            BackupError::validation(format!("Failed to read {}: {}", path.display(), e))
        })?;
        if read == 0 {
            break;
        }
        structure.scan_line(&String::from_utf8_lossy(&raw));
    }

    Ok(structure)
}

/// Heuristic corruption check; unreadable files count as corrupted
pub async fn detect_file_corruption(path: &Path) -> bool {
    inspect_corruption(path).await.corrupted
}

/// Like [`detect_file_corruption`] but explains the finding
pub async fn inspect_corruption(path: &Path) -> CorruptionCheck {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        if is_compressed(&path) {
            probe_compressed(&path)
        } else {
            probe_text(&path)
        }
    })
    .await
    .unwrap_or_else(|e| CorruptionCheck::corrupted(format!("corruption check failed: {}", e)))
}

fn probe_compressed(path: &Path) -> CorruptionCheck {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return CorruptionCheck::corrupted(format!("unreadable: {}", e)),
    };

    let mut prefix = Vec::new();
    match GzDecoder::new(file)
        .take(COMPRESSED_PROBE_BYTES)
        .read_to_end(&mut prefix)
    {
        Ok(_) => CorruptionCheck::clean(),
        Err(e) => CorruptionCheck::corrupted(format!("failed to decompress: {}", e)),
    }
}

fn probe_text(path: &Path) -> CorruptionCheck {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => return CorruptionCheck::corrupted(format!("unreadable: {}", e)),
    };

    let mut reader = BufReader::new(file);
    let mut buffer = [0u8; 64 * 1024];
    let mut has_content = false;
    let mut offset = 0u64;

    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return CorruptionCheck::corrupted(format!("unreadable: {}", e)),
        };

        for (i, byte) in buffer[..read].iter().enumerate() {
            if is_invalid_control(*byte) {
                return CorruptionCheck::corrupted(format!(
                    "invalid control character 0x{:02x} at byte {}",
                    byte,
                    offset + i as u64
                ));
            }
            has_content |= !byte.is_ascii_whitespace();
        }
        offset += read as u64;
    }

    if has_content {
        CorruptionCheck::clean()
    } else {
        CorruptionCheck::corrupted("file is empty")
    }
}

fn is_invalid_control(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0C | 0x0E..=0x1F | 0x7F)
}
