//! Backup file validation
//!
//! Checksums, structural heuristics for SQL dumps, corruption detection
//! and a composed validator that reports every problem it finds.

mod checksum;
mod report;
mod structure;
mod validator;

pub use checksum::{calculate_checksum, validate_checksum, ChecksumComparison};
pub use report::{generate_validation_report, ValidationSummary};
pub use structure::{
    detect_file_corruption, inspect_corruption, is_compressed, validate_sql_structure,
    CorruptionCheck, SqlStructure,
};
pub use validator::{
    BackupValidator, ValidationResult, LARGE_BACKUP_SIZE, MIN_BACKUP_SIZE, VALIDATION_BATCH_SIZE,
};
