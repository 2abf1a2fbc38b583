//! Storage layer for pgvault
//!
//! JSON documents written atomically, plus the backup registry that sits
//! on top of them.

pub mod file_io;
pub mod registry;

pub use file_io::{read_json, read_json_required, write_json_atomic};
pub use registry::{
    BackupRegistry, CleanupResult, RecordQuery, RecordUpdate, RegistryDocument, RegistrySettings,
    RegistryStats, RegistryValidation, SettingsUpdate,
};
