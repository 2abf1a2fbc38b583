//! Error taxonomy for pgvault
//!
//! Every failure in the crate is expressed as a [`BackupError`]: a typed
//! error carrying its [`ErrorKind`], a [`Severity`], a free-form context map,
//! a generated identifier and the time it was raised. Retryability is a
//! property of the kind, never of an individual error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Free-form key/value context attached to errors and log entries
pub type ErrorContext = Map<String, Value>;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "CONNECTION_ERROR")]
    Connection,
    #[serde(rename = "BACKUP_CREATION_ERROR")]
    Creation,
    #[serde(rename = "FILE_SYSTEM_ERROR")]
    FileSystem,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "PERMISSION_ERROR")]
    Permission,
    #[serde(rename = "DISK_SPACE_ERROR")]
    DiskSpace,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "CORRUPTION_ERROR")]
    Corruption,
    #[serde(rename = "REGISTRY_ERROR")]
    Registry,
    #[serde(rename = "COMPRESSION_ERROR")]
    Compression,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::Connection,
        ErrorKind::Creation,
        ErrorKind::FileSystem,
        ErrorKind::Validation,
        ErrorKind::Permission,
        ErrorKind::DiskSpace,
        ErrorKind::Timeout,
        ErrorKind::Corruption,
        ErrorKind::Registry,
        ErrorKind::Compression,
        ErrorKind::Network,
        ErrorKind::Unknown,
    ];

    /// Whether errors of this kind may succeed when attempted again
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Connection
            | ErrorKind::Creation
            | ErrorKind::FileSystem
            | ErrorKind::Timeout
            | ErrorKind::Registry
            | ErrorKind::Compression
            | ErrorKind::Network => true,
            ErrorKind::Validation
            | ErrorKind::Permission
            | ErrorKind::DiskSpace
            | ErrorKind::Corruption
            | ErrorKind::Unknown => false,
        }
    }

    /// Severity assigned to new errors of this kind
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::DiskSpace | ErrorKind::Corruption => Severity::Critical,
            ErrorKind::Connection | ErrorKind::Creation | ErrorKind::Permission => Severity::High,
            ErrorKind::Compression => Severity::Low,
            _ => Severity::Medium,
        }
    }

    /// Stable machine-readable code (matches the serialized form)
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Creation => "BACKUP_CREATION_ERROR",
            ErrorKind::FileSystem => "FILE_SYSTEM_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::DiskSpace => "DISK_SPACE_ERROR",
            ErrorKind::Timeout => "TIMEOUT_ERROR",
            ErrorKind::Corruption => "CORRUPTION_ERROR",
            ErrorKind::Registry => "REGISTRY_ERROR",
            ErrorKind::Compression => "COMPRESSION_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Connection => "Connection",
            ErrorKind::Creation => "Backup creation",
            ErrorKind::FileSystem => "File system",
            ErrorKind::Validation => "Validation",
            ErrorKind::Permission => "Permission",
            ErrorKind::DiskSpace => "Disk space",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Corruption => "Corruption",
            ErrorKind::Registry => "Registry",
            ErrorKind::Compression => "Compression",
            ErrorKind::Network => "Network",
            ErrorKind::Unknown => "Unknown",
        };
        write!(f, "{}", label)
    }
}

/// How serious a failure is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The error type for every pgvault operation
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct BackupError {
    /// Unique identifier of this occurrence
    pub id: String,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

impl BackupError {
    /// Create an error of the given kind with its default severity
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            context: ErrorContext::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn creation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Creation, message)
    }

    pub fn file_system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileSystem, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn disk_space(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DiskSpace, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corruption, message)
    }

    pub fn registry(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registry, message)
    }

    pub fn compression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compression, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// A registry error for a record identifier that does not exist
    pub fn record_not_found(id: &str) -> Self {
        Self::registry(format!("Backup record not found: {}", id)).with_context("backupId", id)
    }

    /// Attach a context value
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Merge a context map into this error, keeping existing keys
    pub fn with_context_map(mut self, context: &ErrorContext) -> Self {
        for (key, value) in context {
            self.context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }

    /// Override the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Whether this error's kind is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        crate::recovery::normalize_error(err, &ErrorContext::new())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::registry(format!("Failed to process metadata document: {}", err))
    }
}

/// Result type alias for pgvault operations
pub type BackupResult<T> = Result<T, BackupError>;
