//! Audit logging for privileged backup operations
//!
//! Records who did what, when, and with what result in an append-only,
//! size-rotated JSONL log.
//!
//! # Architecture
//!
//! - `AuditEntry`: one operation, its actor, target resource and outcome
//! - `AuditLogger`: appends entries, rotates the file, and answers queries
//!
//! # Example
//!
//! ```rust,ignore
//! use pgvault::audit::{Actor, AuditEntry, AuditLogger, Operation};
//!
//! let logger = AuditLogger::new(paths.audit_log(), 10 * 1024 * 1024, 5);
//! logger
//!     .log_operation(AuditEntry::new(&Actor::system(), Operation::Cleanup, true))
//!     .await;
//! ```

mod entry;
mod logger;

pub use entry::{Actor, AuditEntry, Operation};
pub use logger::{AuditFilter, AuditLogger, AuditStats};
