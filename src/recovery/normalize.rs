//! Best-effort classification of untyped failures
//!
//! Typed errors pass through untouched. I/O errors are first classified by
//! their `std::io::ErrorKind`; everything else is matched against an ordered
//! list of message markers. The first matching rule wins and anything left
//! over becomes [`ErrorKind::Unknown`]. The marker lists are heuristics and
//! make no claim to be exhaustive.

use std::io;

use crate::error::{BackupError, ErrorContext, ErrorKind};

/// A message-marker rule: if any marker appears in the lowercased message,
/// the failure is classified as `kind`
struct NormalizationRule {
    kind: ErrorKind,
    markers: &'static [&'static str],
}

impl NormalizationRule {
    fn matches(&self, lowered: &str) -> bool {
        self.markers.iter().any(|marker| lowered.contains(marker))
    }
}

const RULES: &[NormalizationRule] = &[
    NormalizationRule {
        kind: ErrorKind::Connection,
        markers: &[
            "econnrefused",
            "connection refused",
            "could not connect",
            "connection reset",
            "server closed the connection",
        ],
    },
    NormalizationRule {
        kind: ErrorKind::FileSystem,
        markers: &["enoent", "no such file", "not found", "is a directory"],
    },
    NormalizationRule {
        kind: ErrorKind::Permission,
        markers: &["eacces", "eperm", "permission denied", "operation not permitted"],
    },
    NormalizationRule {
        kind: ErrorKind::DiskSpace,
        markers: &["enospc", "no space left", "disk full", "insufficient disk"],
    },
    NormalizationRule {
        kind: ErrorKind::Timeout,
        markers: &["timeout", "timed out", "etimedout"],
    },
    NormalizationRule {
        kind: ErrorKind::Validation,
        markers: &["checksum", "validation", "invalid backup"],
    },
    NormalizationRule {
        kind: ErrorKind::Creation,
        markers: &["pg_dump", "dump failed", "dump utility"],
    },
    NormalizationRule {
        kind: ErrorKind::Registry,
        markers: &["registry", "metadata"],
    },
    NormalizationRule {
        kind: ErrorKind::Compression,
        markers: &["gzip", "compress", "zlib", "deflate"],
    },
    NormalizationRule {
        kind: ErrorKind::Network,
        markers: &["network", "ehostunreach", "enetunreach", "socket hang up"],
    },
];

/// Convert any failure into a typed [`BackupError`]. Never fails.
///
/// A value that already is a `BackupError` is returned unchanged; the
/// supplied context is only attached to newly constructed errors.
pub fn normalize_error<E>(error: E, context: &ErrorContext) -> BackupError
where
    E: Into<anyhow::Error>,
{
    let error: anyhow::Error = error.into();
    let error = match error.downcast::<BackupError>() {
        Ok(typed) => return typed,
        Err(other) => other,
    };

    let message = format!("{:#}", error);

    let structural = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .and_then(|io_err| classify_io_kind(io_err.kind()));

    let kind = structural.unwrap_or_else(|| classify_message(&message));
    BackupError::new(kind, message).with_context_map(context)
}

/// Classify a bare message using the marker rules
pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.kind)
        .unwrap_or(ErrorKind::Unknown)
}

fn classify_io_kind(kind: io::ErrorKind) -> Option<ErrorKind> {
    match kind {
        io::ErrorKind::NotFound => Some(ErrorKind::FileSystem),
        io::ErrorKind::PermissionDenied => Some(ErrorKind::Permission),
        io::ErrorKind::TimedOut => Some(ErrorKind::Timeout),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => Some(ErrorKind::Connection),
        io::ErrorKind::AddrNotAvailable | io::ErrorKind::BrokenPipe => Some(ErrorKind::Network),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn kind_of(message: &str) -> ErrorKind {
        normalize_error(anyhow!(message.to_string()), &ErrorContext::new()).kind
    }

    #[test]
    fn test_typed_error_returned_unchanged() {
        let original = BackupError::disk_space("full");
        let mut ctx = ErrorContext::new();
        ctx.insert("operation".into(), "x".into());

        let normalized = normalize_error(original.clone(), &ctx);
        assert_eq!(normalized.id, original.id);
        assert_eq!(normalized.kind, ErrorKind::DiskSpace);
        assert!(normalized.context.is_empty());
    }

    #[test]
    fn test_message_markers() {
        assert_eq!(kind_of("connect ECONNREFUSED 127.0.0.1:5432"), ErrorKind::Connection);
        assert_eq!(kind_of("ENOENT: no such file or directory"), ErrorKind::FileSystem);
        assert_eq!(kind_of("EACCES: permission denied"), ErrorKind::Permission);
        assert_eq!(kind_of("ENOSPC: no space left on device"), ErrorKind::DiskSpace);
        assert_eq!(kind_of("operation timed out"), ErrorKind::Timeout);
        assert_eq!(kind_of("Checksum mismatch"), ErrorKind::Validation);
        assert_eq!(kind_of("pg_dump exited with code 1"), ErrorKind::Creation);
        assert_eq!(kind_of("registry write failed"), ErrorKind::Registry);
        assert_eq!(kind_of("gzip stream ended early"), ErrorKind::Compression);
        assert_eq!(kind_of("network unreachable"), ErrorKind::Network);
        assert_eq!(kind_of("something odd happened"), ErrorKind::Unknown);
    }

    #[test]
    fn test_rule_order_prefers_connection() {
        assert_eq!(kind_of("could not connect: connection timed out"), ErrorKind::Connection);
    }

    #[test]
    fn test_io_kind_takes_precedence() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "checksum file");
        let err = normalize_error(io_err, &ErrorContext::new());
        assert_eq!(err.kind, ErrorKind::Permission);
    }

    #[test]
    fn test_context_attached_to_new_errors() {
        let mut ctx = ErrorContext::new();
        ctx.insert("path".into(), "/tmp/x.sql".into());
        let err = normalize_error(anyhow!("boom"), &ctx);
        assert_eq!(err.context["path"], "/tmp/x.sql");
    }
}
