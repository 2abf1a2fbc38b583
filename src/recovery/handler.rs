//! Retry executor tying together normalization, the error log and fallbacks

use std::future::Future;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::{BackupError, BackupResult, ErrorContext};

use super::error_log::{ErrorLog, ErrorLogEntry};
use super::fallback::{FallbackRegistry, FallbackStrategy, Outcome};
use super::normalize::normalize_error;
use super::retry::RetryPolicy;

/// Strategy name recorded when an operation succeeds after failed attempts
pub const RETRY_RESOLUTION: &str = "retry";

/// Runs operations under a retry policy, logging every failure
pub struct ErrorHandler {
    error_log: Option<Arc<ErrorLog>>,
    fallbacks: FallbackRegistry,
}

impl ErrorHandler {
    pub fn new(error_log: Option<Arc<ErrorLog>>, fallbacks: FallbackRegistry) -> Self {
        Self {
            error_log,
            fallbacks,
        }
    }

    pub fn error_log(&self) -> Option<&Arc<ErrorLog>> {
        self.error_log.as_ref()
    }

    pub fn fallbacks(&self) -> &FallbackRegistry {
        &self.fallbacks
    }

    /// Register an additional fallback strategy
    pub fn register_fallback(&self, kind: crate::error::ErrorKind, strategy: FallbackStrategy) {
        self.fallbacks.register(kind, strategy);
    }

    /// Record an error in the error log. Failures to write are reported on
    /// the diagnostic channel and otherwise ignored.
    pub async fn log_error(
        &self,
        error: &BackupError,
        attempt: u32,
        operation: Option<&str>,
    ) -> Option<String> {
        let log = self.error_log.as_ref()?;
        let entry = ErrorLogEntry::from_error(error, attempt, operation);
        let id = entry.id.clone();
        match log.append(entry).await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to write error log entry");
                None
            }
        }
    }

    async fn resolve(&self, ids: &[String], strategy: &str) {
        if let Some(log) = &self.error_log {
            if let Err(e) = log.mark_resolved(ids, strategy).await {
                warn!(error = %e, "failed to record error resolution");
            }
        }
    }

    /// Run `operation` up to `policy.max_attempts` times.
    ///
    /// Kinds outside the policy's retryable set, and the final attempt, go to
    /// the registered fallbacks; a successful fallback is returned as
    /// [`Outcome::Recovered`]. Otherwise the normalized error is returned.
    #[instrument(skip(self, operation, context, policy), fields(max_attempts = policy.max_attempts))]
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        operation_name: &str,
        context: &ErrorContext,
        policy: &RetryPolicy,
    ) -> BackupResult<Outcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut logged = Vec::new();
        let mut attempt = 1;

        loop {
            let raw = match operation().await {
                Ok(value) => {
                    if !logged.is_empty() {
                        info!(operation = operation_name, attempt, "operation succeeded after retry");
                        self.resolve(&logged, RETRY_RESOLUTION).await;
                    }
                    return Ok(Outcome::Completed(value));
                }
                Err(raw) => raw,
            };

            let mut attempt_context = context.clone();
            attempt_context.insert("operation".into(), operation_name.into());
            attempt_context.insert("attempt".into(), attempt.into());
            let error = normalize_error(raw, &attempt_context);

            warn!(
                operation = operation_name,
                attempt,
                kind = %error.kind,
                error = %error.message,
                "operation failed"
            );
            if let Some(id) = self.log_error(&error, attempt, Some(operation_name)).await {
                logged.push(id);
            }

            if !policy.should_retry(error.kind) || attempt >= max_attempts {
                if let Some((strategy, recovery)) = self.fallbacks.attempt(&error).await {
                    self.resolve(&logged, &strategy).await;
                    return Ok(Outcome::Recovered(recovery));
                }
                return Err(error);
            }

            let delay = policy.delay_for_attempt(attempt);
            info!(operation = operation_name, attempt, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recovery::fallback::{ConfigOverride, Recovery};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    fn create_handler() -> (ErrorHandler, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = Arc::new(ErrorLog::new(temp_dir.path().join("errors.json"), 100));
        (ErrorHandler::new(Some(log), FallbackRegistry::new()), temp_dir)
    }

    #[tokio::test]
    async fn test_non_retryable_runs_once() {
        let (handler, _temp) = create_handler();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: BackupResult<Outcome<()>> = handler
            .execute_with_retry(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BackupError::disk_space("full"))
                },
                "check_disk",
                &ErrorContext::new(),
                &fast_policy(3),
            )
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::DiskSpace);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retryable_succeeds_on_second_attempt() {
        let (handler, _temp) = create_handler();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result = handler
            .execute_with_retry(
                move || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Err(BackupError::connection("refused"))
                    } else {
                        Ok(n)
                    }
                },
                "dump",
                &ErrorContext::new(),
                &fast_policy(2),
            )
            .await
            .unwrap();

        assert_eq!(result, Outcome::Completed(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let entries = handler.error_log().unwrap().read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].resolved);
        assert_eq!(entries[0].resolution_strategy.as_deref(), Some(RETRY_RESOLUTION));
        assert_eq!(entries[0].operation.as_deref(), Some("dump"));
    }

    #[tokio::test]
    async fn test_retryable_exhausts_attempts() {
        let (handler, _temp) = create_handler();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: BackupResult<Outcome<()>> = handler
            .execute_with_retry(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(BackupError::timeout("slow"))
                },
                "dump",
                &ErrorContext::new(),
                &fast_policy(3),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let entries = handler.error_log().unwrap().read_all().await.unwrap();
        assert_eq!(entries.iter().map(|e| e.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_raw_errors_are_normalized() {
        let (handler, _temp) = create_handler();

        let result: BackupResult<Outcome<()>> = handler
            .execute_with_retry(
                || async { Err::<(), _>(anyhow::anyhow!("EACCES: permission denied")) },
                "write",
                &ErrorContext::new(),
                &fast_policy(3),
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Permission);
        assert_eq!(err.context["operation"], "write");
    }

    #[tokio::test]
    async fn test_fallback_recovers_after_exhaustion() {
        let (handler, _temp) = create_handler();
        handler.register_fallback(
            ErrorKind::Compression,
            FallbackStrategy::override_with(
                "Retry without compression",
                ConfigOverride {
                    compress: Some(false),
                    ..ConfigOverride::default()
                },
            ),
        );

        let result: Outcome<()> = handler
            .execute_with_retry(
                || async { Err::<(), _>(BackupError::compression("zlib")) },
                "compress",
                &ErrorContext::new(),
                &fast_policy(3),
            )
            .await
            .unwrap();

        match result {
            Outcome::Recovered(Recovery::RetryWith(overrides)) => {
                assert_eq!(overrides.compress, Some(false))
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let entries = handler.error_log().unwrap().read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].resolution_strategy.as_deref(),
            Some("Retry without compression")
        );
    }

    #[tokio::test]
    async fn test_runs_without_error_log() {
        let handler = ErrorHandler::new(None, FallbackRegistry::new());
        let result = handler
            .execute_with_retry(
                || async { Ok::<_, BackupError>(7) },
                "noop",
                &ErrorContext::new(),
                &fast_policy(1),
            )
            .await
            .unwrap();
        assert_eq!(result, Outcome::Completed(7));
    }
}
