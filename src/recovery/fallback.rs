//! Fallback strategies attempted once retries for an error kind are exhausted
//!
//! A strategy either resolves the underlying condition outright or hands the
//! caller a [`ConfigOverride`] to re-run the original operation with.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::error::{BackupError, BackupResult, ErrorKind};

/// Configuration adjustments suggested by a fallback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverride {
    /// Force compression on or off
    pub compress: Option<bool>,
    /// Write into this directory instead
    pub directory: Option<PathBuf>,
    /// Allow the dump utility this much time
    pub dump_timeout: Option<Duration>,
}

impl ConfigOverride {
    pub fn is_empty(&self) -> bool {
        self.compress.is_none() && self.directory.is_none() && self.dump_timeout.is_none()
    }
}

/// What a successful fallback achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// The condition was fixed; nothing else is required
    Resolved,
    /// The original operation should be re-run with these overrides
    RetryWith(ConfigOverride),
}

/// Result of an operation run through the retry executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation itself returned a value
    Completed(T),
    /// The operation failed but a fallback recovered
    Recovered(Recovery),
}

impl<T> Outcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Recovered(_) => None,
        }
    }
}

/// Async recovery action; receives the error that triggered it
pub type FallbackAction =
    Arc<dyn Fn(BackupError) -> BoxFuture<'static, BackupResult<Recovery>> + Send + Sync>;

/// A registered recovery action with a human description
#[derive(Clone)]
pub struct FallbackStrategy {
    pub description: String,
    action: FallbackAction,
}

impl FallbackStrategy {
    pub fn new<F, Fut>(description: impl Into<String>, action: F) -> Self
    where
        F: Fn(BackupError) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = BackupResult<Recovery>> + Send + 'static,
    {
        let action: FallbackAction = Arc::new(move |err| Box::pin(action(err)));
        Self {
            description: description.into(),
            action,
        }
    }

    /// A strategy that always answers with the same override
    pub fn override_with(description: impl Into<String>, overrides: ConfigOverride) -> Self {
        Self::new(description, move |_| {
            let overrides = overrides.clone();
            async move { Ok(Recovery::RetryWith(overrides)) }
        })
    }
}

impl std::fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackStrategy")
            .field("description", &self.description)
            .finish()
    }
}

/// Lookup table of fallback strategies keyed by error kind
#[derive(Default)]
pub struct FallbackRegistry {
    strategies: RwLock<HashMap<ErrorKind, Vec<FallbackStrategy>>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the override-only strategies
    ///
    /// Disk-space recovery needs access to stored backups and is registered
    /// by the backup service.
    pub fn with_defaults(alternate_directory: PathBuf, extended_timeout: Duration) -> Self {
        let registry = Self::new();
        registry.register(
            ErrorKind::Compression,
            FallbackStrategy::override_with(
                "Retry without compression",
                ConfigOverride {
                    compress: Some(false),
                    ..ConfigOverride::default()
                },
            ),
        );
        registry.register(
            ErrorKind::Permission,
            FallbackStrategy::override_with(
                "Retry against alternate directory",
                ConfigOverride {
                    directory: Some(alternate_directory),
                    ..ConfigOverride::default()
                },
            ),
        );
        registry.register(
            ErrorKind::Connection,
            FallbackStrategy::override_with(
                "Retry with a longer timeout",
                ConfigOverride {
                    dump_timeout: Some(extended_timeout),
                    ..ConfigOverride::default()
                },
            ),
        );
        registry
    }

    /// Add a strategy for a kind; strategies run in registration order
    pub fn register(&self, kind: ErrorKind, strategy: FallbackStrategy) {
        let mut strategies = self.strategies.write().unwrap_or_else(|e| e.into_inner());
        debug!(kind = %kind, description = %strategy.description, "registered fallback");
        strategies.entry(kind).or_default().push(strategy);
    }

    pub fn strategies_for(&self, kind: ErrorKind) -> Vec<FallbackStrategy> {
        let strategies = self.strategies.read().unwrap_or_else(|e| e.into_inner());
        strategies.get(&kind).cloned().unwrap_or_default()
    }

    /// Run the strategies for the error's kind until one completes without
    /// failing. Returns the winning strategy's description and its recovery.
    pub async fn attempt(&self, error: &BackupError) -> Option<(String, Recovery)> {
        for strategy in self.strategies_for(error.kind) {
            match (strategy.action)(error.clone()).await {
                Ok(recovery) => {
                    info!(
                        kind = %error.kind,
                        strategy = %strategy.description,
                        "fallback strategy recovered"
                    );
                    return Some((strategy.description, recovery));
                }
                Err(fallback_err) => {
                    warn!(
                        kind = %error.kind,
                        strategy = %strategy.description,
                        error = %fallback_err,
                        "fallback strategy failed"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_compression_fallback() {
        let registry = FallbackRegistry::with_defaults(
            PathBuf::from("/tmp/alt"),
            Duration::from_secs(3600),
        );

        let (description, recovery) = registry
            .attempt(&BackupError::compression("gzip failed"))
            .await
            .unwrap();
        assert_eq!(description, "Retry without compression");
        assert_eq!(
            recovery,
            Recovery::RetryWith(ConfigOverride {
                compress: Some(false),
                ..ConfigOverride::default()
            })
        );
    }

    #[tokio::test]
    async fn test_no_strategy_for_kind() {
        let registry = FallbackRegistry::with_defaults(
            PathBuf::from("/tmp/alt"),
            Duration::from_secs(3600),
        );
        assert!(registry
            .attempt(&BackupError::corruption("bad bytes"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_failing_strategy_falls_through_to_next() {
        let registry = FallbackRegistry::new();
        registry.register(
            ErrorKind::DiskSpace,
            FallbackStrategy::new("always fails", |err| async move { Err(err) }),
        );
        registry.register(
            ErrorKind::DiskSpace,
            FallbackStrategy::new("frees space", |_| async { Ok(Recovery::Resolved) }),
        );

        let (description, recovery) = registry
            .attempt(&BackupError::disk_space("full"))
            .await
            .unwrap();
        assert_eq!(description, "frees space");
        assert_eq!(recovery, Recovery::Resolved);
    }
}
