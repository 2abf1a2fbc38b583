//! Error framework: normalization, retry with backoff, fallbacks and the
//! durable error log
//!
//! # Architecture
//!
//! - `normalize`: turns any failure into a typed [`BackupError`](crate::error::BackupError)
//! - `RetryPolicy`: attempt count, exponential backoff and the retryable set
//! - `FallbackRegistry`: recovery actions keyed by error kind
//! - `ErrorLog`: capped JSON document of handled errors with queries
//! - `ErrorHandler`: the retry executor composing all of the above
//!
//! # Example
//!
//! ```rust,ignore
//! let handler = ErrorHandler::new(Some(error_log), FallbackRegistry::new());
//! let outcome = handler
//!     .execute_with_retry(|| dump(&request), "dump", &ErrorContext::new(), &RetryPolicy::default())
//!     .await?;
//! ```

mod error_log;
mod fallback;
mod handler;
mod normalize;
mod retry;

pub use error_log::{ErrorLog, ErrorLogEntry, ErrorLogFilter, ErrorStats};
pub use fallback::{ConfigOverride, FallbackRegistry, FallbackStrategy, Outcome, Recovery};
pub use handler::{ErrorHandler, RETRY_RESOLUTION};
pub use normalize::{classify_message, normalize_error};
pub use retry::RetryPolicy;
