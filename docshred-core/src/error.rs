//! Error kinds for the schema inference / shredding / materialization pipeline.
//!
//! Mirrors the thiserror idiom used by `polars-jsonschema-bridge::ConversionError`
//! in the wider workspace, rather than hand-rolled `Result<T, String>` plumbing.

use std::thread;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Top-level error type. Per-document failures are modeled separately as
/// [`RejectionReason`] and never surface here — only store/storage/warehouse/
/// configuration failures propagate as an `Error`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("schema store error: {0}")]
    Store(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("retries exceeded ({attempts} times) calling {operation}: {source}")]
    RetriesExceeded {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a single document was rejected. Never escapes as a top-level `Error` —
/// the orchestrator tallies these and writes them to the reject file (§7).
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Document is not valid JSON.
    ParseError(String),
    /// A required field was missing, or the shard key was invalid.
    PolicyRejection(String),
    /// A value could not be coerced to its resolved schema type.
    TypeCoercionFailure(String),
    /// An observation at a path disagreed in shape with the resolved schema.
    SchemaConflict(String),
}

impl RejectionReason {
    pub fn message(&self) -> &str {
        match self {
            RejectionReason::ParseError(m)
            | RejectionReason::PolicyRejection(m)
            | RejectionReason::TypeCoercionFailure(m)
            | RejectionReason::SchemaConflict(m) => m,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Retry `f` with capped exponential backoff: `2^n` seconds plus jitter, up to
/// [`MAX_RETRY_ATTEMPTS`] attempts, per §5/§7. Ported from `onefold_util.execute`'s
/// `retry=True` path (base 2^n seconds + `random.randint(0, 1000) / 1000`).
pub fn with_retry<T>(operation: &str, f: impl FnMut() -> Result<T>) -> Result<T> {
    with_retry_config(operation, MAX_RETRY_ATTEMPTS, Duration::from_secs(1), f)
}

/// Same as [`with_retry`] but with an overridable attempt count and base
/// backoff unit (production call sites use `with_retry`; tests use a smaller
/// base to stay fast).
pub fn with_retry_config<T>(
    operation: &str,
    max_attempts: u32,
    base: Duration,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let mut last_err = None;
    for attempt in 0..max_attempts {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(operation, attempt, error = %e, "retryable operation failed");
                let jitter_ms: u64 = rand::thread_rng().gen_range(0..1000);
                let backoff = base * 2u32.saturating_pow(attempt) + Duration::from_millis(jitter_ms);
                last_err = Some(e);
                if attempt + 1 < max_attempts {
                    thread::sleep(backoff);
                }
            }
        }
    }
    Err(Error::RetriesExceeded {
        operation: operation.to_string(),
        attempts: max_attempts,
        source: Box::new(last_err.expect("at least one attempt runs")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn with_retry_succeeds_first_try() {
        let result: Result<i32> = with_retry("noop", || Ok(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn with_retry_eventually_succeeds() {
        let calls = RefCell::new(0);
        let result: Result<i32> = with_retry_config(
            "flaky",
            MAX_RETRY_ATTEMPTS,
            Duration::from_millis(1),
            || {
                *calls.borrow_mut() += 1;
                if *calls.borrow() < 3 {
                    Err(Error::Storage("transient".into()))
                } else {
                    Ok(7)
                }
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(*calls.borrow(), 3);
    }

    #[test]
    fn with_retry_exhausts_and_fails() {
        let result: Result<i32> = with_retry_config(
            "always-fails",
            MAX_RETRY_ATTEMPTS,
            Duration::from_millis(1),
            || Err(Error::Storage("nope".into())),
        );
        match result {
            Err(Error::RetriesExceeded { attempts, .. }) => assert_eq!(attempts, MAX_RETRY_ATTEMPTS),
            other => panic!("expected RetriesExceeded, got {other:?}"),
        }
    }
}
