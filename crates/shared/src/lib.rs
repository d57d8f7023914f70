//! # switch-sync-shared
//!
//! Shared result types, error handling, and cancellation primitives for the
//! switch-sync workspace.
//!
//! This crate provides foundational types that every other crate uses:
//!
//! - Result and error envelope types
//! - Request context with cooperative cancellation
//! - Cancellation-aware timeouts and sleeps
//! - Bounded numeric wrappers and secret redaction
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - This crate only depends on external crates
//! 2. **Serde-compatible** - Public value types support serialization

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod concurrency;
pub mod errors;
pub mod invariants;
pub mod redaction;
pub mod result;
pub mod timeout;

pub use concurrency::{CancellationToken, CorrelationId, RequestContext};
pub use errors::{
    ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata, UnexpectedError,
    normalize_unexpected_error,
};
pub use invariants::{BoundedU32, BoundedU64, BoundsError};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::{Result, ResultExt};
pub use timeout::{SleepOutcome, sleep_with_context, timeout_with_context};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::errors::{ErrorClass, ErrorCode, ErrorEnvelope};
    use super::result::{Result, ResultExt};

    #[test]
    fn shared_error_types_are_available() {
        let error = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(error.kind, super::errors::ErrorKind::Expected);
        assert_eq!(error.class, ErrorClass::NonRetriable);
    }

    #[test]
    fn shared_result_extension_is_available() {
        let value: Result<i32> = Err(ErrorEnvelope::expected(ErrorCode::not_found(), "gone"));
        let annotated = value.with_metadata("remotePath", "/Nintendo/Album");
        assert!(matches!(
            annotated,
            Err(ref error) if error.metadata.get("remotePath").map(String::as_str) == Some("/Nintendo/Album")
        ));
    }
}
