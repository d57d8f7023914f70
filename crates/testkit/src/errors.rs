//! Test fixtures for shared error codes and envelopes.

use switch_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope};

/// Return a list of common error codes used in tests.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::not_found(),
        ErrorCode::timeout(),
        ErrorCode::io(),
        ErrorCode::internal(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// A retriable timeout error fixture.
pub fn timeout_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
}

/// The error a fake connector returns when the server is unreachable.
pub fn connect_refused_error() -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("remote", "connect_failed"),
        "connection refused",
        ErrorClass::Retriable,
    )
}

/// A protocol failure raised by a fake session for `operation` on `path`.
pub fn protocol_error(code: &'static str, operation: &'static str, path: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected_with_class(
        ErrorCode::new("remote", code),
        format!("fake {operation} failed for {path}"),
        ErrorClass::Retriable,
    )
    .with_metadata("operation", operation)
    .with_metadata("remotePath", path)
}
