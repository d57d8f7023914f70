//! Result helpers for shared error handling.

use crate::errors::{ErrorCode, ErrorEnvelope};

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for annotating envelope errors on their way up.
pub trait ResultExt<T> {
    /// Attach a metadata entry to the error, preserving the success value.
    fn with_metadata(self, key: &str, value: impl Into<String>) -> Result<T>;

    /// Replace the error code, preserving message and metadata.
    fn with_code(self, code: ErrorCode) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_metadata(self, key: &str, value: impl Into<String>) -> Result<T> {
        self.map_err(|error| error.with_metadata(key, value))
    }

    fn with_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|error| error.with_code(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_metadata_only_touches_errors() {
        let ok: Result<i32> = Ok(1);
        assert!(matches!(ok.with_metadata("target", "screenshots"), Ok(1)));

        let err: Result<i32> = Err(ErrorEnvelope::expected(ErrorCode::invalid_input(), "bad"));
        let annotated = err.with_metadata("target", "screenshots");
        assert!(matches!(
            annotated,
            Err(ref error) if error.metadata.get("target").map(String::as_str) == Some("screenshots")
        ));
    }

    #[test]
    fn with_code_rewrites_code() {
        let err: Result<()> = Err(ErrorEnvelope::expected(ErrorCode::io(), "bad"));
        let rewritten = err.with_code(ErrorCode::new("store", "mkdir_failed"));
        assert!(matches!(rewritten, Err(ref error) if error.has_code("store", "mkdir_failed")));
    }
}
