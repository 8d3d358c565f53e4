//! Common result and error types for livepatch.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates a bug in livepatch itself, not a user-facing condition.
/// Rejected edits and compiler diagnostics have their own error types in
/// the engine crate.
pub type LiveResult<T> = Result<T, InternalError>;

/// An internal error indicating a broken invariant inside livepatch.
#[derive(Debug, thiserror::Error)]
#[error("internal livepatch error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("cache entry without model");
        assert_eq!(
            format!("{err}"),
            "internal livepatch error: cache entry without model"
        );
    }

    #[test]
    fn err_path() {
        let r: LiveResult<i32> = Err(InternalError::new("boom"));
        assert_eq!(r.unwrap_err().message, "boom");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
