//! Error types for baseline lookups.

use std::path::PathBuf;

use livepatch_classfile::ClassFileError;

/// Errors that can occur while reading baseline class files.
///
/// [`BaselineProvider`](crate::BaselineProvider) lookups are fail-safe and
/// turn these into misses; [`DirBaseline::load`](crate::DirBaseline::load)
/// reports them for callers that want to know why.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading a class file.
    #[error("baseline I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A baseline class file could not be parsed.
    #[error("malformed baseline class {path}: {source}")]
    Malformed {
        /// The class file path.
        path: PathBuf,
        /// The parse failure.
        source: ClassFileError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_io() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/a/B.class"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = format!("{err}");
        assert!(msg.contains("/tmp/a/B.class"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn display_malformed() {
        let err = CacheError::Malformed {
            path: PathBuf::from("a/B.class"),
            source: ClassFileError::BadMagic { found: 0 },
        };
        assert_eq!(
            format!("{err}"),
            "malformed baseline class a/B.class: bad magic number 0x00000000"
        );
    }
}
