//! Pass failures.

use std::fmt;
use std::path::PathBuf;

use livepatch_classfile::ClassFileError;
use livepatch_common::InternalError;
use serde::Serialize;

/// The front-end compiler rejected the edited source.
///
/// Diagnostics are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("compilation of {} failed:\n{}", .source_file.display(), .diagnostics.join("\n"))]
pub struct CompilerDiagnosticError {
    /// The source file being compiled.
    pub source_file: PathBuf,
    /// Compiler messages, one per diagnostic.
    pub diagnostics: Vec<String>,
}

/// Why an edit cannot be hot-patched.
///
/// Every reason has a stable code so tools can tell them apart without
/// parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// A new class that is not compiler-generated support code.
    AddedClass,
    /// A non-private inline function body changed; callers in other files
    /// still hold the old inlined copy.
    ModifiedInlineFunction {
        /// `name + descriptor` of the method.
        method: String,
    },
    /// A constructor of a user class changed.
    ModifiedConstructor {
        /// `name + descriptor` of the constructor.
        method: String,
    },
    /// The static initializer of a user class changed.
    ModifiedStaticInitializer,
    /// An enum-switch mapping table changed; it is filled by a static
    /// initializer that will not run again.
    ModifiedEnumMapping,
}

impl RejectReason {
    /// Stable code of the reason.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::AddedClass => "LP001",
            RejectReason::ModifiedInlineFunction { .. } => "LP002",
            RejectReason::ModifiedConstructor { .. } => "LP003",
            RejectReason::ModifiedStaticInitializer => "LP004",
            RejectReason::ModifiedEnumMapping => "LP005",
        }
    }

    /// User-facing description.
    pub fn message(&self) -> String {
        match self {
            RejectReason::AddedClass => "added new user-visible class unsupported".to_string(),
            RejectReason::ModifiedInlineFunction { method } => {
                format!("modified non-private inline function {method}")
            }
            RejectReason::ModifiedConstructor { method } => {
                format!("modified constructor {method}")
            }
            RejectReason::ModifiedStaticInitializer => {
                "modified static initializer".to_string()
            }
            RejectReason::ModifiedEnumMapping => "modified enum-switch mapping".to_string(),
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message())
    }
}

/// An edit the engine refuses to hot-patch.
///
/// This is a recoverable, user-facing condition: the session stays usable and
/// later edits are processed normally. Applying this one needs a full rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{class}: {reason}")]
pub struct RejectedEdit {
    /// Internal name of the offending class.
    pub class: String,
    /// What is wrong with the edit.
    pub reason: RejectReason,
}

impl RejectedEdit {
    /// Creates a rejection.
    pub fn new(class: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            class: class.into(),
            reason,
        }
    }
}

/// Why a pass produced no output.
///
/// Every variant leaves the session's class cache untouched.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// The front-end compiler failed.
    #[error(transparent)]
    Compiler(#[from] CompilerDiagnosticError),

    /// The compiler produced an unparsable class file.
    #[error("compiler produced a malformed class file {class}: {source}")]
    MalformedClass {
        /// Output path or name of the class.
        class: String,
        /// The parse failure.
        source: ClassFileError,
    },

    /// The edit cannot be hot-patched.
    #[error("edit rejected: {0}")]
    Rejected(#[from] RejectedEdit),

    /// A concurrent source mutation interrupted the pass.
    #[error("pass cancelled by a concurrent edit")]
    Cancelled,

    /// An invariant of the engine was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl PassError {
    /// Returns `true` for outcomes the user can act on without a bug report.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, PassError::Compiler(_) | PassError::Rejected(_))
    }
}
