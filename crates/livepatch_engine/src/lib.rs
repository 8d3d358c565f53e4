//! The incremental compile-and-diff engine behind live patching.
//!
//! A pass recompiles the edited source files through a [`FrontEndCompiler`],
//! compares every produced class against the last accepted or deployed
//! version, classifies and validates the changes, and decides how the running
//! program has to pick them up:
//!
//! 1. [`classify`] sorts classes into user-visible and compiler-generated
//!    support classes.
//! 2. [`validate`] rejects edits that cannot be hot-patched.
//! 3. [`groups`] maps changed methods to invalidation groups.
//! 4. [`output`] folds everything into a [`CompileOutput`].
//!
//! [`LiveSession`] ties the steps together under the concurrency rules of
//! [`scheduler`].

#![warn(missing_docs)]

pub mod classify;
pub mod error;
pub mod groups;
pub mod output;
pub mod scheduler;
pub mod session;
pub mod validate;

pub use classify::{ChangeClassifier, ClassKind, Classification, SupportRule};
pub use error::{CompilerDiagnosticError, PassError, RejectReason, RejectedEdit};
pub use groups::{select, select_for_lines, ComposeGroup, GroupExtractor, Selection};
pub use output::{CompileOutput, CompileOutputBuilder, InvalidateMode, OutputClass};
pub use scheduler::{
    Checkpoint, CompileScheduler, InvocationPolicy, ModificationTracker, ReadToken,
};
pub use session::{CompileRequest, CompiledClass, FrontEndCompiler, LiveSession};
pub use validate::validate;

pub use livepatch_cache::{BaselineProvider, ClassCache, DirBaseline, NoBaseline};
pub use livepatch_source::SourceLines;
