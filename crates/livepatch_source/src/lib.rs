//! Source text management and offset-to-line mapping.
//!
//! The [`SourceDb`] owns the text of every source file taking part in a live
//! session and answers the two questions the engine asks about source text:
//! which line a byte offset falls on, and how many lines a file has. Both are
//! exposed through the [`SourceLines`] trait so that editor integrations can
//! supply their own document model instead.

#![warn(missing_docs)]

pub mod source_db;
pub mod source_file;

pub use source_db::SourceDb;
pub use source_file::SourceFile;

use std::path::Path;

/// Line lookups over source documents.
///
/// Lines are 1-indexed, matching conventional editor line numbering.
/// Implementations return `None` for files they do not know about.
pub trait SourceLines: Send + Sync {
    /// Returns the 1-indexed line containing `byte_offset` in `source`.
    fn line_of(&self, source: &Path, byte_offset: u32) -> Option<u32>;

    /// Returns the number of lines in `source`.
    fn line_count(&self, source: &Path) -> Option<u32>;
}
