//! One source document and its line index.

use livepatch_common::ContentHash;
use std::path::PathBuf;

/// A source file loaded into the live session.
///
/// Keeps the start offset of every line so that group metadata offsets turn
/// into line numbers by binary search.
pub struct SourceFile {
    /// Filesystem path, or a synthetic name for in-memory sources.
    pub path: PathBuf,
    /// Full text.
    pub content: String,
    line_starts: Vec<u32>,
    /// Hash of `content`.
    pub content_hash: ContentHash,
}

impl SourceFile {
    /// Creates a `SourceFile` and indexes its lines.
    pub fn new(path: PathBuf, content: String) -> Self {
        Self {
            path,
            line_starts: line_starts(&content),
            content_hash: ContentHash::from_bytes(content.as_bytes()),
            content,
        }
    }

    /// Converts a byte offset into a 1-indexed line number.
    ///
    /// Offsets past the end of the file resolve to the last line.
    pub fn line_of(&self, byte_offset: u32) -> u32 {
        // line_starts[0] is 0, so at least one start is <= any offset.
        self.line_starts.partition_point(|&start| start <= byte_offset) as u32
    }

    /// Returns the number of lines in the file.
    ///
    /// A trailing newline starts a final empty line, as editors display it.
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Replaces the text. Returns `false` if it was already identical.
    pub fn set_content(&mut self, content: String) -> bool {
        let hash = ContentHash::from_bytes(content.as_bytes());
        if hash == self.content_hash {
            return false;
        }
        self.line_starts = line_starts(&content);
        self.content_hash = hash;
        self.content = content;
        true
    }
}

fn line_starts(content: &str) -> Vec<u32> {
    std::iter::once(0)
        .chain(
            content
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| (i + 1) as u32),
        )
        .collect()
}
