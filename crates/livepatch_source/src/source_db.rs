//! Central database of all source files in a live session.

use crate::source_file::SourceFile;
use crate::SourceLines;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// The source database, owning all loaded source text and resolving
/// byte offsets to line numbers for group extraction.
pub struct SourceDb {
    files: Vec<SourceFile>,
    by_path: HashMap<PathBuf, usize>,
}

impl SourceDb {
    /// Creates an empty source database.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    /// Loads a source file from the filesystem.
    ///
    /// Loading a path that is already present replaces its content.
    pub fn load_file(&mut self, path: &Path) -> Result<&SourceFile, io::Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.add_source(path, content))
    }

    /// Adds or replaces a source file from an in-memory string.
    pub fn add_source(&mut self, path: impl Into<PathBuf>, content: String) -> &SourceFile {
        let path = path.into();
        let slot = match self.by_path.get(&path) {
            Some(&slot) => {
                if self.files[slot].set_content(content) {
                    tracing::trace!(path = %path.display(), "source text replaced");
                }
                slot
            }
            None => {
                self.by_path.insert(path.clone(), self.files.len());
                self.files.push(SourceFile::new(path, content));
                self.files.len() - 1
            }
        };
        &self.files[slot]
    }

    /// Looks up a loaded file by path.
    pub fn find(&self, path: &Path) -> Option<&SourceFile> {
        self.by_path.get(path).map(|&slot| &self.files[slot])
    }

    /// Returns the number of loaded files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no files are loaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Default for SourceDb {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceLines for SourceDb {
    fn line_of(&self, source: &Path, byte_offset: u32) -> Option<u32> {
        self.find(source).map(|f| f.line_of(byte_offset))
    }

    fn line_count(&self, source: &Path) -> Option<u32> {
        self.find(source).map(|f| f.line_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find() {
        let mut db = SourceDb::new();
        let file = db.add_source("src/Main.kt", "fun main() {\n}\n".to_string());
        assert_eq!(file.line_count(), 3);
        assert!(db.find(Path::new("src/Main.kt")).is_some());
        assert!(db.find(Path::new("src/Other.kt")).is_none());
    }

    #[test]
    fn re_adding_replaces_content() {
        let mut db = SourceDb::new();
        db.add_source("Main.kt", "one".to_string());
        db.add_source("Main.kt", "one\ntwo".to_string());
        assert_eq!(db.len(), 1);
        assert_eq!(db.line_count(Path::new("Main.kt")), Some(2));
    }

    #[test]
    fn source_lines_impl() {
        let mut db = SourceDb::new();
        db.add_source("Main.kt", "a\nbb\nccc\n".to_string());
        let p = Path::new("Main.kt");
        assert_eq!(db.line_of(p, 0), Some(1));
        assert_eq!(db.line_of(p, 2), Some(2));
        assert_eq!(db.line_of(p, 5), Some(3));
        assert_eq!(db.line_count(p), Some(4));
        assert_eq!(db.line_of(Path::new("Missing.kt"), 0), None);
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.kt");
        std::fs::write(&path, "line1\nline2").unwrap();
        let mut db = SourceDb::new();
        assert_eq!(db.load_file(&path).unwrap().line_count(), 2);
    }

    #[test]
    fn load_missing_file_errors() {
        let mut db = SourceDb::new();
        assert!(db.load_file(Path::new("/nonexistent/Main.kt")).is_err());
        assert!(db.is_empty());
    }
}
