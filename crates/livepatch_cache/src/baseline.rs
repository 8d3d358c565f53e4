//! Baseline class providers.
//!
//! The baseline is the version of a class the device is currently running.
//! Before a class has been compiled in the session, its baseline comes from
//! the deployed build rather than from the [`ClassCache`](crate::ClassCache).

use std::path::{Path, PathBuf};

use livepatch_classfile::{ClassModel, ParseOptions};

use crate::error::CacheError;

/// Supplies the deployed version of a class.
///
/// Lookups must not block and must treat every failure as a miss.
pub trait BaselineProvider: Send + Sync {
    /// Returns the deployed model of `class_name`, compiled from `source`.
    fn get_class(&self, source: &Path, class_name: &str) -> Option<ClassModel>;
}

/// A provider with no baseline at all; every class counts as new.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBaseline;

impl BaselineProvider for NoBaseline {
    fn get_class(&self, _source: &Path, _class_name: &str) -> Option<ClassModel> {
        None
    }
}

/// Reads baseline classes from a directory laid out by package,
/// `<root>/com/example/MainKt.class`.
#[derive(Debug, Clone)]
pub struct DirBaseline {
    root: PathBuf,
    options: ParseOptions,
}

impl DirBaseline {
    /// Creates a provider over `root` with default parse options.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_options(root, ParseOptions::default())
    }

    /// Creates a provider that parses with `options`.
    pub fn with_options(root: impl Into<PathBuf>, options: ParseOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// The directory classes are read from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the class file for an internal name.
    pub fn class_path(&self, class_name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in class_name.split('/') {
            path.push(segment);
        }
        path.set_extension("class");
        path
    }

    /// Reads and parses one class, distinguishing a miss from a failure.
    pub fn load(&self, class_name: &str) -> Result<Option<ClassModel>, CacheError> {
        let path = self.class_path(class_name);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        ClassModel::parse_with(&bytes, &self.options)
            .map(Some)
            .map_err(|source| CacheError::Malformed { path, source })
    }
}

impl BaselineProvider for DirBaseline {
    fn get_class(&self, source: &Path, class_name: &str) -> Option<ClassModel> {
        match self.load(class_name) {
            Ok(Some(model)) => Some(model),
            Ok(None) => {
                tracing::debug!(class = class_name, source = %source.display(), "no baseline class");
                None
            }
            Err(err) => {
                tracing::warn!(class = class_name, error = %err, "ignoring unreadable baseline class");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepatch_classfile::ClassWriter;

    fn write_class(root: &Path, name: &str) {
        let path = DirBaseline::new(root).class_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, ClassWriter::new(name, Some("java/lang/Object")).finish()).unwrap();
    }

    #[test]
    fn class_path_follows_packages() {
        let baseline = DirBaseline::new("/deployed");
        assert_eq!(
            baseline.class_path("com/example/MainKt$lambda$1"),
            Path::new("/deployed/com/example/MainKt$lambda$1.class")
        );
    }

    #[test]
    fn loads_existing_class() {
        let dir = tempfile::tempdir().unwrap();
        write_class(dir.path(), "com/example/MainKt");
        let baseline = DirBaseline::new(dir.path());
        let model = baseline
            .get_class(Path::new("Main.kt"), "com/example/MainKt")
            .unwrap();
        assert_eq!(model.name, "com/example/MainKt");
    }

    #[test]
    fn missing_class_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = DirBaseline::new(dir.path());
        assert!(baseline.load("a/Missing").unwrap().is_none());
        assert!(baseline.get_class(Path::new("A.kt"), "a/Missing").is_none());
    }

    #[test]
    fn malformed_class_is_an_error_but_a_lookup_miss() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = DirBaseline::new(dir.path());
        let path = baseline.class_path("Broken");
        std::fs::write(&path, b"not a class").unwrap();
        assert!(matches!(
            baseline.load("Broken"),
            Err(CacheError::Malformed { .. })
        ));
        assert!(baseline.get_class(Path::new("B.kt"), "Broken").is_none());
    }

    #[test]
    fn no_baseline_always_misses() {
        assert!(NoBaseline.get_class(Path::new("A.kt"), "a/A").is_none());
    }
}
