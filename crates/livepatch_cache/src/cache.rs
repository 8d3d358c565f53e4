//! The session class cache.

use std::collections::HashMap;

use livepatch_classfile::ClassModel;

/// Last accepted model of every class compiled during one live session.
///
/// Entries are only ever inserted or overwritten; the cache is emptied as a
/// whole by [`clear`](Self::clear) when the session is reset. The cache does
/// no locking of its own: it is owned by the session, and only the pass
/// holding the global compile lock writes to it.
#[derive(Debug, Default)]
pub struct ClassCache {
    entries: HashMap<String, ClassModel>,
}

impl ClassCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached model of `class_name`.
    pub fn get(&self, class_name: &str) -> Option<&ClassModel> {
        self.entries.get(class_name)
    }

    /// Returns `true` if `class_name` has been accepted in this session.
    pub fn contains(&self, class_name: &str) -> bool {
        self.entries.contains_key(class_name)
    }

    /// Inserts or overwrites one model, returning the previous one.
    pub fn insert(&mut self, model: ClassModel) -> Option<ClassModel> {
        self.entries.insert(model.name.clone(), model)
    }

    /// Stores every model of an accepted pass.
    ///
    /// Callers must have validated all of them first; this is the only
    /// mutation a pass performs.
    pub fn commit(&mut self, models: impl IntoIterator<Item = ClassModel>) {
        for model in models {
            self.insert(model);
        }
    }

    /// Number of cached classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached class names, sorted.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
