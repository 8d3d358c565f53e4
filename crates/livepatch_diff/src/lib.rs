//! Structural comparison of two versions of a class.
//!
//! [`diff`] answers "what changed between the baseline and the freshly
//! compiled class?" at the granularity the live-patch engine decides on:
//! methods (by behavior, ignoring line-table shifts), fields, class
//! annotations and the supertype hierarchy. The result is a conservative
//! superset of the changes, not a minimal edit script.

#![warn(missing_docs)]

use std::collections::{BTreeSet, HashMap};

use livepatch_classfile::{Annotation, ClassModel, FieldModel, MethodModel};
use serde::Serialize;

/// Differences between two versions of one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassDiff {
    /// Internal name of the compared class.
    pub class: String,
    /// Methods present only in the new version.
    pub added_methods: Vec<MethodModel>,
    /// Methods present only in the old version.
    pub removed_methods: Vec<MethodModel>,
    /// Methods present in both versions whose behavior differs.
    pub modified_methods: Vec<ModifiedMethod>,
    /// Fields added, removed or redeclared.
    pub modified_fields: Vec<FieldChange>,
    /// Descriptors of class annotations added, removed or given new values.
    pub modified_annotations: Vec<String>,
    /// Whether the superclass or the set of interfaces changed.
    pub super_type_changed: bool,
    /// Whether the class access flags changed.
    pub access_changed: bool,
}

/// A method whose body or flags changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedMethod {
    /// The baseline version.
    pub old: MethodModel,
    /// The new version.
    pub new: MethodModel,
}

/// A change to a field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldChange {
    /// A field only in the new version.
    Added(FieldModel),
    /// A field only in the old version.
    Removed(FieldModel),
    /// A field whose descriptor, flags or constant value changed.
    Changed {
        /// The baseline declaration.
        old: FieldModel,
        /// The new declaration.
        new: FieldModel,
    },
}

impl FieldChange {
    /// Name of the affected field.
    pub fn name(&self) -> &str {
        match self {
            FieldChange::Added(f) | FieldChange::Removed(f) => &f.name,
            FieldChange::Changed { new, .. } => &new.name,
        }
    }
}

impl ClassDiff {
    /// Returns `true` if nothing differs.
    pub fn is_empty(&self) -> bool {
        self.added_methods.is_empty()
            && self.removed_methods.is_empty()
            && self.modified_methods.is_empty()
            && self.modified_fields.is_empty()
            && self.modified_annotations.is_empty()
            && !self.super_type_changed
            && !self.access_changed
    }
}

/// Compares two versions of a class.
///
/// Returns `None` when they are equivalent. Classes with identical bytes
/// short-circuit on their content hashes. `diff(a, a)` is always `None`, and
/// `diff(a, b)` is `None` exactly when `diff(b, a)` is.
pub fn diff(old: &ClassModel, new: &ClassModel) -> Option<ClassDiff> {
    if old.content_hash == new.content_hash {
        tracing::trace!(class = %new.name, "identical class bytes");
        return None;
    }

    let (added_methods, removed_methods, modified_methods) = diff_methods(old, new);
    let result = ClassDiff {
        class: new.name.clone(),
        added_methods,
        removed_methods,
        modified_methods,
        modified_fields: diff_fields(&old.fields, &new.fields),
        modified_annotations: diff_annotations(&old.annotations, &new.annotations),
        super_type_changed: old.super_name != new.super_name
            || interface_set(old) != interface_set(new),
        access_changed: old.access != new.access,
    };

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

fn diff_methods(
    old: &ClassModel,
    new: &ClassModel,
) -> (Vec<MethodModel>, Vec<MethodModel>, Vec<ModifiedMethod>) {
    let old_by_sig: HashMap<String, &MethodModel> =
        old.methods.iter().map(|m| (m.signature(), m)).collect();
    let new_sigs: BTreeSet<String> = new.methods.iter().map(MethodModel::signature).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for method in &new.methods {
        match old_by_sig.get(&method.signature()) {
            None => added.push(method.clone()),
            Some(previous) if !previous.same_behavior(method) => modified.push(ModifiedMethod {
                old: (*previous).clone(),
                new: method.clone(),
            }),
            Some(_) => {}
        }
    }
    let removed = old
        .methods
        .iter()
        .filter(|m| !new_sigs.contains(&m.signature()))
        .cloned()
        .collect();
    (added, removed, modified)
}

fn diff_fields(old: &[FieldModel], new: &[FieldModel]) -> Vec<FieldChange> {
    let old_by_name: HashMap<&str, &FieldModel> =
        old.iter().map(|f| (f.name.as_str(), f)).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|f| f.name.as_str()).collect();

    let mut changes = Vec::new();
    for field in new {
        match old_by_name.get(field.name.as_str()) {
            None => changes.push(FieldChange::Added(field.clone())),
            Some(previous) if *previous != field => changes.push(FieldChange::Changed {
                old: (*previous).clone(),
                new: field.clone(),
            }),
            Some(_) => {}
        }
    }
    for field in old {
        if !new_names.contains(field.name.as_str()) {
            changes.push(FieldChange::Removed(field.clone()));
        }
    }
    changes
}

fn diff_annotations(old: &[Annotation], new: &[Annotation]) -> Vec<String> {
    let descriptors: BTreeSet<&str> = old
        .iter()
        .chain(new.iter())
        .map(|a| a.descriptor.as_str())
        .collect();
    descriptors
        .into_iter()
        .filter(|d| {
            let before: Vec<&Annotation> = old.iter().filter(|a| a.descriptor == *d).collect();
            let after: Vec<&Annotation> = new.iter().filter(|a| a.descriptor == *d).collect();
            before != after
        })
        .map(str::to_string)
        .collect()
}

fn interface_set(model: &ClassModel) -> BTreeSet<&str> {
    model.interfaces.iter().map(String::as_str).collect()
}
