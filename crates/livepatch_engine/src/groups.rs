//! Recomposition groups and the selection of the group a change belongs to.
//!
//! The UI compiler emits a key-meta class per source file listing every
//! restartable group with its key and source byte range. A changed method is
//! mapped to the tightest group whose line range covers all of its lines;
//! invalidating that group re-runs exactly the code that changed.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::path::Path;

use livepatch_classfile::{Annotation, ClassModel, ElementValue, MethodModel};
use livepatch_config::{GroupsConfig, DEFAULT_KEY_META_CLASS, DEFAULT_KEY_META_METHOD};
use livepatch_source::SourceLines;
use serde::Serialize;

/// One restartable group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposeGroup {
    /// Group key as known to the runtime.
    pub key: i32,
    /// 1-indexed source lines covered by the group, both ends inclusive.
    pub lines: RangeInclusive<u32>,
}

impl ComposeGroup {
    /// Creates a group covering `first..=last`.
    pub fn new(key: i32, first: u32, last: u32) -> Self {
        Self {
            key,
            lines: first..=last,
        }
    }

    /// Returns `true` if `first..=last` lies inside the group.
    pub fn covers(&self, first: u32, last: u32) -> bool {
        *self.lines.start() <= first && last <= *self.lines.end()
    }

    fn span(&self) -> u32 {
        self.lines.end().saturating_sub(*self.lines.start())
    }
}

/// Reads group metadata from key-meta classes.
#[derive(Debug, Clone)]
pub struct GroupExtractor {
    class_annotation: String,
    method_annotation: String,
}

impl Default for GroupExtractor {
    fn default() -> Self {
        Self {
            class_annotation: DEFAULT_KEY_META_CLASS.to_string(),
            method_annotation: DEFAULT_KEY_META_METHOD.to_string(),
        }
    }
}

impl GroupExtractor {
    /// Creates an extractor for the configured annotation descriptors.
    pub fn from_config(config: &GroupsConfig) -> Self {
        Self {
            class_annotation: config.key_meta_annotation.clone(),
            method_annotation: config.method_key_annotation.clone(),
        }
    }

    /// Returns `true` if `model` is a key-meta class.
    ///
    /// Key-meta classes carry metadata only and are never shipped.
    pub fn is_key_meta_class(&self, model: &ClassModel) -> bool {
        model.annotation(&self.class_annotation).is_some()
    }

    /// Extracts the groups of `source`.
    ///
    /// Returns an empty list when there is no key-meta class. Groups whose
    /// offsets cannot be mapped to lines are dropped.
    pub fn extract(
        &self,
        key_meta: Option<&ClassModel>,
        source: &Path,
        lines: &dyn SourceLines,
    ) -> Vec<ComposeGroup> {
        let Some(model) = key_meta else {
            return Vec::new();
        };
        let Some(annotation) = model.annotation(&self.class_annotation) else {
            return Vec::new();
        };

        if let Some(file) = annotation.element("file").and_then(ElementValue::as_str) {
            let matches = source
                .file_name()
                .is_some_and(|name| name.to_string_lossy() == file);
            if !matches {
                tracing::warn!(
                    class = %model.name,
                    file,
                    source = %source.display(),
                    "key-meta class names a different source file"
                );
            }
        }

        let offsets = match class_offsets(annotation) {
            Some((offsets, declared)) => {
                if offsets.len() != declared {
                    tracing::warn!(
                        class = %model.name,
                        declared,
                        usable = offsets.len(),
                        "key-meta arrays differ in length; extra entries ignored"
                    );
                }
                offsets
            }
            None => model
                .methods
                .iter()
                .filter_map(|m| m.annotation(&self.method_annotation))
                .filter_map(method_offsets)
                .collect(),
        };

        offsets
            .into_iter()
            .filter_map(|(key, start, end)| to_group(key, start, end, source, lines))
            .collect()
    }
}

type Offsets = (i32, i32, i32);

/// Returns the zipped class-level arrays and the number of declared keys.
fn class_offsets(annotation: &Annotation) -> Option<(Vec<Offsets>, usize)> {
    let keys = annotation.element("key")?.as_int_array()?;
    let declared = keys.len();
    let array = |name: &str| {
        annotation
            .element(name)
            .and_then(ElementValue::as_int_array)
            .unwrap_or_default()
    };
    let offsets = keys
        .into_iter()
        .zip(array("startOffset"))
        .zip(array("endOffset"))
        .map(|((key, start), end)| (key, start, end))
        .collect();
    Some((offsets, declared))
}

fn method_offsets(annotation: &Annotation) -> Option<Offsets> {
    let value = |name: &str| annotation.element(name).and_then(ElementValue::as_int);
    Some((value("key")?, value("startOffset")?, value("endOffset")?))
}

/// End offsets are exclusive; an empty range maps to its start line.
fn to_group(
    key: i32,
    start: i32,
    end: i32,
    source: &Path,
    lines: &dyn SourceLines,
) -> Option<ComposeGroup> {
    let start = u32::try_from(start).ok()?;
    let end = u32::try_from(end).ok()?;
    let last_byte = if end > start { end - 1 } else { start };
    let first = lines.line_of(source, start)?;
    let last = lines.line_of(source, last_byte)?;
    Some(ComposeGroup::new(key, first, last.max(first)))
}

/// Outcome of mapping a change to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// The tightest group covering the change.
    Group(&'a ComposeGroup),
    /// The change has no line inside the source file, so it cannot be placed.
    Unplaced,
    /// The change has lines, but no group covers all of them.
    Uncovered,
}

impl<'a> Selection<'a> {
    /// The selected group, if any.
    pub fn group(self) -> Option<&'a ComposeGroup> {
        match self {
            Selection::Group(group) => Some(group),
            Selection::Unplaced | Selection::Uncovered => None,
        }
    }
}

/// Picks the tightest group covering every line in `lines`.
///
/// Line 0 and lines past `line_count` come from generated or inlined code and
/// are ignored. Ties go to the group declared first.
pub fn select_for_lines<'a>(
    groups: &'a [ComposeGroup],
    lines: &BTreeSet<u32>,
    line_count: Option<u32>,
) -> Selection<'a> {
    let mut usable = lines
        .iter()
        .copied()
        .filter(|&line| line > 0 && line_count.map_or(true, |count| line <= count));
    let Some(first) = usable.next() else {
        return Selection::Unplaced;
    };
    let last = usable.last().unwrap_or(first);
    groups
        .iter()
        .filter(|g| g.covers(first, last))
        .min_by_key(|g| g.span())
        .map_or(Selection::Uncovered, Selection::Group)
}

/// Picks the group of a changed method.
pub fn select<'a>(
    groups: &'a [ComposeGroup],
    method: &MethodModel,
    line_count: Option<u32>,
) -> Selection<'a> {
    select_for_lines(groups, &method.lines, line_count)
}
