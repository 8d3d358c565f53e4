//! Assembling the result of a pass.

use std::collections::BTreeSet;

use livepatch_classfile::MethodModel;
use serde::Serialize;

use crate::classify::{is_singleton_container, ClassKind};
use crate::groups::{select, select_for_lines, ComposeGroup, Selection};

/// How the device applies a patch, ordered from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidateMode {
    /// Nothing to apply.
    None,
    /// Swap classes and re-run the listed groups.
    InvalidateGroups,
    /// Swap classes and rebuild the whole UI with saved state.
    SaveAndLoad,
    /// Swap classes and restart the activity.
    RestartActivity,
}

/// One class to ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputClass {
    /// Internal name.
    pub name: String,
    /// Class-file bytes as produced by the compiler.
    pub bytes: Vec<u8>,
    /// Classification of the class.
    pub kind: ClassKind,
}

/// Everything the device needs to apply one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileOutput {
    /// Classes to swap in, in the order they were accepted.
    pub classes: Vec<OutputClass>,
    /// Groups to re-run; empty unless the mode is `InvalidateGroups`.
    pub group_ids_to_invalidate: BTreeSet<i32>,
    /// How to apply the classes.
    pub invalidate_mode: InvalidateMode,
}

impl CompileOutput {
    /// An output that ships nothing.
    pub fn empty() -> Self {
        Self {
            classes: Vec::new(),
            group_ids_to_invalidate: BTreeSet::new(),
            invalidate_mode: InvalidateMode::None,
        }
    }

    /// Returns `true` if the pass ships no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns the shipped class called `name`.
    pub fn class(&self, name: &str) -> Option<&OutputClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// Accumulates shipped classes and the invalidation decision of one pass.
///
/// The mode only ever escalates: once a change forces a more disruptive
/// mode, later changes cannot lower it.
#[derive(Debug)]
pub struct CompileOutputBuilder {
    classes: Vec<OutputClass>,
    group_ids: BTreeSet<i32>,
    mode: InvalidateMode,
}

impl Default for CompileOutputBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileOutputBuilder {
    /// Starts in `InvalidateGroups` with nothing shipped.
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            group_ids: BTreeSet::new(),
            mode: InvalidateMode::InvalidateGroups,
        }
    }

    /// The current mode.
    pub fn mode(&self) -> InvalidateMode {
        self.mode
    }

    /// Raises the mode to at least `mode`.
    pub fn escalate(&mut self, mode: InvalidateMode, reason: &str) {
        if mode > self.mode {
            tracing::debug!(from = ?self.mode, to = ?mode, reason, "escalating invalidate mode");
            self.mode = mode;
        }
    }

    /// Ships a class.
    pub fn add_class(&mut self, name: impl Into<String>, bytes: Vec<u8>, kind: ClassKind) {
        self.classes.push(OutputClass {
            name: name.into(),
            bytes,
            kind,
        });
    }

    /// Records a method whose behavior changed.
    ///
    /// `groups` are the groups of the method's source file and `line_count`
    /// its number of lines.
    pub fn record_modified_method(
        &mut self,
        class: &str,
        method: &MethodModel,
        groups: &[ComposeGroup],
        is_restart_lambda: bool,
        line_count: Option<u32>,
    ) {
        if self.mode == InvalidateMode::RestartActivity {
            return;
        }
        if groups.is_empty() {
            self.escalate(InvalidateMode::SaveAndLoad, "source file has no group metadata");
            return;
        }
        if is_restart_lambda {
            self.escalate(InvalidateMode::SaveAndLoad, "restart lambda body changed");
            return;
        }
        match select(groups, method, line_count) {
            Selection::Group(group) => {
                tracing::debug!(class, method = %method.signature(), key = group.key, "change maps to group");
                self.group_ids.insert(group.key);
            }
            Selection::Unplaced => {
                tracing::debug!(class, method = %method.signature(), "change has no line in the source file");
            }
            Selection::Uncovered if is_singleton_container(class) => {}
            Selection::Uncovered => {
                self.escalate(InvalidateMode::RestartActivity, "change outside every group")
            }
        }
    }

    /// Records a support class that did not exist in the baseline.
    ///
    /// `scope_lines` are the lines of the code that creates the class. Its
    /// instances only appear once that scope runs again, so the scope has to
    /// lie inside a group.
    pub fn record_added_support_class(
        &mut self,
        class: &str,
        scope_lines: &BTreeSet<u32>,
        groups: &[ComposeGroup],
        line_count: Option<u32>,
    ) {
        if self.mode == InvalidateMode::RestartActivity || is_singleton_container(class) {
            return;
        }
        match select_for_lines(groups, scope_lines, line_count) {
            Selection::Group(group) => {
                self.group_ids.insert(group.key);
            }
            Selection::Unplaced => {}
            Selection::Uncovered => self.escalate(
                InvalidateMode::RestartActivity,
                "new support class created outside every group",
            ),
        }
    }

    /// Finishes the pass.
    pub fn build(self) -> CompileOutput {
        if self.classes.is_empty() {
            return CompileOutput::empty();
        }
        let group_ids_to_invalidate = if self.mode == InvalidateMode::InvalidateGroups {
            self.group_ids
        } else {
            BTreeSet::new()
        };
        CompileOutput {
            classes: self.classes,
            group_ids_to_invalidate,
            invalidate_mode: self.mode,
        }
    }
}
