//! The parsed class model.

use std::collections::BTreeSet;

use livepatch_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::access::AccessFlags;
use crate::annotation::Annotation;
use crate::code::Instruction;
use crate::constant_pool::ResolvedConstant;

/// Name of instance initializers.
pub const CONSTRUCTOR: &str = "<init>";

/// Name of the static initializer.
pub const CLASS_INIT: &str = "<clinit>";

/// An immutable view of one class file.
///
/// Every field is derived from the class bytes, so two models parsed from
/// byte-identical input compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassModel {
    /// Internal name (`com/example/MainKt`).
    pub name: String,
    /// Internal name of the superclass; `None` only for `java/lang/Object`.
    pub super_name: Option<String>,
    /// Internal names of directly implemented interfaces, in declaration order.
    pub interfaces: Vec<String>,
    /// Class access flags.
    pub access: AccessFlags,
    /// `(major, minor)` class-file version.
    pub version: (u16, u16),
    /// Fields in declaration order.
    pub fields: Vec<FieldModel>,
    /// Methods in declaration order.
    pub methods: Vec<MethodModel>,
    /// Class-level annotations, visible ones first.
    pub annotations: Vec<Annotation>,
    /// `EnclosingMethod` back reference for local and anonymous classes.
    pub enclosing_method: Option<EnclosingMethod>,
    /// Name recorded in the `SourceFile` attribute.
    pub source_file_name: Option<String>,
    /// Hash of the raw class bytes.
    pub content_hash: ContentHash,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldModel {
    /// Field name.
    pub name: String,
    /// Field descriptor.
    pub descriptor: String,
    /// Access flags.
    pub access: AccessFlags,
    /// Compile-time constant from `ConstantValue`, if any.
    pub constant_value: Option<ResolvedConstant>,
}

/// A method declaration and its decoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodModel {
    /// Method name.
    pub name: String,
    /// Method descriptor.
    pub descriptor: String,
    /// Access flags.
    pub access: AccessFlags,
    /// Decoded instructions; empty for abstract and native methods.
    pub instructions: Vec<Instruction>,
    /// Exception handlers with instruction-index ranges.
    pub handlers: Vec<ExceptionHandler>,
    /// Source lines from the `LineNumberTable`.
    pub lines: BTreeSet<u32>,
    /// Method annotations.
    pub annotations: Vec<Annotation>,
    /// Whether the method carries an inline-function marker annotation.
    pub is_inline: bool,
}

/// An exception-table entry expressed in instruction indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// First protected instruction.
    pub start: u32,
    /// One past the last protected instruction.
    pub end: u32,
    /// First handler instruction.
    pub handler: u32,
    /// Caught type, `None` for `finally` blocks.
    pub catch_type: Option<String>,
}

/// The `EnclosingMethod` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosingMethod {
    /// Internal name of the enclosing class.
    pub class: String,
    /// `(name, descriptor)` of the enclosing method, absent when the class
    /// is declared in a field initializer or static block.
    pub method: Option<(String, String)>,
}

impl ClassModel {
    /// Returns the method with the given name and descriptor.
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodModel> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    /// Returns the class annotation with the given descriptor.
    pub fn annotation(&self, descriptor: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.descriptor == descriptor)
    }

    /// Every source line mentioned by any method of the class.
    pub fn lines(&self) -> BTreeSet<u32> {
        self.methods
            .iter()
            .flat_map(|m| m.lines.iter().copied())
            .collect()
    }
}

impl MethodModel {
    /// `name + descriptor`, the key methods are matched by across versions.
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    /// Returns `true` for `<init>` methods.
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    /// Returns `true` for `<clinit>`.
    pub fn is_class_init(&self) -> bool {
        self.name == CLASS_INIT
    }

    /// Compares the parts of a method that affect behavior.
    ///
    /// Line numbers are ignored: inserting a blank line above a method moves
    /// its line table without changing what it does. Annotations count, since
    /// the runtime and the compiler plugins read them.
    pub fn same_behavior(&self, other: &MethodModel) -> bool {
        self.access == other.access
            && self.instructions == other.instructions
            && self.handlers == other.handlers
            && self.annotations == other.annotations
            && self.is_inline == other.is_inline
    }

    /// Returns the method annotation with the given descriptor.
    pub fn annotation(&self, descriptor: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.descriptor == descriptor)
    }
}
