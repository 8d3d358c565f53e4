//! JVM class-file parsing into a queryable, structurally comparable model.
//!
//! [`ClassModel::parse`] decodes a class file into names, fields, methods,
//! annotations and the debug metadata the live-patch engine relies on
//! (line-number tables, enclosing-method back references, source file names).
//! Method bodies are decoded into constant-pool-resolved [`Instruction`]s so
//! that two compilations of the same source compare equal even when the
//! compiler laid out its constant pool differently.
//!
//! Attributes the engine does not need are skipped, never rejected, since
//! front-end compilers routinely emit implementation-specific metadata.
//!
//! With the `test-util` feature, `ClassWriter` goes the other way and emits
//! well-formed class files from a small symbolic description for fixtures.

#![warn(missing_docs)]

pub mod access;
pub mod annotation;
pub mod attribute;
pub mod code;
pub mod constant_pool;
pub mod error;
pub mod model;
pub mod parse;
pub mod reader;
#[cfg(any(test, feature = "test-util"))]
pub mod writer;

pub use access::AccessFlags;
pub use annotation::{Annotation, ElementValue};
pub use code::{Instruction, Operand};
pub use constant_pool::{Constant, ConstantPool, ResolvedConstant};
pub use error::ClassFileError;
pub use model::{
    ClassModel, EnclosingMethod, ExceptionHandler, FieldModel, MethodModel, CLASS_INIT, CONSTRUCTOR,
};
pub use parse::{ParseOptions, DEFAULT_INLINE_MARKERS};
#[cfg(any(test, feature = "test-util"))]
pub use writer::{ClassWriter, CodeOp, MethodDef};

/// Magic number at the start of every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Oldest supported major version (JDK 1.1).
pub const MIN_MAJOR_VERSION: u16 = 45;

/// Newest supported major version (JDK 25).
pub const MAX_MAJOR_VERSION: u16 = 69;
