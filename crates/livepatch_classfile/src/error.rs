//! Error types for class-file parsing.

/// A class file that could not be decoded.
///
/// Every variant means the front-end compiler handed over bytes that are not a
/// well-formed class file. The engine treats these as internal failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassFileError {
    /// The first four bytes were not `0xCAFEBABE`.
    #[error("bad magic number {found:#010x}")]
    BadMagic {
        /// The value read instead of the magic number.
        found: u32,
    },

    /// The major version is outside the supported range.
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version.
        major: u16,
        /// Minor version.
        minor: u16,
    },

    /// Input ended before a structure was complete.
    #[error("truncated class file: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Number of bytes the read needed.
        needed: usize,
        /// Number of bytes left.
        available: usize,
    },

    /// A constant-pool entry has an unknown tag.
    #[error("unknown constant pool tag {tag} at index {index}")]
    BadConstantTag {
        /// The unknown tag byte.
        tag: u8,
        /// Constant-pool index of the entry.
        index: u16,
    },

    /// A constant-pool reference points outside the pool or at the wrong kind of entry.
    #[error("bad constant pool reference {index}: expected {expected}")]
    BadConstantIndex {
        /// The offending index.
        index: u16,
        /// What kind of entry was expected there.
        expected: &'static str,
    },

    /// A `Utf8` constant does not hold valid modified UTF-8.
    #[error("invalid modified UTF-8 in constant {index}")]
    BadUtf8 {
        /// Constant-pool index of the entry.
        index: u16,
    },

    /// An attribute body is inconsistent with its declared length or layout.
    #[error("malformed {name} attribute: {reason}")]
    BadAttribute {
        /// Attribute name.
        name: String,
        /// Description of the problem.
        reason: String,
    },

    /// A method body contains an undefined opcode or an operand running past the code end.
    #[error("malformed bytecode at pc {pc}: {reason}")]
    BadBytecode {
        /// Byte offset of the offending instruction.
        pc: u32,
        /// Description of the problem.
        reason: String,
    },

    /// Bytes remained after the last class-file structure.
    #[error("{count} trailing bytes after end of class file")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}
