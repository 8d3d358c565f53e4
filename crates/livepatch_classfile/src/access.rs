//! Access and property flags for classes, fields, and methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A set of `ACC_*` flags as stored in the class file.
///
/// The same bit can mean different things on classes, fields and methods
/// (`0x0020` is `ACC_SUPER` on a class and `ACC_SYNCHRONIZED` on a method),
/// so the constants below are named for their member-level meaning.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessFlags(u16);

impl AccessFlags {
    /// `ACC_PUBLIC`.
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    /// `ACC_PRIVATE`.
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    /// `ACC_PROTECTED`.
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    /// `ACC_STATIC`.
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    /// `ACC_FINAL`.
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    /// `ACC_SYNCHRONIZED` on methods, `ACC_SUPER` on classes.
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(0x0020);
    /// `ACC_BRIDGE` on methods, `ACC_VOLATILE` on fields.
    pub const BRIDGE: AccessFlags = AccessFlags(0x0040);
    /// `ACC_VARARGS` on methods, `ACC_TRANSIENT` on fields.
    pub const VARARGS: AccessFlags = AccessFlags(0x0080);
    /// `ACC_NATIVE`.
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    /// `ACC_INTERFACE`.
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    /// `ACC_ABSTRACT`.
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    /// `ACC_STRICT`.
    pub const STRICT: AccessFlags = AccessFlags(0x0800);
    /// `ACC_SYNTHETIC`.
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);
    /// `ACC_ANNOTATION`.
    pub const ANNOTATION: AccessFlags = AccessFlags(0x2000);
    /// `ACC_ENUM`.
    pub const ENUM: AccessFlags = AccessFlags(0x4000);

    const NAMES: [(AccessFlags, &'static str); 15] = [
        (Self::PUBLIC, "public"),
        (Self::PRIVATE, "private"),
        (Self::PROTECTED, "protected"),
        (Self::STATIC, "static"),
        (Self::FINAL, "final"),
        (Self::SYNCHRONIZED, "synchronized"),
        (Self::BRIDGE, "bridge"),
        (Self::VARARGS, "varargs"),
        (Self::NATIVE, "native"),
        (Self::INTERFACE, "interface"),
        (Self::ABSTRACT, "abstract"),
        (Self::STRICT, "strict"),
        (Self::SYNTHETIC, "synthetic"),
        (Self::ANNOTATION, "annotation"),
        (Self::ENUM, "enum"),
    ];

    /// Creates a flag set from its raw bits.
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    pub const fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both flag sets.
    pub const fn union(self, other: AccessFlags) -> Self {
        Self(self.0 | other.0)
    }

    /// Shorthand for `contains(AccessFlags::PUBLIC)`.
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    /// Shorthand for `contains(AccessFlags::PRIVATE)`.
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    /// Shorthand for `contains(AccessFlags::STATIC)`.
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// Shorthand for `contains(AccessFlags::SYNTHETIC)`.
    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    /// Shorthand for `contains(AccessFlags::BRIDGE)`.
    pub fn is_bridge(self) -> bool {
        self.contains(Self::BRIDGE)
    }

    /// Names of the set flags, in bit order, using method-level meanings.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        self.union(rhs)
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessFlags({:#06x} {})", self.0, self.names().join("|"))
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}
