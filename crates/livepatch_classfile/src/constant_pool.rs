//! Constant-pool decoding and symbolic resolution.
//!
//! Instructions and attributes refer to the constant pool by index. Indices are
//! an artifact of how a particular compiler run laid out the pool, so the model
//! never stores them: everything is resolved into [`ResolvedConstant`]s or
//! plain strings before it reaches the differ.

use serde::{Deserialize, Serialize};

use crate::error::ClassFileError;
use crate::reader::ByteReader;

/// Deepest chain of dynamic constants followed during resolution.
const MAX_DYNAMIC_DEPTH: u32 = 8;

/// A raw constant-pool entry, as laid out in the class file.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Index 0 and the second slot of `Long`/`Double` entries.
    Unusable,
    /// `CONSTANT_Utf8`, already decoded from modified UTF-8.
    Utf8(String),
    /// `CONSTANT_Integer`.
    Integer(i32),
    /// `CONSTANT_Float`, kept as raw IEEE bits.
    Float(u32),
    /// `CONSTANT_Long`.
    Long(i64),
    /// `CONSTANT_Double`, kept as raw IEEE bits.
    Double(u64),
    /// `CONSTANT_Class`.
    Class {
        /// Index of the `Utf8` internal name.
        name_index: u16,
    },
    /// `CONSTANT_String`.
    String {
        /// Index of the `Utf8` value.
        string_index: u16,
    },
    /// `CONSTANT_Fieldref`.
    FieldRef {
        /// Index of the owning `Class`.
        class_index: u16,
        /// Index of the `NameAndType`.
        name_and_type_index: u16,
    },
    /// `CONSTANT_Methodref`.
    MethodRef {
        /// Index of the owning `Class`.
        class_index: u16,
        /// Index of the `NameAndType`.
        name_and_type_index: u16,
    },
    /// `CONSTANT_InterfaceMethodref`.
    InterfaceMethodRef {
        /// Index of the owning `Class`.
        class_index: u16,
        /// Index of the `NameAndType`.
        name_and_type_index: u16,
    },
    /// `CONSTANT_NameAndType`.
    NameAndType {
        /// Index of the `Utf8` name.
        name_index: u16,
        /// Index of the `Utf8` descriptor.
        descriptor_index: u16,
    },
    /// `CONSTANT_MethodHandle`.
    MethodHandle {
        /// Reference kind (1..=9).
        reference_kind: u8,
        /// Index of the referenced member.
        reference_index: u16,
    },
    /// `CONSTANT_MethodType`.
    MethodType {
        /// Index of the `Utf8` method descriptor.
        descriptor_index: u16,
    },
    /// `CONSTANT_Dynamic`.
    Dynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap_method_attr_index: u16,
        /// Index of the `NameAndType`.
        name_and_type_index: u16,
    },
    /// `CONSTANT_InvokeDynamic`.
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute.
        bootstrap_method_attr_index: u16,
        /// Index of the `NameAndType`.
        name_and_type_index: u16,
    },
    /// `CONSTANT_Module`.
    Module {
        /// Index of the `Utf8` module name.
        name_index: u16,
    },
    /// `CONSTANT_Package`.
    Package {
        /// Index of the `Utf8` package name.
        name_index: u16,
    },
}

/// One entry of the `BootstrapMethods` attribute, still in index form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBootstrapMethod {
    /// Index of the bootstrap `MethodHandle`.
    pub method_ref: u16,
    /// Indices of the static arguments.
    pub arguments: Vec<u16>,
}

/// A member reference (`Fieldref`, `Methodref`, `InterfaceMethodref`) with names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    /// Internal name of the owning class.
    pub owner: String,
    /// Member name.
    pub name: String,
    /// Field or method descriptor.
    pub descriptor: String,
    /// Whether the owner was referenced as an interface.
    pub interface: bool,
}

/// A bootstrap method with its handle and static arguments resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapMethod {
    /// The bootstrap method handle.
    pub handle: ResolvedConstant,
    /// Static bootstrap arguments.
    pub arguments: Vec<ResolvedConstant>,
}

/// A loadable constant with every index replaced by the value it points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedConstant {
    /// An `int` literal.
    Int(i32),
    /// A `float` literal as IEEE bits.
    Float(u32),
    /// A `long` literal.
    Long(i64),
    /// A `double` literal as IEEE bits.
    Double(u64),
    /// A string literal.
    String(String),
    /// A class literal (internal name or array descriptor).
    Class(String),
    /// A method type (method descriptor).
    MethodType(String),
    /// A method handle.
    MethodHandle {
        /// Reference kind (1..=9).
        kind: u8,
        /// The referenced member.
        member: MemberRef,
    },
    /// A dynamically computed constant or call site.
    Dynamic {
        /// The bootstrap method producing the value.
        bootstrap: Box<BootstrapMethod>,
        /// Name of the constant or call site.
        name: String,
        /// Its descriptor.
        descriptor: String,
    },
}

/// A decoded constant pool.
///
/// Entries are stored at their class-file indices; slot 0 and the slot after
/// every `Long`/`Double` hold [`Constant::Unusable`].
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Reads `constant_pool_count` and the entries that follow it.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let count = reader.u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = reader.u1()?;
            let entry = match tag {
                1 => {
                    let len = reader.u2()? as usize;
                    let bytes = reader.bytes(len)?;
                    Constant::Utf8(
                        decode_modified_utf8(bytes).ok_or(ClassFileError::BadUtf8 { index })?,
                    )
                }
                3 => Constant::Integer(reader.i4()?),
                4 => Constant::Float(reader.u4()?),
                5 => Constant::Long(reader.u8()? as i64),
                6 => Constant::Double(reader.u8()?),
                7 => Constant::Class {
                    name_index: reader.u2()?,
                },
                8 => Constant::String {
                    string_index: reader.u2()?,
                },
                9 => Constant::FieldRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.u2()?,
                    descriptor_index: reader.u2()?,
                },
                15 => Constant::MethodHandle {
                    reference_kind: reader.u1()?,
                    reference_index: reader.u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.u2()?,
                },
                17 => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                18 => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.u2()?,
                    name_and_type_index: reader.u2()?,
                },
                19 => Constant::Module {
                    name_index: reader.u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.u2()?,
                },
                _ => return Err(ClassFileError::BadConstantTag { tag, index }),
            };

            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            index += 1;
            if wide {
                if index >= count {
                    return Err(ClassFileError::BadConstantIndex {
                        index,
                        expected: "second slot of a Long or Double",
                    });
                }
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    /// Number of slots, including the unusable slot 0.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the pool has no usable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Returns the raw entry at `index`.
    pub fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "a usable entry",
            }),
            Some(entry) => Ok(entry),
        }
    }

    /// Returns the string stored in the `Utf8` entry at `index`.
    pub fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index) {
            Ok(Constant::Utf8(s)) => Ok(s.as_str()),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Returns the internal name referenced by the `Class` entry at `index`.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index) {
            Ok(Constant::Class { name_index }) => self.utf8(*name_index),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Like [`class_name`](Self::class_name) but maps index 0 to `None`.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ClassFileError> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    /// Returns `(name, descriptor)` of the `NameAndType` entry at `index`.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.get(index) {
            Ok(Constant::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFileError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref`.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef, ClassFileError> {
        let (class_index, nat_index, interface) = match self.get(index) {
            Ok(Constant::FieldRef {
                class_index,
                name_and_type_index,
            })
            | Ok(Constant::MethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, false),
            Ok(Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, true),
            _ => {
                return Err(ClassFileError::BadConstantIndex {
                    index,
                    expected: "member reference",
                })
            }
        };
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            owner: self.class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    /// Resolves a loadable constant (the operand of `ldc`, a bootstrap argument,
    /// or an `invokedynamic` call site) into symbolic form.
    pub fn resolve(
        &self,
        index: u16,
        bootstraps: &[RawBootstrapMethod],
    ) -> Result<ResolvedConstant, ClassFileError> {
        self.resolve_at_depth(index, bootstraps, 0)
    }

    fn resolve_at_depth(
        &self,
        index: u16,
        bootstraps: &[RawBootstrapMethod],
        depth: u32,
    ) -> Result<ResolvedConstant, ClassFileError> {
        let resolved = match self.get(index)? {
            Constant::Integer(v) => ResolvedConstant::Int(*v),
            Constant::Float(v) => ResolvedConstant::Float(*v),
            Constant::Long(v) => ResolvedConstant::Long(*v),
            Constant::Double(v) => ResolvedConstant::Double(*v),
            Constant::String { string_index } => {
                ResolvedConstant::String(self.utf8(*string_index)?.to_string())
            }
            Constant::Class { name_index } => {
                ResolvedConstant::Class(self.utf8(*name_index)?.to_string())
            }
            Constant::MethodType { descriptor_index } => {
                ResolvedConstant::MethodType(self.utf8(*descriptor_index)?.to_string())
            }
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => ResolvedConstant::MethodHandle {
                kind: *reference_kind,
                member: self.member_ref(*reference_index)?,
            },
            Constant::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            }
            | Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                if depth >= MAX_DYNAMIC_DEPTH {
                    return Err(ClassFileError::BadConstantIndex {
                        index,
                        expected: "a dynamic constant chain of bounded depth",
                    });
                }
                let raw = bootstraps
                    .get(*bootstrap_method_attr_index as usize)
                    .ok_or(ClassFileError::BadConstantIndex {
                        index: *bootstrap_method_attr_index,
                        expected: "BootstrapMethods entry",
                    })?;
                let handle = self.resolve_at_depth(raw.method_ref, bootstraps, depth + 1)?;
                let arguments = raw
                    .arguments
                    .iter()
                    .map(|&arg| self.resolve_at_depth(arg, bootstraps, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                ResolvedConstant::Dynamic {
                    bootstrap: Box::new(BootstrapMethod { handle, arguments }),
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                }
            }
            _ => {
                return Err(ClassFileError::BadConstantIndex {
                    index,
                    expected: "loadable constant",
                })
            }
        };
        Ok(resolved)
    }
}

/// Decodes the JVM's modified UTF-8 (`\0` as `C0 80`, supplementary
/// characters as surrogate pairs of three-byte sequences).
///
/// Returns `None` on byte patterns modified UTF-8 never produces.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|&b| b != 0 && b < 0x80) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 {
            0x01..=0x7F => {
                units.push(b0 as u16);
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = *bytes.get(i + 1)?;
                if b1 & 0xC0 != 0x80 {
                    return None;
                }
                units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
                i += 2;
            }
            0xE0..=0xEF => {
                let b1 = *bytes.get(i + 1)?;
                let b2 = *bytes.get(i + 2)?;
                if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                    return None;
                }
                units.push(
                    (((b0 & 0x0F) as u16) << 12)
                        | (((b1 & 0x3F) as u16) << 6)
                        | (b2 & 0x3F) as u16,
                );
                i += 3;
            }
            _ => return None,
        }
    }
    Some(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes(entries: &[&[u8]], count: u16) -> Vec<u8> {
        let mut out = count.to_be_bytes().to_vec();
        for e in entries {
            out.extend_from_slice(e);
        }
        out
    }

    fn utf8(s: &str) -> Vec<u8> {
        let mut v = vec![1];
        v.extend_from_slice(&(s.len() as u16).to_be_bytes());
        v.extend_from_slice(s.as_bytes());
        v
    }

    #[test]
    fn parses_class_and_name_and_type() {
        let name = utf8("com/example/MainKt");
        let m = utf8("greet");
        let d = utf8("()V");
        let bytes = pool_bytes(
            &[&name, &[7, 0, 1], &m, &d, &[12, 0, 3, 0, 4]],
            6,
        );
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.len(), 6);
        assert_eq!(pool.class_name(2).unwrap(), "com/example/MainKt");
        assert_eq!(pool.name_and_type(5).unwrap(), ("greet", "()V"));
    }

    #[test]
    fn long_takes_two_slots() {
        let bytes = pool_bytes(&[&[5, 0, 0, 0, 0, 0, 0, 0, 42], &[3, 0, 0, 0, 7]], 4);
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(pool.resolve(1, &[]).unwrap(), ResolvedConstant::Long(42));
        assert!(pool.get(2).is_err());
        assert_eq!(pool.resolve(3, &[]).unwrap(), ResolvedConstant::Int(7));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let bytes = pool_bytes(&[&[2, 0, 0]], 2);
        let err = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap_err();
        assert_eq!(err, ClassFileError::BadConstantTag { tag: 2, index: 1 });
    }

    #[test]
    fn wrong_kind_reference_is_rejected() {
        let bytes = pool_bytes(&[&[3, 0, 0, 0, 1]], 2);
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        assert!(matches!(
            pool.utf8(1),
            Err(ClassFileError::BadConstantIndex { index: 1, .. })
        ));
        assert!(pool.utf8(9).is_err());
        assert!(pool.get(0).is_err());
    }

    #[test]
    fn resolves_invokedynamic_through_bootstrap() {
        // 1 Utf8 owner, 2 Class, 3 Utf8 name, 4 Utf8 desc, 5 NAT, 6 Methodref,
        // 7 MethodHandle(6), 8 Utf8 "invoke", 9 Utf8 "()Ljava/lang/Runnable;",
        // 10 NAT(8,9), 11 InvokeDynamic(0, 10)
        let bytes = pool_bytes(
            &[
                &utf8("java/lang/invoke/LambdaMetafactory"),
                &[7, 0, 1],
                &utf8("metafactory"),
                &utf8("()V"),
                &[12, 0, 3, 0, 4],
                &[10, 0, 2, 0, 5],
                &[15, 6, 0, 6],
                &utf8("run"),
                &utf8("()Ljava/lang/Runnable;"),
                &[12, 0, 8, 0, 9],
                &[18, 0, 0, 0, 10],
            ],
            12,
        );
        let pool = ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap();
        let bootstraps = vec![RawBootstrapMethod {
            method_ref: 7,
            arguments: vec![],
        }];
        match pool.resolve(11, &bootstraps).unwrap() {
            ResolvedConstant::Dynamic {
                bootstrap,
                name,
                descriptor,
            } => {
                assert_eq!(name, "run");
                assert_eq!(descriptor, "()Ljava/lang/Runnable;");
                match bootstrap.handle {
                    ResolvedConstant::MethodHandle { kind, ref member } => {
                        assert_eq!(kind, 6);
                        assert_eq!(member.name, "metafactory");
                    }
                    ref other => panic!("unexpected handle {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(pool.resolve(11, &[]).is_err());
    }

    #[test]
    fn modified_utf8_null_and_multibyte() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80]).unwrap(), "a\0");
        assert_eq!(decode_modified_utf8("é".as_bytes()).unwrap(), "é");
        assert_eq!(decode_modified_utf8("€".as_bytes()).unwrap(), "€");
        // U+1F600 as a CESU-8 surrogate pair
        let pair = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&pair).unwrap(), "\u{1F600}");
    }

    #[test]
    fn modified_utf8_rejects_raw_null_and_four_byte_forms() {
        assert!(decode_modified_utf8(&[0x00]).is_none());
        assert!(decode_modified_utf8(&[0xF0, 0x9F, 0x98, 0x80]).is_none());
        assert!(decode_modified_utf8(&[0xC3]).is_none());
    }
}
