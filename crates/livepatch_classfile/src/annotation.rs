//! Annotations and their element values.

use serde::{Deserialize, Serialize};

use crate::constant_pool::{Constant, ConstantPool};
use crate::error::ClassFileError;
use crate::reader::ByteReader;

/// Deepest annotation nesting accepted by the parser.
const MAX_NESTING: u32 = 32;

/// An annotation instance with its literal element values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annotation {
    /// Field descriptor of the annotation type (`Lkotlin/Metadata;`).
    pub descriptor: String,
    /// `name = value` pairs in declaration order.
    pub elements: Vec<(String, ElementValue)>,
    /// Whether the annotation was retained at runtime (`RuntimeVisibleAnnotations`).
    pub visible: bool,
}

/// The value of one annotation element.
///
/// Floating-point values are kept as raw IEEE bits so that annotations can be
/// compared and hashed exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementValue {
    /// `byte` (`B`).
    Byte(i8),
    /// `char` (`C`), as a UTF-16 code unit.
    Char(u16),
    /// `double` (`D`) bits.
    Double(u64),
    /// `float` (`F`) bits.
    Float(u32),
    /// `int` (`I`).
    Int(i32),
    /// `long` (`J`).
    Long(i64),
    /// `short` (`S`).
    Short(i16),
    /// `boolean` (`Z`).
    Boolean(bool),
    /// `String` (`s`).
    String(String),
    /// Enum constant (`e`).
    Enum {
        /// Field descriptor of the enum type.
        type_descriptor: String,
        /// Constant name.
        constant: String,
    },
    /// Class literal (`c`), as a return descriptor.
    Class(String),
    /// Nested annotation (`@`).
    Annotation(Box<Annotation>),
    /// Array (`[`).
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Parses a `RuntimeVisibleAnnotations`/`RuntimeInvisibleAnnotations` body.
    pub fn parse_list(
        reader: &mut ByteReader<'_>,
        pool: &ConstantPool,
        visible: bool,
    ) -> Result<Vec<Annotation>, ClassFileError> {
        let count = reader.u2()?;
        (0..count)
            .map(|_| Self::parse(reader, pool, visible, 0))
            .collect()
    }

    fn parse(
        reader: &mut ByteReader<'_>,
        pool: &ConstantPool,
        visible: bool,
        depth: u32,
    ) -> Result<Annotation, ClassFileError> {
        if depth > MAX_NESTING {
            return Err(bad("annotation nesting too deep"));
        }
        let descriptor = pool.utf8(reader.u2()?)?.to_string();
        let pair_count = reader.u2()?;
        let mut elements = Vec::with_capacity(pair_count as usize);
        for _ in 0..pair_count {
            let name = pool.utf8(reader.u2()?)?.to_string();
            let value = ElementValue::parse(reader, pool, visible, depth)?;
            elements.push((name, value));
        }
        Ok(Annotation {
            descriptor,
            elements,
            visible,
        })
    }

    /// Returns the value of the element called `name`.
    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl ElementValue {
    fn parse(
        reader: &mut ByteReader<'_>,
        pool: &ConstantPool,
        visible: bool,
        depth: u32,
    ) -> Result<ElementValue, ClassFileError> {
        let tag = reader.u1()?;
        let value = match tag {
            b'B' => ElementValue::Byte(int_const(pool, reader.u2()?)? as i8),
            b'C' => ElementValue::Char(int_const(pool, reader.u2()?)? as u16),
            b'I' => ElementValue::Int(int_const(pool, reader.u2()?)?),
            b'S' => ElementValue::Short(int_const(pool, reader.u2()?)? as i16),
            b'Z' => ElementValue::Boolean(int_const(pool, reader.u2()?)? != 0),
            b'D' => {
                let index = reader.u2()?;
                match pool.get(index)? {
                    Constant::Double(bits) => ElementValue::Double(*bits),
                    _ => {
                        return Err(ClassFileError::BadConstantIndex {
                            index,
                            expected: "Double",
                        })
                    }
                }
            }
            b'F' => {
                let index = reader.u2()?;
                match pool.get(index)? {
                    Constant::Float(bits) => ElementValue::Float(*bits),
                    _ => {
                        return Err(ClassFileError::BadConstantIndex {
                            index,
                            expected: "Float",
                        })
                    }
                }
            }
            b'J' => {
                let index = reader.u2()?;
                match pool.get(index)? {
                    Constant::Long(v) => ElementValue::Long(*v),
                    _ => {
                        return Err(ClassFileError::BadConstantIndex {
                            index,
                            expected: "Long",
                        })
                    }
                }
            }
            b's' => ElementValue::String(pool.utf8(reader.u2()?)?.to_string()),
            b'e' => {
                let type_descriptor = pool.utf8(reader.u2()?)?.to_string();
                let constant = pool.utf8(reader.u2()?)?.to_string();
                ElementValue::Enum {
                    type_descriptor,
                    constant,
                }
            }
            b'c' => ElementValue::Class(pool.utf8(reader.u2()?)?.to_string()),
            b'@' => ElementValue::Annotation(Box::new(Annotation::parse(
                reader,
                pool,
                visible,
                depth + 1,
            )?)),
            b'[' => {
                if depth > MAX_NESTING {
                    return Err(bad("array nesting too deep"));
                }
                let count = reader.u2()?;
                let values = (0..count)
                    .map(|_| ElementValue::parse(reader, pool, visible, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                ElementValue::Array(values)
            }
            other => return Err(bad(&format!("unknown element value tag {other:#04x}"))),
        };
        Ok(value)
    }

    /// Returns the value as an `i32` if it is any integral kind.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            ElementValue::Int(v) => Some(v),
            ElementValue::Short(v) => Some(v as i32),
            ElementValue::Byte(v) => Some(v as i32),
            ElementValue::Char(v) => Some(v as i32),
            _ => None,
        }
    }

    /// Returns the value as a string slice if it is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ElementValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the value as an `i32` vector if it is an array of integral values.
    ///
    /// A single integral value is accepted as a one-element array, mirroring
    /// how Java source allows `key = 1` for an `int[]` element.
    pub fn as_int_array(&self) -> Option<Vec<i32>> {
        match self {
            ElementValue::Array(values) => values.iter().map(ElementValue::as_int).collect(),
            single => single.as_int().map(|v| vec![v]),
        }
    }
}

fn int_const(pool: &ConstantPool, index: u16) -> Result<i32, ClassFileError> {
    match pool.get(index)? {
        Constant::Integer(v) => Ok(*v),
        _ => Err(ClassFileError::BadConstantIndex {
            index,
            expected: "Integer",
        }),
    }
}

fn bad(reason: &str) -> ClassFileError {
    ClassFileError::BadAttribute {
        name: "annotation".to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_lookup() {
        let ann = Annotation {
            descriptor: "Lkotlin/Metadata;".to_string(),
            elements: vec![
                ("k".to_string(), ElementValue::Int(1)),
                ("xs".to_string(), ElementValue::String("MainKt".to_string())),
            ],
            visible: true,
        };
        assert_eq!(ann.element("k").and_then(ElementValue::as_int), Some(1));
        assert_eq!(ann.element("xs").and_then(ElementValue::as_str), Some("MainKt"));
        assert!(ann.element("missing").is_none());
    }

    #[test]
    fn int_array_conversion() {
        let arr = ElementValue::Array(vec![ElementValue::Int(3), ElementValue::Short(4)]);
        assert_eq!(arr.as_int_array(), Some(vec![3, 4]));
        assert_eq!(ElementValue::Int(9).as_int_array(), Some(vec![9]));
        let mixed = ElementValue::Array(vec![
            ElementValue::Int(3),
            ElementValue::String("x".to_string()),
        ]);
        assert_eq!(mixed.as_int_array(), None);
    }

    #[test]
    fn float_values_compare_by_bits() {
        let a = ElementValue::Float(f32::NAN.to_bits());
        let b = ElementValue::Float(f32::NAN.to_bits());
        assert_eq!(a, b);
    }
}
