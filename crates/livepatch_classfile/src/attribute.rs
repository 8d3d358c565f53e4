//! Attribute decoding.
//!
//! Only the attributes the live-patch engine consumes are decoded; everything
//! else becomes [`Attribute::Unknown`] and is skipped by length.

use crate::annotation::Annotation;
use crate::constant_pool::{Constant, ConstantPool, RawBootstrapMethod, ResolvedConstant};
use crate::error::ClassFileError;
use crate::reader::ByteReader;

/// A `Code` attribute before its bytecode is decoded.
///
/// Decoding needs the class's bootstrap methods, which are stored after the
/// methods in the class file, so bytecode is kept raw until the whole class
/// has been read.
#[derive(Debug, Clone, Default)]
pub struct RawCode {
    /// Maximum operand stack depth.
    pub max_stack: u16,
    /// Number of local variable slots.
    pub max_locals: u16,
    /// Bytecode.
    pub code: Vec<u8>,
    /// Exception table, in byte-offset form.
    pub exception_table: Vec<RawExceptionEntry>,
    /// `(start_pc, line)` entries from every `LineNumberTable` attribute.
    pub line_numbers: Vec<(u16, u16)>,
}

/// One exception-table entry in byte-offset form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawExceptionEntry {
    /// Start of the protected range (inclusive).
    pub start_pc: u16,
    /// End of the protected range (exclusive).
    pub end_pc: u16,
    /// Handler entry point.
    pub handler_pc: u16,
    /// `Class` index of the caught type, or 0 for `finally`.
    pub catch_type: u16,
}

/// A decoded attribute.
#[derive(Debug, Clone)]
pub enum Attribute {
    /// `Code`.
    Code(RawCode),
    /// `SourceFile`.
    SourceFile(String),
    /// `EnclosingMethod`: class plus optional `(name, descriptor)`.
    EnclosingMethod {
        /// Internal name of the enclosing class.
        class: String,
        /// Enclosing method, absent for classes declared in initializers.
        method: Option<(String, String)>,
    },
    /// `RuntimeVisibleAnnotations` or `RuntimeInvisibleAnnotations`.
    Annotations(Vec<Annotation>),
    /// `ConstantValue` of a static field.
    ConstantValue(ResolvedConstant),
    /// `BootstrapMethods`.
    BootstrapMethods(Vec<RawBootstrapMethod>),
    /// `Synthetic` marker attribute.
    Synthetic,
    /// Anything else, skipped.
    Unknown {
        /// Attribute name.
        name: String,
        /// Body length in bytes.
        length: u32,
    },
}

/// Reads `attributes_count` attributes.
pub fn parse_attributes(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassFileError> {
    let count = reader.u2()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(parse_attribute(reader, pool)?);
    }
    Ok(attributes)
}

fn parse_attribute(
    reader: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Attribute, ClassFileError> {
    let name = pool.utf8(reader.u2()?)?.to_string();
    let length = reader.u4()?;
    let mut body = reader.sub_reader(length as usize)?;

    let attribute = match name.as_str() {
        "Code" => Attribute::Code(parse_code(&mut body, pool).map_err(|e| wrap(&name, e))?),
        "SourceFile" => Attribute::SourceFile(pool.utf8(body.u2()?)?.to_string()),
        "EnclosingMethod" => {
            let class = pool.class_name(body.u2()?)?.to_string();
            let method_index = body.u2()?;
            let method = if method_index == 0 {
                None
            } else {
                let (n, d) = pool.name_and_type(method_index)?;
                Some((n.to_string(), d.to_string()))
            };
            Attribute::EnclosingMethod { class, method }
        }
        "RuntimeVisibleAnnotations" => Attribute::Annotations(
            Annotation::parse_list(&mut body, pool, true).map_err(|e| wrap(&name, e))?,
        ),
        "RuntimeInvisibleAnnotations" => Attribute::Annotations(
            Annotation::parse_list(&mut body, pool, false).map_err(|e| wrap(&name, e))?,
        ),
        "ConstantValue" => {
            let index = body.u2()?;
            match pool.get(index)? {
                Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_)
                | Constant::String { .. } => Attribute::ConstantValue(pool.resolve(index, &[])?),
                _ => {
                    return Err(ClassFileError::BadConstantIndex {
                        index,
                        expected: "ConstantValue literal",
                    })
                }
            }
        }
        "BootstrapMethods" => {
            let count = body.u2()?;
            let mut methods = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let method_ref = body.u2()?;
                let arg_count = body.u2()?;
                let arguments = (0..arg_count)
                    .map(|_| body.u2())
                    .collect::<Result<Vec<_>, _>>()?;
                methods.push(RawBootstrapMethod {
                    method_ref,
                    arguments,
                });
            }
            Attribute::BootstrapMethods(methods)
        }
        "Synthetic" => Attribute::Synthetic,
        _ => {
            return Ok(Attribute::Unknown { name, length });
        }
    };

    if !body.is_empty() {
        return Err(ClassFileError::BadAttribute {
            name,
            reason: format!("{} bytes left over after decoding", body.remaining()),
        });
    }
    Ok(attribute)
}

fn parse_code(body: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<RawCode, ClassFileError> {
    let max_stack = body.u2()?;
    let max_locals = body.u2()?;
    let code_length = body.u4()?;
    if code_length == 0 || code_length >= 65_536 {
        return Err(ClassFileError::BadAttribute {
            name: "Code".to_string(),
            reason: format!("code length {code_length} out of range"),
        });
    }
    let code = body.bytes(code_length as usize)?.to_vec();

    let table_len = body.u2()?;
    let mut exception_table = Vec::with_capacity(table_len as usize);
    for _ in 0..table_len {
        exception_table.push(RawExceptionEntry {
            start_pc: body.u2()?,
            end_pc: body.u2()?,
            handler_pc: body.u2()?,
            catch_type: body.u2()?,
        });
    }

    let mut line_numbers = Vec::new();
    let attr_count = body.u2()?;
    for _ in 0..attr_count {
        let name = pool.utf8(body.u2()?)?;
        let length = body.u4()?;
        let mut attr = body.sub_reader(length as usize)?;
        if name == "LineNumberTable" {
            let count = attr.u2()?;
            for _ in 0..count {
                line_numbers.push((attr.u2()?, attr.u2()?));
            }
        }
    }

    Ok(RawCode {
        max_stack,
        max_locals,
        code,
        exception_table,
        line_numbers,
    })
}

/// Reports errors from inside an attribute body as errors of that attribute,
/// except for ones that already carry more precise context.
fn wrap(name: &str, err: ClassFileError) -> ClassFileError {
    match err {
        ClassFileError::Truncated { .. } => ClassFileError::BadAttribute {
            name: name.to_string(),
            reason: "body shorter than its contents".to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(names: &[&str]) -> ConstantPool {
        let mut bytes = ((names.len() + 1) as u16).to_be_bytes().to_vec();
        for n in names {
            bytes.push(1);
            bytes.extend_from_slice(&(n.len() as u16).to_be_bytes());
            bytes.extend_from_slice(n.as_bytes());
        }
        ConstantPool::parse(&mut ByteReader::new(&bytes)).unwrap()
    }

    #[test]
    fn unknown_attribute_is_skipped() {
        let pool = pool_with(&["kotlin.Metadata.Extra"]);
        let mut bytes = vec![0, 1, 0, 1];
        bytes.extend_from_slice(&[0, 0, 0, 3, 9, 9, 9]);
        bytes.push(0xAA); // next structure
        let mut r = ByteReader::new(&bytes);
        let attrs = parse_attributes(&mut r, &pool).unwrap();
        assert!(matches!(
            &attrs[0],
            Attribute::Unknown { name, length: 3 } if name == "kotlin.Metadata.Extra"
        ));
        assert_eq!(r.u1().unwrap(), 0xAA);
    }

    #[test]
    fn source_file_attribute() {
        let pool = pool_with(&["SourceFile", "Main.kt"]);
        let bytes = [0, 1, 0, 1, 0, 0, 0, 2, 0, 2];
        let attrs = parse_attributes(&mut ByteReader::new(&bytes), &pool).unwrap();
        assert!(matches!(&attrs[0], Attribute::SourceFile(s) if s == "Main.kt"));
    }

    #[test]
    fn code_with_line_numbers() {
        let pool = pool_with(&["Code", "LineNumberTable"]);
        let mut body = vec![0, 1, 0, 1]; // max_stack, max_locals
        body.extend_from_slice(&[0, 0, 0, 1, 0xb1]); // return
        body.extend_from_slice(&[0, 0]); // no handlers
        body.extend_from_slice(&[0, 1, 0, 2, 0, 0, 0, 6, 0, 1, 0, 0, 0, 8]);
        let mut bytes = vec![0, 1, 0, 1];
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
        let attrs = parse_attributes(&mut ByteReader::new(&bytes), &pool).unwrap();
        match &attrs[0] {
            Attribute::Code(code) => {
                assert_eq!(code.code, vec![0xb1]);
                assert_eq!(code.line_numbers, vec![(0, 8)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_known_attribute_is_rejected() {
        let pool = pool_with(&["SourceFile", "Main.kt"]);
        let bytes = [0, 1, 0, 1, 0, 0, 0, 3, 0, 2, 0];
        let err = parse_attributes(&mut ByteReader::new(&bytes), &pool).unwrap_err();
        assert!(matches!(err, ClassFileError::BadAttribute { .. }));
    }

    #[test]
    fn empty_code_is_rejected() {
        let pool = pool_with(&["Code"]);
        let bytes = [0, 1, 0, 1, 0, 0, 0, 12, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = parse_attributes(&mut ByteReader::new(&bytes), &pool).unwrap_err();
        assert!(matches!(err, ClassFileError::BadAttribute { .. }));
    }
}
