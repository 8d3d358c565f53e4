//! Class-file parsing entry points.

use std::collections::BTreeSet;

use livepatch_common::ContentHash;

use crate::access::AccessFlags;
use crate::annotation::Annotation;
use crate::attribute::{parse_attributes, Attribute, RawCode};
use crate::code::{decode, DecodeContext};
use crate::constant_pool::{ConstantPool, RawBootstrapMethod};
use crate::error::ClassFileError;
use crate::model::{ClassModel, EnclosingMethod, ExceptionHandler, FieldModel, MethodModel};
use crate::reader::ByteReader;
use crate::{CLASS_MAGIC, MAX_MAJOR_VERSION, MIN_MAJOR_VERSION};

/// Method annotations that mark a function as inline by default.
pub const DEFAULT_INLINE_MARKERS: &[&str] = &["Lkotlin/internal/InlineOnly;"];

/// Knobs that change how a class is interpreted, not how it is decoded.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Annotation descriptors that flag a method as an inline function.
    pub inline_markers: Vec<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            inline_markers: DEFAULT_INLINE_MARKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ParseOptions {
    /// Default markers plus `extra`.
    pub fn with_inline_markers<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options = Self::default();
        for marker in extra {
            let marker = marker.into();
            if !options.inline_markers.contains(&marker) {
                options.inline_markers.push(marker);
            }
        }
        options
    }
}

struct PendingMethod {
    name: String,
    descriptor: String,
    access: AccessFlags,
    code: Option<RawCode>,
    annotations: Vec<Annotation>,
}

impl ClassModel {
    /// Parses a class file with default options.
    pub fn parse(bytes: &[u8]) -> Result<ClassModel, ClassFileError> {
        Self::parse_with(bytes, &ParseOptions::default())
    }

    /// Parses a class file.
    pub fn parse_with(bytes: &[u8], options: &ParseOptions) -> Result<ClassModel, ClassFileError> {
        let mut r = ByteReader::new(bytes);

        let magic = r.u4()?;
        if magic != CLASS_MAGIC {
            return Err(ClassFileError::BadMagic { found: magic });
        }
        let minor = r.u2()?;
        let major = r.u2()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
            return Err(ClassFileError::UnsupportedVersion { major, minor });
        }

        let pool = ConstantPool::parse(&mut r)?;
        let access = AccessFlags::from_bits(r.u2()?);
        let name = pool.class_name(r.u2()?)?.to_string();
        let super_name = pool.optional_class_name(r.u2()?)?.map(str::to_string);
        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?.to_string());
        }

        let field_count = r.u2()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(parse_field(&mut r, &pool)?);
        }

        let method_count = r.u2()?;
        let mut pending = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            pending.push(parse_method(&mut r, &pool)?);
        }

        let mut annotations = Vec::new();
        let mut enclosing_method = None;
        let mut source_file_name = None;
        let mut bootstraps: Vec<RawBootstrapMethod> = Vec::new();
        for attribute in parse_attributes(&mut r, &pool)? {
            match attribute {
                Attribute::Annotations(list) => annotations.extend(list),
                Attribute::EnclosingMethod { class, method } => {
                    enclosing_method = Some(EnclosingMethod { class, method })
                }
                Attribute::SourceFile(file) => source_file_name = Some(file),
                Attribute::BootstrapMethods(methods) => bootstraps = methods,
                _ => {}
            }
        }
        annotations.sort_by_key(|a| !a.visible);

        if !r.is_empty() {
            return Err(ClassFileError::TrailingBytes {
                count: r.remaining(),
            });
        }

        let ctx = DecodeContext {
            pool: &pool,
            bootstraps: &bootstraps,
        };
        let methods = pending
            .into_iter()
            .map(|m| finish_method(m, &ctx, options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ClassModel {
            name,
            super_name,
            interfaces,
            access,
            version: (major, minor),
            fields,
            methods,
            annotations,
            enclosing_method,
            source_file_name,
            content_hash: ContentHash::from_bytes(bytes),
        })
    }
}

fn parse_field(r: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<FieldModel, ClassFileError> {
    let mut access = AccessFlags::from_bits(r.u2()?);
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();
    let mut constant_value = None;
    for attribute in parse_attributes(r, pool)? {
        match attribute {
            Attribute::ConstantValue(value) => constant_value = Some(value),
            Attribute::Synthetic => access = access | AccessFlags::SYNTHETIC,
            _ => {}
        }
    }
    Ok(FieldModel {
        name,
        descriptor,
        access,
        constant_value,
    })
}

fn parse_method(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<PendingMethod, ClassFileError> {
    let mut access = AccessFlags::from_bits(r.u2()?);
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();
    let mut code = None;
    let mut annotations = Vec::new();
    for attribute in parse_attributes(r, pool)? {
        match attribute {
            Attribute::Code(raw) => {
                if code.is_some() {
                    return Err(ClassFileError::BadAttribute {
                        name: "Code".to_string(),
                        reason: format!("method {name}{descriptor} has more than one"),
                    });
                }
                code = Some(raw);
            }
            Attribute::Annotations(list) => annotations.extend(list),
            Attribute::Synthetic => access = access | AccessFlags::SYNTHETIC,
            _ => {}
        }
    }
    annotations.sort_by_key(|a| !a.visible);
    Ok(PendingMethod {
        name,
        descriptor,
        access,
        code,
        annotations,
    })
}

fn finish_method(
    method: PendingMethod,
    ctx: &DecodeContext<'_>,
    options: &ParseOptions,
) -> Result<MethodModel, ClassFileError> {
    let is_inline = method
        .annotations
        .iter()
        .any(|a| options.inline_markers.iter().any(|m| *m == a.descriptor));

    let (instructions, handlers, lines) = match method.code {
        None => (Vec::new(), Vec::new(), BTreeSet::new()),
        Some(raw) => {
            let decoded = decode(&raw.code, ctx)?;
            let code_len = raw.code.len() as u32;
            let boundary = |pc: u16| {
                decoded
                    .index_of(pc as u32, code_len)
                    .ok_or_else(|| ClassFileError::BadAttribute {
                        name: "Code".to_string(),
                        reason: format!(
                            "exception table offset {pc} in {}{} is not an instruction boundary",
                            method.name, method.descriptor
                        ),
                    })
            };
            let handlers = raw
                .exception_table
                .iter()
                .map(|e| {
                    Ok(ExceptionHandler {
                        start: boundary(e.start_pc)?,
                        end: boundary(e.end_pc)?,
                        handler: boundary(e.handler_pc)?,
                        catch_type: ctx
                            .pool
                            .optional_class_name(e.catch_type)?
                            .map(str::to_string),
                    })
                })
                .collect::<Result<Vec<_>, ClassFileError>>()?;
            let lines = raw
                .line_numbers
                .iter()
                .map(|&(_, line)| line as u32)
                .collect();
            (decoded.instructions, handlers, lines)
        }
    };

    Ok(MethodModel {
        name: method.name,
        descriptor: method.descriptor,
        access: method.access,
        instructions,
        handlers,
        lines,
        annotations: method.annotations,
        is_inline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{ClassWriter, CodeOp, MethodDef};

    fn sample() -> Vec<u8> {
        let mut w = ClassWriter::new("com/example/MainKt", Some("java/lang/Object"));
        w.source_file("Main.kt");
        w.field(AccessFlags::PRIVATE | AccessFlags::STATIC, "count", "I");
        w.method(
            MethodDef::new(AccessFlags::PUBLIC | AccessFlags::STATIC, "greet", "()I").code(vec![
                CodeOp::Line(7),
                CodeOp::Iconst(3),
                CodeOp::Line(8),
                CodeOp::Raw(crate::code::opcodes::IRETURN),
            ]),
        );
        w.finish()
    }

    #[test]
    fn parses_written_class() {
        let model = ClassModel::parse(&sample()).unwrap();
        assert_eq!(model.name, "com/example/MainKt");
        assert_eq!(model.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(model.source_file_name.as_deref(), Some("Main.kt"));
        assert_eq!(model.fields.len(), 1);
        let greet = model.method("greet", "()I").unwrap();
        assert_eq!(greet.lines, BTreeSet::from([7, 8]));
        assert_eq!(greet.instructions.len(), 2);
        assert!(!greet.is_inline);
    }

    #[test]
    fn identical_bytes_give_equal_models() {
        let bytes = sample();
        assert_eq!(
            ClassModel::parse(&bytes).unwrap(),
            ClassModel::parse(&bytes).unwrap()
        );
    }

    #[test]
    fn bad_magic() {
        let mut bytes = sample();
        bytes[0] = 0;
        assert!(matches!(
            ClassModel::parse(&bytes),
            Err(ClassFileError::BadMagic { .. })
        ));
    }

    #[test]
    fn unsupported_version() {
        let mut bytes = sample();
        bytes[6] = 0x00;
        bytes[7] = 0x20;
        assert_eq!(
            ClassModel::parse(&bytes).unwrap_err(),
            ClassFileError::UnsupportedVersion {
                major: 0x20,
                minor: 0
            }
        );
    }

    #[test]
    fn truncated_and_trailing_input() {
        let bytes = sample();
        assert!(ClassModel::parse(&bytes[..bytes.len() - 3]).is_err());
        let mut longer = bytes.clone();
        longer.push(0);
        assert_eq!(
            ClassModel::parse(&longer).unwrap_err(),
            ClassFileError::TrailingBytes { count: 1 }
        );
    }

    #[test]
    fn inline_marker_from_options() {
        let mut w = ClassWriter::new("a/Util", Some("java/lang/Object"));
        w.method(
            MethodDef::new(AccessFlags::PUBLIC | AccessFlags::STATIC, "twice", "()V")
                .annotation("Lcom/example/Inline;", false)
                .code(vec![CodeOp::Raw(crate::code::opcodes::RETURN)]),
        );
        let bytes = w.finish();
        let plain = ClassModel::parse(&bytes).unwrap();
        assert!(!plain.methods[0].is_inline);
        let options = ParseOptions::with_inline_markers(["Lcom/example/Inline;"]);
        let marked = ClassModel::parse_with(&bytes, &options).unwrap();
        assert!(marked.methods[0].is_inline);
    }
}
