//! A small class-file emitter.
//!
//! [`ClassWriter`] produces well-formed class files from a symbolic
//! description: constants are deduplicated in the pool, method bodies are
//! assembled from [`CodeOp`]s, and `Line` markers become a `LineNumberTable`.
//! It covers what fixtures for the engine need, not the full instruction set
//! with stack-map frames.

use std::collections::HashMap;

use crate::access::AccessFlags;
use crate::annotation::{Annotation, ElementValue};
use crate::code::opcodes::*;
use crate::CLASS_MAGIC;

/// Class-file major version written by default (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// One step of a method body.
#[derive(Debug, Clone, PartialEq)]
pub enum CodeOp {
    /// An operand-less instruction (`return`, `iadd`, `dup`, ...).
    Raw(u8),
    /// Pushes an `int`, choosing `iconst_*`, `bipush`, `sipush` or `ldc`.
    Iconst(i32),
    /// Pushes a string literal.
    Ldc(String),
    /// Load, store or `ret` on a local slot; `wide` is added when needed.
    Local(u8, u16),
    /// Field access: opcode, owner, name, descriptor.
    Field(u8, String, String, String),
    /// Invocation: opcode, owner, name, descriptor.
    Invoke(u8, String, String, String),
    /// `new`, `anewarray`, `checkcast` or `instanceof` with a class operand.
    Type(u8, String),
    /// Starts source line `n` at the next instruction.
    Line(u32),
}

impl CodeOp {
    /// `invokevirtual`/`invokestatic`/... shorthand.
    pub fn invoke(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        CodeOp::Invoke(
            opcode,
            owner.to_string(),
            name.to_string(),
            descriptor.to_string(),
        )
    }

    /// `getstatic`/`putfield`/... shorthand.
    pub fn field(opcode: u8, owner: &str, name: &str, descriptor: &str) -> Self {
        CodeOp::Field(
            opcode,
            owner.to_string(),
            name.to_string(),
            descriptor.to_string(),
        )
    }
}

/// A method to be written.
#[derive(Debug, Clone)]
pub struct MethodDef {
    access: AccessFlags,
    name: String,
    descriptor: String,
    code: Option<Vec<CodeOp>>,
    annotations: Vec<Annotation>,
    max_stack: u16,
    max_locals: u16,
}

impl MethodDef {
    /// A method without a body; add one with [`code`](Self::code).
    pub fn new(access: AccessFlags, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code: None,
            annotations: Vec::new(),
            max_stack: 8,
            max_locals: 8,
        }
    }

    /// Sets the body.
    pub fn code(mut self, ops: Vec<CodeOp>) -> Self {
        self.code = Some(ops);
        self
    }

    /// Adds an annotation without elements.
    pub fn annotation(mut self, descriptor: &str, visible: bool) -> Self {
        self.annotations.push(Annotation {
            descriptor: descriptor.to_string(),
            elements: Vec::new(),
            visible,
        });
        self
    }

    /// Adds an annotation with elements.
    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Overrides the frame sizes recorded in the `Code` attribute.
    pub fn frame(mut self, max_stack: u16, max_locals: u16) -> Self {
        self.max_stack = max_stack;
        self.max_locals = max_locals;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(String),
    String(String),
    NameAndType(String, String),
    FieldRef(String, String, String),
    MethodRef(String, String, String),
    InterfaceMethodRef(String, String, String),
}

#[derive(Debug, Default)]
struct PoolBuilder {
    bytes: Vec<u8>,
    next: u16,
    index: HashMap<PoolKey, u16>,
}

impl PoolBuilder {
    fn new() -> Self {
        Self {
            next: 1,
            ..Self::default()
        }
    }

    fn intern(&mut self, key: PoolKey) -> u16 {
        if let Some(&index) = self.index.get(&key) {
            return index;
        }
        let entry = match &key {
            PoolKey::Utf8(s) => {
                let encoded = encode_modified_utf8(s);
                let mut out = vec![1];
                out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
                out.extend_from_slice(&encoded);
                out
            }
            PoolKey::Integer(v) => tagged(3, &v.to_be_bytes()),
            PoolKey::Float(bits) => tagged(4, &bits.to_be_bytes()),
            PoolKey::Long(v) => tagged(5, &v.to_be_bytes()),
            PoolKey::Double(bits) => tagged(6, &bits.to_be_bytes()),
            PoolKey::Class(name) => {
                let n = self.utf8(name);
                tagged(7, &n.to_be_bytes())
            }
            PoolKey::String(s) => {
                let n = self.utf8(s);
                tagged(8, &n.to_be_bytes())
            }
            PoolKey::NameAndType(name, desc) => {
                let n = self.utf8(name);
                let d = self.utf8(desc);
                tagged(12, &pair(n, d))
            }
            PoolKey::FieldRef(owner, name, desc)
            | PoolKey::MethodRef(owner, name, desc)
            | PoolKey::InterfaceMethodRef(owner, name, desc) => {
                let tag = match key {
                    PoolKey::FieldRef(..) => 9,
                    PoolKey::MethodRef(..) => 10,
                    _ => 11,
                };
                let c = self.class(owner);
                let nat = self.intern(PoolKey::NameAndType(name.clone(), desc.clone()));
                tagged(tag, &pair(c, nat))
            }
        };
        let index = self.next;
        let wide = matches!(key, PoolKey::Long(_) | PoolKey::Double(_));
        self.next += if wide { 2 } else { 1 };
        self.bytes.extend_from_slice(&entry);
        self.index.insert(key, index);
        index
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.intern(PoolKey::Utf8(s.to_string()))
    }

    fn class(&mut self, name: &str) -> u16 {
        self.intern(PoolKey::Class(name.to_string()))
    }
}

fn tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(tag);
    out.extend_from_slice(body);
    out
}

fn pair(a: u16, b: u16) -> [u8; 4] {
    let [a0, a1] = a.to_be_bytes();
    let [b0, b1] = b.to_be_bytes();
    [a0, a1, b0, b1]
}

/// Builds a class file.
#[derive(Debug)]
pub struct ClassWriter {
    pool: PoolBuilder,
    major: u16,
    access: AccessFlags,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<u8>,
    field_count: u16,
    methods: Vec<u8>,
    method_count: u16,
    annotations: Vec<Annotation>,
    enclosing_method: Option<(String, Option<(String, String)>)>,
    source_file: Option<String>,
}

impl ClassWriter {
    /// Starts a public class.
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut pool = PoolBuilder::new();
        let this_class = pool.class(name);
        let super_class = super_name.map(|s| pool.class(s)).unwrap_or(0);
        Self {
            pool,
            major: DEFAULT_MAJOR_VERSION,
            access: AccessFlags::PUBLIC | AccessFlags::SYNCHRONIZED,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            field_count: 0,
            methods: Vec::new(),
            method_count: 0,
            annotations: Vec::new(),
            enclosing_method: None,
            source_file: None,
        }
    }

    /// Sets the class access flags.
    pub fn access(&mut self, access: AccessFlags) -> &mut Self {
        self.access = access;
        self
    }

    /// Sets the major version.
    pub fn version(&mut self, major: u16) -> &mut Self {
        self.major = major;
        self
    }

    /// Adds an implemented interface.
    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    /// Adds a field without attributes.
    pub fn field(&mut self, access: AccessFlags, name: &str, descriptor: &str) -> &mut Self {
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        self.fields.extend_from_slice(&access.bits().to_be_bytes());
        self.fields.extend_from_slice(&pair(name, descriptor));
        self.fields.extend_from_slice(&0u16.to_be_bytes());
        self.field_count += 1;
        self
    }

    /// Adds a method.
    pub fn method(&mut self, def: MethodDef) -> &mut Self {
        let name = self.pool.utf8(&def.name);
        let descriptor = self.pool.utf8(&def.descriptor);
        let mut attributes = Vec::new();
        if let Some(ops) = &def.code {
            attributes.push(self.code_attribute(ops, def.max_stack, def.max_locals));
        }
        attributes.extend(self.annotation_attributes(&def.annotations));

        self.methods
            .extend_from_slice(&def.access.bits().to_be_bytes());
        self.methods.extend_from_slice(&pair(name, descriptor));
        self.methods
            .extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            self.methods.extend_from_slice(&attribute);
        }
        self.method_count += 1;
        self
    }

    /// Adds a class annotation.
    pub fn annotation(&mut self, annotation: Annotation) -> &mut Self {
        self.annotations.push(annotation);
        self
    }

    /// Records the `EnclosingMethod` attribute.
    pub fn enclosing_method(&mut self, class: &str, method: Option<(&str, &str)>) -> &mut Self {
        self.enclosing_method = Some((
            class.to_string(),
            method.map(|(n, d)| (n.to_string(), d.to_string())),
        ));
        self
    }

    /// Records the `SourceFile` attribute.
    pub fn source_file(&mut self, name: &str) -> &mut Self {
        self.source_file = Some(name.to_string());
        self
    }

    /// Serializes the class.
    pub fn finish(mut self) -> Vec<u8> {
        let mut attributes = Vec::new();
        if let Some(file) = self.source_file.take() {
            let value = self.pool.utf8(&file);
            attributes.push(self.attribute("SourceFile", &value.to_be_bytes()));
        }
        if let Some((class, method)) = self.enclosing_method.take() {
            let class = self.pool.class(&class);
            let method = method
                .map(|(n, d)| self.pool.intern(PoolKey::NameAndType(n, d)))
                .unwrap_or(0);
            attributes.push(self.attribute("EnclosingMethod", &pair(class, method)));
        }
        let annotations = std::mem::take(&mut self.annotations);
        attributes.extend(self.annotation_attributes(&annotations));

        let mut out = Vec::new();
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&self.pool.next.to_be_bytes());
        out.extend_from_slice(&self.pool.bytes);
        out.extend_from_slice(&self.access.bits().to_be_bytes());
        out.extend_from_slice(&pair(self.this_class, self.super_class));
        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        out.extend_from_slice(&self.field_count.to_be_bytes());
        out.extend_from_slice(&self.fields);
        out.extend_from_slice(&self.method_count.to_be_bytes());
        out.extend_from_slice(&self.methods);
        out.extend_from_slice(&(attributes.len() as u16).to_be_bytes());
        for attribute in attributes {
            out.extend_from_slice(&attribute);
        }
        out
    }

    fn attribute(&mut self, name: &str, body: &[u8]) -> Vec<u8> {
        let name = self.pool.utf8(name);
        let mut out = name.to_be_bytes().to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn code_attribute(&mut self, ops: &[CodeOp], max_stack: u16, max_locals: u16) -> Vec<u8> {
        let mut code = Vec::new();
        let mut lines: Vec<(u16, u16)> = Vec::new();
        for op in ops {
            match op {
                CodeOp::Line(line) => lines.push((code.len() as u16, *line as u16)),
                CodeOp::Raw(opcode) => code.push(*opcode),
                CodeOp::Iconst(v) => match *v {
                    -1..=5 => code.push((ICONST_0 as i32 + v) as u8),
                    -128..=127 => code.extend_from_slice(&[BIPUSH, *v as i8 as u8]),
                    -32768..=32767 => {
                        code.push(SIPUSH);
                        code.extend_from_slice(&(*v as i16).to_be_bytes());
                    }
                    _ => {
                        let index = self.pool.intern(PoolKey::Integer(*v));
                        push_ldc(&mut code, index);
                    }
                },
                CodeOp::Ldc(s) => {
                    let index = self.pool.intern(PoolKey::String(s.clone()));
                    push_ldc(&mut code, index);
                }
                CodeOp::Local(opcode, slot) => {
                    if *slot <= u8::MAX as u16 {
                        code.extend_from_slice(&[*opcode, *slot as u8]);
                    } else {
                        code.extend_from_slice(&[WIDE, *opcode]);
                        code.extend_from_slice(&slot.to_be_bytes());
                    }
                }
                CodeOp::Field(opcode, owner, name, desc) => {
                    let index = self.pool.intern(PoolKey::FieldRef(
                        owner.clone(),
                        name.clone(),
                        desc.clone(),
                    ));
                    code.push(*opcode);
                    code.extend_from_slice(&index.to_be_bytes());
                }
                CodeOp::Invoke(opcode, owner, name, desc) => {
                    let (owner, name, desc) = (owner.clone(), name.clone(), desc.clone());
                    if *opcode == INVOKEINTERFACE {
                        let count = 1 + argument_slots(&desc);
                        let index = self
                            .pool
                            .intern(PoolKey::InterfaceMethodRef(owner, name, desc));
                        code.push(INVOKEINTERFACE);
                        code.extend_from_slice(&index.to_be_bytes());
                        code.extend_from_slice(&[count, 0]);
                    } else {
                        let index = self.pool.intern(PoolKey::MethodRef(owner, name, desc));
                        code.push(*opcode);
                        code.extend_from_slice(&index.to_be_bytes());
                    }
                }
                CodeOp::Type(opcode, class) => {
                    let index = self.pool.class(class);
                    code.push(*opcode);
                    code.extend_from_slice(&index.to_be_bytes());
                }
            }
        }

        let mut body = Vec::new();
        body.extend_from_slice(&pair(max_stack, max_locals));
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(&code);
        body.extend_from_slice(&0u16.to_be_bytes());
        if lines.is_empty() {
            body.extend_from_slice(&0u16.to_be_bytes());
        } else {
            let mut table = (lines.len() as u16).to_be_bytes().to_vec();
            for (pc, line) in &lines {
                table.extend_from_slice(&pair(*pc, *line));
            }
            body.extend_from_slice(&1u16.to_be_bytes());
            let attribute = self.attribute("LineNumberTable", &table);
            body.extend_from_slice(&attribute);
        }
        self.attribute("Code", &body)
    }

    fn annotation_attributes(&mut self, annotations: &[Annotation]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for (visible, name) in [
            (true, "RuntimeVisibleAnnotations"),
            (false, "RuntimeInvisibleAnnotations"),
        ] {
            let group: Vec<&Annotation> =
                annotations.iter().filter(|a| a.visible == visible).collect();
            if group.is_empty() {
                continue;
            }
            let mut body = (group.len() as u16).to_be_bytes().to_vec();
            for annotation in group {
                self.encode_annotation(annotation, &mut body);
            }
            out.push(self.attribute(name, &body));
        }
        out
    }

    fn encode_annotation(&mut self, annotation: &Annotation, out: &mut Vec<u8>) {
        let descriptor = self.pool.utf8(&annotation.descriptor);
        out.extend_from_slice(&descriptor.to_be_bytes());
        out.extend_from_slice(&(annotation.elements.len() as u16).to_be_bytes());
        for (name, value) in &annotation.elements {
            let name = self.pool.utf8(name);
            out.extend_from_slice(&name.to_be_bytes());
            self.encode_element(value, out);
        }
    }

    fn encode_element(&mut self, value: &ElementValue, out: &mut Vec<u8>) {
        let (tag, index) = match value {
            ElementValue::Byte(v) => (b'B', self.pool.intern(PoolKey::Integer(*v as i32))),
            ElementValue::Char(v) => (b'C', self.pool.intern(PoolKey::Integer(*v as i32))),
            ElementValue::Int(v) => (b'I', self.pool.intern(PoolKey::Integer(*v))),
            ElementValue::Short(v) => (b'S', self.pool.intern(PoolKey::Integer(*v as i32))),
            ElementValue::Boolean(v) => (b'Z', self.pool.intern(PoolKey::Integer(*v as i32))),
            ElementValue::Double(bits) => (b'D', self.pool.intern(PoolKey::Double(*bits))),
            ElementValue::Float(bits) => (b'F', self.pool.intern(PoolKey::Float(*bits))),
            ElementValue::Long(v) => (b'J', self.pool.intern(PoolKey::Long(*v))),
            ElementValue::String(s) => (b's', self.pool.utf8(s)),
            ElementValue::Class(c) => (b'c', self.pool.utf8(c)),
            ElementValue::Enum {
                type_descriptor,
                constant,
            } => {
                let t = self.pool.utf8(type_descriptor);
                let c = self.pool.utf8(constant);
                out.push(b'e');
                out.extend_from_slice(&pair(t, c));
                return;
            }
            ElementValue::Annotation(nested) => {
                out.push(b'@');
                self.encode_annotation(nested, out);
                return;
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for v in values {
                    self.encode_element(v, out);
                }
                return;
            }
        };
        out.push(tag);
        out.extend_from_slice(&index.to_be_bytes());
    }
}

fn push_ldc(code: &mut Vec<u8>, index: u16) {
    if index <= u8::MAX as u16 {
        code.extend_from_slice(&[LDC, index as u8]);
    } else {
        code.push(LDC_W);
        code.extend_from_slice(&index.to_be_bytes());
    }
}

/// Number of local slots taken by a method descriptor's parameters.
fn argument_slots(descriptor: &str) -> u8 {
    let params = descriptor
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .unwrap_or("");
    let mut slots = 0u8;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            'J' | 'D' => slots += 2,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                slots += 1;
            }
            '[' => {
                let mut next = chars.next();
                while next == Some('[') {
                    next = chars.next();
                }
                if next == Some('L') {
                    for c in chars.by_ref() {
                        if c == ';' {
                            break;
                        }
                    }
                }
                slots += 1;
            }
            _ => slots += 1,
        }
    }
    slots
}

/// Encodes a string as modified UTF-8.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}
