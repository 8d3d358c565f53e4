//! Bytecode decoding into constant-pool-resolved instructions.
//!
//! The decoder normalizes encodings that differ only in width (`ldc`/`ldc_w`,
//! `goto`/`goto_w`, `wide` local accesses) and turns branch offsets into
//! instruction indices. Two method bodies therefore compare equal whenever
//! they execute the same instructions against the same symbolic constants,
//! regardless of constant-pool layout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constant_pool::{ConstantPool, MemberRef, RawBootstrapMethod, ResolvedConstant};
use crate::error::ClassFileError;
use crate::reader::ByteReader;

/// Opcode constants used by the decoder and the writer.
#[allow(missing_docs)]
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_5: u8 = 0x08;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const LDC2_W: u8 = 0x14;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const IADD: u8 = 0x60;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

use opcodes::*;

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode, with width variants folded into their narrow form.
    pub opcode: u8,
    /// The resolved operand.
    pub operand: Operand,
}

/// An instruction operand with constant-pool indices and branch offsets resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// No operand.
    None,
    /// Immediate integer (`bipush`, `sipush`, `newarray` element type).
    Int(i32),
    /// Local variable slot.
    Local(u16),
    /// `iinc` slot and delta.
    Increment {
        /// Local variable slot.
        local: u16,
        /// Signed increment.
        delta: i16,
    },
    /// `ldc` family constant.
    Constant(ResolvedConstant),
    /// Field access or method invocation target.
    Member(MemberRef),
    /// `invokedynamic` call site.
    CallSite(ResolvedConstant),
    /// Class operand of `new`, `anewarray`, `checkcast`, `instanceof`.
    Type(String),
    /// `multianewarray` operand.
    MultiArray {
        /// Array class descriptor.
        class: String,
        /// Number of dimensions to allocate.
        dimensions: u8,
    },
    /// Branch target as an instruction index.
    Branch(u32),
    /// `tableswitch` targets as instruction indices.
    TableSwitch {
        /// Default target.
        default: u32,
        /// Lowest key.
        low: i32,
        /// Targets for keys `low..=low + targets.len() - 1`.
        targets: Vec<u32>,
    },
    /// `lookupswitch` targets as instruction indices.
    LookupSwitch {
        /// Default target.
        default: u32,
        /// `(key, target)` pairs in key order.
        pairs: Vec<(i32, u32)>,
    },
}

/// Operand form while branch targets are still byte offsets.
enum RawOperand {
    Done(Operand),
    Branch(i64),
    TableSwitch {
        default: i64,
        low: i32,
        targets: Vec<i64>,
    },
    LookupSwitch {
        default: i64,
        pairs: Vec<(i32, i64)>,
    },
}

/// Context needed to resolve operands.
pub struct DecodeContext<'a> {
    /// The class's constant pool.
    pub pool: &'a ConstantPool,
    /// The class's bootstrap methods.
    pub bootstraps: &'a [RawBootstrapMethod],
}

/// A decoded method body.
#[derive(Debug, Clone, Default)]
pub struct DecodedCode {
    /// Instructions in order.
    pub instructions: Vec<Instruction>,
    /// Byte offset of each instruction.
    pub offsets: Vec<u32>,
}

impl DecodedCode {
    /// Maps a byte offset to an instruction index.
    ///
    /// The code length maps to `instructions.len()`, which is how exception
    /// ranges express "until the end".
    pub fn index_of(&self, pc: u32, code_len: u32) -> Option<u32> {
        if pc == code_len {
            return Some(self.instructions.len() as u32);
        }
        self.offsets.binary_search(&pc).ok().map(|i| i as u32)
    }
}

/// Returns `true` for opcodes the JVM defines.
pub fn is_defined(opcode: u8) -> bool {
    opcode <= JSR_W
}

/// Decodes a `Code` attribute's bytecode.
pub fn decode(code: &[u8], ctx: &DecodeContext<'_>) -> Result<DecodedCode, ClassFileError> {
    let mut reader = ByteReader::new(code);
    let mut raw = Vec::new();
    let mut offsets = Vec::new();

    while !reader.is_empty() {
        let pc = reader.position() as u32;
        let opcode = reader.u1()?;
        let (opcode, operand) =
            decode_one(opcode, pc, &mut reader, ctx).map_err(|e| match e {
                ClassFileError::Truncated { .. } => ClassFileError::BadBytecode {
                    pc,
                    reason: format!("operand of opcode {opcode:#04x} runs past end of code"),
                },
                other => other,
            })?;
        offsets.push(pc);
        raw.push((opcode, operand));
    }

    let index: HashMap<u32, u32> = offsets
        .iter()
        .enumerate()
        .map(|(i, &pc)| (pc, i as u32))
        .collect();
    let target = |from: u32, abs: i64| -> Result<u32, ClassFileError> {
        u32::try_from(abs)
            .ok()
            .and_then(|pc| index.get(&pc).copied())
            .ok_or_else(|| ClassFileError::BadBytecode {
                pc: from,
                reason: format!("branch target {abs} is not an instruction boundary"),
            })
    };

    let mut instructions = Vec::with_capacity(raw.len());
    for ((opcode, operand), &pc) in raw.into_iter().zip(offsets.iter()) {
        let operand = match operand {
            RawOperand::Done(op) => op,
            RawOperand::Branch(abs) => Operand::Branch(target(pc, abs)?),
            RawOperand::TableSwitch {
                default,
                low,
                targets,
            } => Operand::TableSwitch {
                default: target(pc, default)?,
                low,
                targets: targets
                    .into_iter()
                    .map(|t| target(pc, t))
                    .collect::<Result<_, _>>()?,
            },
            RawOperand::LookupSwitch { default, pairs } => Operand::LookupSwitch {
                default: target(pc, default)?,
                pairs: pairs
                    .into_iter()
                    .map(|(k, t)| Ok((k, target(pc, t)?)))
                    .collect::<Result<_, ClassFileError>>()?,
            },
        };
        instructions.push(Instruction { opcode, operand });
    }

    Ok(DecodedCode {
        instructions,
        offsets,
    })
}

fn decode_one(
    opcode: u8,
    pc: u32,
    r: &mut ByteReader<'_>,
    ctx: &DecodeContext<'_>,
) -> Result<(u8, RawOperand), ClassFileError> {
    let done = |op: Operand| -> Result<RawOperand, ClassFileError> { Ok(RawOperand::Done(op)) };
    let operand = match opcode {
        BIPUSH => done(Operand::Int(r.i1()? as i32)),
        SIPUSH => done(Operand::Int(r.i2()? as i32)),
        NEWARRAY => done(Operand::Int(r.u1()? as i32)),
        LDC => done(Operand::Constant(ctx.pool.resolve(r.u1()? as u16, ctx.bootstraps)?)),
        LDC_W | LDC2_W => done(Operand::Constant(ctx.pool.resolve(r.u2()?, ctx.bootstraps)?)),
        ILOAD..=ALOAD | ISTORE..=ASTORE | RET => done(Operand::Local(r.u1()? as u16)),
        IINC => done(Operand::Increment {
            local: r.u1()? as u16,
            delta: r.i1()? as i16,
        }),
        IFEQ..=JSR | IFNULL | IFNONNULL => Ok(RawOperand::Branch(pc as i64 + r.i2()? as i64)),
        GOTO_W | JSR_W => Ok(RawOperand::Branch(pc as i64 + r.i4()? as i64)),
        TABLESWITCH => {
            skip_padding(r, pc)?;
            let default = pc as i64 + r.i4()? as i64;
            let low = r.i4()?;
            let high = r.i4()?;
            if high < low {
                return Err(ClassFileError::BadBytecode {
                    pc,
                    reason: format!("tableswitch high {high} below low {low}"),
                });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            if count > r.remaining() / 4 {
                return Err(ClassFileError::BadBytecode {
                    pc,
                    reason: "tableswitch jump table runs past end of code".to_string(),
                });
            }
            let targets = (0..count)
                .map(|_| Ok(pc as i64 + r.i4()? as i64))
                .collect::<Result<Vec<_>, ClassFileError>>()?;
            Ok(RawOperand::TableSwitch {
                default,
                low,
                targets,
            })
        }
        LOOKUPSWITCH => {
            skip_padding(r, pc)?;
            let default = pc as i64 + r.i4()? as i64;
            let npairs = r.i4()?;
            if npairs < 0 || npairs as usize > r.remaining() / 8 {
                return Err(ClassFileError::BadBytecode {
                    pc,
                    reason: format!("lookupswitch has invalid pair count {npairs}"),
                });
            }
            let pairs = (0..npairs)
                .map(|_| Ok((r.i4()?, pc as i64 + r.i4()? as i64)))
                .collect::<Result<Vec<_>, ClassFileError>>()?;
            Ok(RawOperand::LookupSwitch { default, pairs })
        }
        GETSTATIC..=INVOKESTATIC => done(Operand::Member(ctx.pool.member_ref(r.u2()?)?)),
        INVOKEINTERFACE => {
            let member = ctx.pool.member_ref(r.u2()?)?;
            r.skip(2)?; // count and the mandatory zero byte
            done(Operand::Member(member))
        }
        INVOKEDYNAMIC => {
            let site = ctx.pool.resolve(r.u2()?, ctx.bootstraps)?;
            r.skip(2)?;
            done(Operand::CallSite(site))
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
            done(Operand::Type(ctx.pool.class_name(r.u2()?)?.to_string()))
        }
        MULTIANEWARRAY => done(Operand::MultiArray {
            class: ctx.pool.class_name(r.u2()?)?.to_string(),
            dimensions: r.u1()?,
        }),
        WIDE => {
            let inner = r.u1()?;
            return match inner {
                IINC => Ok((
                    IINC,
                    RawOperand::Done(Operand::Increment {
                        local: r.u2()?,
                        delta: r.i2()?,
                    }),
                )),
                ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                    Ok((inner, RawOperand::Done(Operand::Local(r.u2()?))))
                }
                _ => Err(ClassFileError::BadBytecode {
                    pc,
                    reason: format!("opcode {inner:#04x} cannot be widened"),
                }),
            };
        }
        op if is_defined(op) => done(Operand::None),
        op => {
            return Err(ClassFileError::BadBytecode {
                pc,
                reason: format!("undefined opcode {op:#04x}"),
            })
        }
    }?;

    let normalized = match opcode {
        LDC_W => LDC,
        GOTO_W => GOTO,
        JSR_W => JSR,
        other => other,
    };
    Ok((normalized, operand))
}

/// Skips the 0-3 padding bytes that align switch operands to a 4-byte boundary.
fn skip_padding(r: &mut ByteReader<'_>, pc: u32) -> Result<(), ClassFileError> {
    let pad = (4 - ((pc as usize + 1) % 4)) % 4;
    r.skip(pad)
}
