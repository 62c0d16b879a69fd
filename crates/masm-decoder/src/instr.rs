//! Instruction decoding.
//!
//! Structured instructions (`block`, `loop`, `if`) decode their bodies
//! recursively, so the resulting [`Expr`] is a tree rather than a flat
//! opcode stream.

use masm_types::ast::{BlockType, Expr, Instr, LoadOp, MemArg, StoreOp, ValueType};
use masm_types::{DecodeError, NumericOp, Result};

use crate::reader::Reader;

const OP_ELSE: u8 = 0x05;
const OP_END: u8 = 0x0B;
const OP_PREFIX_FC: u8 = 0xFC;

/// How an instruction sequence was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    End,
    Else,
}

/// Decode an expression terminated by `end` (function bodies, constant
/// expressions, `block` and `loop` bodies).
pub fn read_expr(r: &mut Reader<'_>) -> Result<Expr> {
    let (body, terminator) = read_sequence(r, "end opcode expected")?;
    match terminator {
        Terminator::End => Ok(body),
        // Point at the `else` byte that was just consumed.
        Terminator::Else => Err(DecodeError::new(r.offset() - 1, "end opcode expected")),
    }
}

/// Decode instructions until `end` or `else`, consuming the terminator.
fn read_sequence(r: &mut Reader<'_>, missing: &str) -> Result<(Expr, Terminator)> {
    let mut body = Vec::new();
    loop {
        let Some(opcode) = r.peek() else {
            return Err(r.error(missing));
        };
        match opcode {
            OP_END => {
                r.read_byte()?;
                return Ok((body, Terminator::End));
            }
            OP_ELSE => {
                r.read_byte()?;
                return Ok((body, Terminator::Else));
            }
            _ => body.push(read_instr(r)?),
        }
    }
}

/// Decode a single (non-terminator) instruction.
pub fn read_instr(r: &mut Reader<'_>) -> Result<Instr> {
    let at = r.offset();
    let opcode = r.read_byte()?;
    let instr = match opcode {
        // ── Control ──
        0x00 => Instr::Unreachable,
        0x01 => Instr::Nop,
        0x02..=0x04 => {
            r.enter(at)?;
            let instr = read_structured(r, opcode)?;
            r.leave();
            instr
        }
        0x0C => Instr::Br {
            label: r.read_u32()?,
        },
        0x0D => Instr::BrIf {
            label: r.read_u32()?,
        },
        0x0E => {
            let labels = r.read_vec(Reader::read_u32)?;
            Instr::BrTable {
                labels,
                default: r.read_u32()?,
            }
        }
        0x0F => Instr::Return,
        0x10 => Instr::Call {
            func: r.read_u32()?,
        },
        0x11 => {
            let ty = r.read_u32()?;
            Instr::CallIndirect {
                ty,
                table: r.read_u32()?,
            }
        }

        // ── Parametric ──
        0x1A => Instr::Drop,
        0x1B => Instr::Select,

        // ── Variables ──
        0x20 => Instr::LocalGet {
            local: r.read_u32()?,
        },
        0x21 => Instr::LocalSet {
            local: r.read_u32()?,
        },
        0x22 => Instr::LocalTee {
            local: r.read_u32()?,
        },
        0x23 => Instr::GlobalGet {
            global: r.read_u32()?,
        },
        0x24 => Instr::GlobalSet {
            global: r.read_u32()?,
        },

        // ── Memory ──
        0x28..=0x35 => match LoadOp::from_opcode(opcode) {
            Some(kind) => Instr::Load {
                kind,
                arg: read_mem_arg(r)?,
            },
            None => return Err(unknown_opcode(at, opcode)),
        },
        0x36..=0x3E => match StoreOp::from_opcode(opcode) {
            Some(kind) => Instr::Store {
                kind,
                arg: read_mem_arg(r)?,
            },
            None => return Err(unknown_opcode(at, opcode)),
        },
        0x3F => Instr::MemorySize {
            mem: r.read_u32()?,
        },
        0x40 => Instr::MemoryGrow {
            mem: r.read_u32()?,
        },

        // ── Constants ──
        0x41 => Instr::I32Const {
            value: r.read_s32()?,
        },
        0x42 => Instr::I64Const {
            value: r.read_s64()?,
        },
        0x43 => {
            let bytes = r.read_bytes(4)?;
            Instr::F32Const {
                bits: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            }
        }
        0x44 => {
            let bytes = r.read_bytes(8)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Instr::F64Const {
                bits: u64::from_le_bytes(raw),
            }
        }

        OP_PREFIX_FC => {
            let sub = r.read_u32()?;
            match NumericOp::from_saturating(sub) {
                Some(kind) => Instr::Numeric { kind },
                None => {
                    return Err(DecodeError::new(
                        at,
                        format!("unknown opcode 0xfc 0x{sub:02x}"),
                    ))
                }
            }
        }

        _ => match NumericOp::from_opcode(opcode) {
            Some(kind) => Instr::Numeric { kind },
            None => return Err(unknown_opcode(at, opcode)),
        },
    };
    Ok(instr)
}

/// `block`, `loop` or `if` after its opcode byte.
fn read_structured(r: &mut Reader<'_>, opcode: u8) -> Result<Instr> {
    let ty = read_block_type(r)?;
    let instr = match opcode {
        0x02 => Instr::Block {
            ty,
            body: read_expr(r)?,
        },
        0x03 => Instr::Loop {
            ty,
            body: read_expr(r)?,
        },
        _ => {
            let (consequent, terminator) = read_sequence(r, "else or end opcode expected")?;
            let alternative = match terminator {
                Terminator::Else => read_expr(r)?,
                Terminator::End => Vec::new(),
            };
            Instr::If {
                ty,
                consequent,
                alternative,
            }
        }
    };
    Ok(instr)
}

fn unknown_opcode(at: usize, opcode: u8) -> DecodeError {
    DecodeError::new(at, format!("unknown opcode 0x{opcode:02x}"))
}

fn read_mem_arg(r: &mut Reader<'_>) -> Result<MemArg> {
    let align = r.read_u32()?;
    let offset = r.read_u32()?;
    Ok(MemArg { align, offset })
}

/// Value type tag, encoded as a single-group s7.
pub fn read_value_type(r: &mut Reader<'_>) -> Result<ValueType> {
    let at = r.offset();
    value_type_from_tag(r.read_s7()?).ok_or_else(|| DecodeError::new(at, "malformed value type"))
}

fn value_type_from_tag(tag: i8) -> Option<ValueType> {
    match tag {
        -1 => Some(ValueType::I32),
        -2 => Some(ValueType::I64),
        -3 => Some(ValueType::F32),
        -4 => Some(ValueType::F64),
        _ => None,
    }
}

/// Block type, encoded as s33: `-64` is empty, a value type tag is a single
/// result, and a non-negative value is a type index.
fn read_block_type(r: &mut Reader<'_>) -> Result<BlockType> {
    let at = r.offset();
    let raw = r.read_s33()?;
    if raw == -64 {
        return Ok(BlockType::Empty);
    }
    if let Some(ty) = i8::try_from(raw).ok().and_then(value_type_from_tag) {
        return Ok(BlockType::Value(ty));
    }
    if raw < 0 {
        return Err(DecodeError::new(at, "nonnegative type index expected"));
    }
    u32::try_from(raw)
        .map(BlockType::Func)
        .map_err(|_| DecodeError::new(at, "integer too large"))
}
