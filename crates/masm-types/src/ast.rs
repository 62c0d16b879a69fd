//! Decoded module representation.
//!
//! The shapes here mirror the binary format section by section: index
//! spaces are positional, imports are kept apart from definitions, and
//! nothing has been validated. Unifying imports with definitions happens in
//! the code generator.

use serde::{Deserialize, Serialize};

use crate::numeric::NumericOp;

// ══════════════════════════════════════════════════════════════════════════════
// Types
// ══════════════════════════════════════════════════════════════════════════════

/// A primitive value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `(params) -> (results)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

/// Size limits of a memory or table, in pages or elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub min: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

/// Element type of a table. Only `funcref` exists in the MVP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    FuncRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableType {
    pub elem: ElemType,
    pub limits: Limits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalType {
    pub value_type: ValueType,
    pub mutable: bool,
}

/// The signature annotation on `block`, `loop` and `if`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Empty,
    Value(ValueType),
    Func(u32),
}

/// Alignment hint and static offset of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

// ══════════════════════════════════════════════════════════════════════════════
// Instructions
// ══════════════════════════════════════════════════════════════════════════════

/// Memory loads, by result type and access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOp {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

impl LoadOp {
    /// Opcodes 0x28–0x35.
    pub fn from_opcode(byte: u8) -> Option<Self> {
        Some(match byte {
            0x28 => Self::I32Load,
            0x29 => Self::I64Load,
            0x2A => Self::F32Load,
            0x2B => Self::F64Load,
            0x2C => Self::I32Load8S,
            0x2D => Self::I32Load8U,
            0x2E => Self::I32Load16S,
            0x2F => Self::I32Load16U,
            0x30 => Self::I64Load8S,
            0x31 => Self::I64Load8U,
            0x32 => Self::I64Load16S,
            0x33 => Self::I64Load16U,
            0x34 => Self::I64Load32S,
            0x35 => Self::I64Load32U,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::I32Load => "i32.load",
            Self::I64Load => "i64.load",
            Self::F32Load => "f32.load",
            Self::F64Load => "f64.load",
            Self::I32Load8S => "i32.load8_s",
            Self::I32Load8U => "i32.load8_u",
            Self::I32Load16S => "i32.load16_s",
            Self::I32Load16U => "i32.load16_u",
            Self::I64Load8S => "i64.load8_s",
            Self::I64Load8U => "i64.load8_u",
            Self::I64Load16S => "i64.load16_s",
            Self::I64Load16U => "i64.load16_u",
            Self::I64Load32S => "i64.load32_s",
            Self::I64Load32U => "i64.load32_u",
        }
    }
}

/// Memory stores, by operand type and access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

impl StoreOp {
    /// Opcodes 0x36–0x3E.
    pub fn from_opcode(byte: u8) -> Option<Self> {
        Some(match byte {
            0x36 => Self::I32Store,
            0x37 => Self::I64Store,
            0x38 => Self::F32Store,
            0x39 => Self::F64Store,
            0x3A => Self::I32Store8,
            0x3B => Self::I32Store16,
            0x3C => Self::I64Store8,
            0x3D => Self::I64Store16,
            0x3E => Self::I64Store32,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::I32Store => "i32.store",
            Self::I64Store => "i64.store",
            Self::F32Store => "f32.store",
            Self::F64Store => "f64.store",
            Self::I32Store8 => "i32.store8",
            Self::I32Store16 => "i32.store16",
            Self::I64Store8 => "i64.store8",
            Self::I64Store16 => "i64.store16",
            Self::I64Store32 => "i64.store32",
        }
    }
}

/// A single instruction. Structured instructions own their bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    // ── Control ──
    Unreachable,
    Nop,
    Block {
        ty: BlockType,
        body: Expr,
    },
    Loop {
        ty: BlockType,
        body: Expr,
    },
    If {
        ty: BlockType,
        consequent: Expr,
        alternative: Expr,
    },
    Br {
        label: u32,
    },
    BrIf {
        label: u32,
    },
    BrTable {
        labels: Vec<u32>,
        default: u32,
    },
    Return,
    Call {
        func: u32,
    },
    CallIndirect {
        ty: u32,
        table: u32,
    },

    // ── Parametric ──
    Drop,
    Select,

    // ── Variables ──
    LocalGet {
        local: u32,
    },
    LocalSet {
        local: u32,
    },
    LocalTee {
        local: u32,
    },
    GlobalGet {
        global: u32,
    },
    GlobalSet {
        global: u32,
    },

    // ── Memory ──
    Load {
        kind: LoadOp,
        arg: MemArg,
    },
    Store {
        kind: StoreOp,
        arg: MemArg,
    },
    MemorySize {
        mem: u32,
    },
    MemoryGrow {
        mem: u32,
    },

    // ── Constants ──
    I32Const {
        value: i32,
    },
    I64Const {
        value: i64,
    },
    /// Raw IEEE-754 bits; floats are never interpreted.
    F32Const {
        bits: u32,
    },
    F64Const {
        bits: u64,
    },

    // ── Everything else ──
    Numeric {
        kind: NumericOp,
    },
}

impl Instr {
    /// Text-format name of the instruction, used in diagnostics.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Nop => "nop",
            Self::Block { .. } => "block",
            Self::Loop { .. } => "loop",
            Self::If { .. } => "if",
            Self::Br { .. } => "br",
            Self::BrIf { .. } => "br_if",
            Self::BrTable { .. } => "br_table",
            Self::Return => "return",
            Self::Call { .. } => "call",
            Self::CallIndirect { .. } => "call_indirect",
            Self::Drop => "drop",
            Self::Select => "select",
            Self::LocalGet { .. } => "local.get",
            Self::LocalSet { .. } => "local.set",
            Self::LocalTee { .. } => "local.tee",
            Self::GlobalGet { .. } => "global.get",
            Self::GlobalSet { .. } => "global.set",
            Self::Load { kind, .. } => kind.mnemonic(),
            Self::Store { kind, .. } => kind.mnemonic(),
            Self::MemorySize { .. } => "memory.size",
            Self::MemoryGrow { .. } => "memory.grow",
            Self::I32Const { .. } => "i32.const",
            Self::I64Const { .. } => "i64.const",
            Self::F32Const { .. } => "f32.const",
            Self::F64Const { .. } => "f64.const",
            Self::Numeric { kind } => kind.mnemonic(),
        }
    }
}

/// An instruction sequence, as found in function bodies and constant
/// expressions.
pub type Expr = Vec<Instr>;

// ══════════════════════════════════════════════════════════════════════════════
// Module
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportDesc {
    Func { ty: u32 },
    Table { ty: TableType },
    Mem { limits: Limits },
    Global { ty: GlobalType },
}

/// `(import "module" "name" desc)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Func,
    Table,
    Mem,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// A function definition: the function-section type index zipped with its
/// code-section entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func {
    pub ty: u32,
    pub locals: Vec<ValueType>,
    pub body: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Expr,
}

/// An active element segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elem {
    pub table: u32,
    pub offset: Expr,
    pub init: Vec<u32>,
}

/// An active data segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub mem: u32,
    pub offset: Expr,
    pub init: Vec<u8>,
}

/// A fully decoded module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub funcs: Vec<Func>,
    pub tables: Vec<TableType>,
    pub mems: Vec<Limits>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    pub elems: Vec<Elem>,
    pub data: Vec<Data>,
}
