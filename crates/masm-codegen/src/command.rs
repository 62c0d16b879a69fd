//! The command IR.
//!
//! Every generated sequence is a list of [`Command`]s. The IR is typed so the
//! code generator never concatenates command text by hand; [`Command::render`]
//! is the only place that knows the textual syntax, and the reference
//! executor consumes the same values directly.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::symbol::{Symbol, Tag, RUNTIME_NAMESPACE};

/// Scoreboard objective holding every register.
pub const OBJECTIVE: &str = "masm";

/// Branch-depth value meaning "no branch in progress".
pub const NO_BRANCH: i32 = i32::MAX;

/// Page size of a linear memory, in bytes.
pub const PAGE_SIZE: i32 = 65536;

// ══════════════════════════════════════════════════════════════════════════════
// Registers
// ══════════════════════════════════════════════════════════════════════════════

/// A named score on the [`OBJECTIVE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    A,
    B,
    C,
    D,
    E,
    F,
    /// Byte address handed to memory `get`/`set`.
    Index,
    /// Effective address kept live across the bytes of one load or store.
    Address,
    BrDepth,
    PageFault,
    TargetPage,
    TargetAddress,
    Swap,
    /// A constant seeded by the runtime load sequence.
    Const(i32),
}

/// Constants seeded at load time, usable as `Reg::Const`.
pub const CONSTANTS: [i32; 6] = [2, 32, 256, PAGE_SIZE, 16_777_216, i32::MIN];

impl Reg {
    pub fn name(self) -> String {
        match self {
            Self::A => "#a".into(),
            Self::B => "#b".into(),
            Self::C => "#c".into(),
            Self::D => "#d".into(),
            Self::E => "#e".into(),
            Self::F => "#f".into(),
            Self::Index => "#index".into(),
            Self::Address => "#address".into(),
            Self::BrDepth => "#br_depth".into(),
            Self::PageFault => "#page_fault".into(),
            Self::TargetPage => "#target_page".into(),
            Self::TargetAddress => "#target_address".into(),
            Self::Swap => "#swap".into(),
            Self::Const(n) => format!("#{n}"),
        }
    }

    fn holder(self) -> String {
        format!("{} {OBJECTIVE}", self.name())
    }
}

/// `scoreboard players operation` operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOp {
    Assign,
    Add,
    Sub,
    Mul,
    /// Floor division.
    Div,
    /// Floor modulo.
    Mod,
    Min,
    Max,
    Swap,
}

impl ScoreOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Assign => "=",
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::Div => "/=",
            Self::Mod => "%=",
            Self::Min => "<",
            Self::Max => ">",
            Self::Swap => "><",
        }
    }
}

/// Score comparison operators for `if score A op B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Compare {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
        }
    }

    pub fn holds(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
        }
    }
}

/// An inclusive integer range; either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl Range {
    pub fn exact(value: i32) -> Self {
        Self {
            min: Some(value),
            max: Some(value),
        }
    }

    pub fn between(min: i32, max: i32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn at_least(min: i32) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn at_most(max: i32) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn contains(self, value: i32) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn render(self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) if min == max => min.to_string(),
            (Some(min), Some(max)) => format!("{min}..{max}"),
            (Some(min), None) => format!("{min}.."),
            (None, Some(max)) => format!("..{max}"),
            (None, None) => "..".to_string(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Storage
// ══════════════════════════════════════════════════════════════════════════════

/// Which storage a path lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    /// `masm:__internal`, shared by every module.
    Runtime,
    /// `<namespace>:__internal`, private to one module.
    Module,
}

impl Storage {
    pub fn id(self, namespace: &str) -> String {
        match self {
            Self::Runtime => format!("{RUNTIME_NAMESPACE}:__internal"),
            Self::Module => format!("{namespace}:__internal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(&'static str),
    /// List element; negative indices count from the end.
    Index(i32),
}

/// A path into one storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    pub storage: Storage,
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn runtime(key: &'static str) -> Self {
        Self {
            storage: Storage::Runtime,
            segments: vec![Segment::Key(key)],
        }
    }

    pub fn module(key: &'static str) -> Self {
        Self {
            storage: Storage::Module,
            segments: vec![Segment::Key(key)],
        }
    }

    pub fn key(mut self, key: &'static str) -> Self {
        self.segments.push(Segment::Key(key));
        self
    }

    pub fn index(mut self, index: i32) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// `masm:__internal stack[index]`
    pub fn stack(index: i32) -> Self {
        Self::runtime("stack").index(index)
    }

    /// `masm:__internal frames[-1][local]`
    pub fn local(local: u32) -> Self {
        Self::runtime("frames").index(-1).index(local as i32)
    }

    /// The path text without the storage id, e.g. `mem.data[3]`.
    pub fn nbt_path(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                Segment::Index(index) => {
                    let _ = write!(out, "[{index}]");
                }
            }
        }
        out
    }

    pub fn render(&self, namespace: &str) -> String {
        format!("{} {}", self.storage.id(namespace), self.nbt_path())
    }
}

/// A literal storage value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nbt {
    Int(i32),
    Byte(i8),
    String(String),
    List(Vec<Nbt>),
    ByteArray(Vec<i8>),
    Compound(BTreeMap<String, Nbt>),
}

impl Nbt {
    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    pub fn render(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Byte(v) => format!("{v}b"),
            Self::String(s) => {
                let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\"")
            }
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Nbt::render).collect();
                format!("[{}]", inner.join(","))
            }
            Self::ByteArray(bytes) => {
                let mut out = String::with_capacity(bytes.len() * 3 + 3);
                out.push_str("[B;");
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    let _ = write!(out, "{b}b");
                }
                out.push(']');
                out
            }
            Self::Compound(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}:{}", v.render()))
                    .collect();
                format!("{{{}}}", inner.join(","))
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Execute subcommands
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Matches(Reg, Range),
    Compare(Reg, Compare, Reg),
}

impl Condition {
    fn render(&self) -> String {
        match self {
            Self::Matches(reg, range) => {
                format!("score {} matches {}", reg.holder(), range.render())
            }
            Self::Compare(lhs, op, rhs) => {
                format!("score {} {} {}", lhs.holder(), op.symbol(), rhs.holder())
            }
        }
    }
}

/// Numeric tag used when storing into storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericTag {
    Int,
    Byte,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Score(Reg),
    Storage(Path, NumericTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Result,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sub {
    If(Condition),
    Unless(Condition),
    Store(StoreKind, StoreTarget),
}

impl Sub {
    pub fn if_matches(reg: Reg, range: Range) -> Self {
        Self::If(Condition::Matches(reg, range))
    }

    pub fn unless_matches(reg: Reg, range: Range) -> Self {
        Self::Unless(Condition::Matches(reg, range))
    }

    /// Guard on "no branch in progress".
    pub fn no_branch() -> Self {
        Self::if_matches(Reg::BrDepth, Range::exact(NO_BRANCH))
    }

    fn render(&self, namespace: &str) -> String {
        match self {
            Self::If(c) => format!("if {}", c.render()),
            Self::Unless(c) => format!("unless {}", c.render()),
            Self::Store(kind, target) => {
                let kind = match kind {
                    StoreKind::Result => "result",
                    StoreKind::Success => "success",
                };
                match target {
                    StoreTarget::Score(reg) => format!("store {kind} score {}", reg.holder()),
                    StoreTarget::Storage(path, tag) => {
                        let tag = match tag {
                            NumericTag::Int => "int",
                            NumericTag::Byte => "byte",
                        };
                        format!("store {kind} storage {} {tag} 1", path.render(namespace))
                    }
                }
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Commands
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetScore(Reg, i32),
    /// Wrapping add of a literal.
    AddScore(Reg, i32),
    Operation(Reg, ScoreOp, Reg),
    GetScore(Reg),
    DataAppendValue(Path, Nbt),
    DataAppendFrom(Path, Path),
    DataSetValue(Path, Nbt),
    DataSetFrom(Path, Path),
    DataRemove(Path),
    DataGet(Path),
    Call(Symbol),
    CallTag(Tag),
    AddObjective,
    Execute {
        subs: Vec<Sub>,
        run: Option<Box<Command>>,
    },
}

impl Command {
    pub fn set(reg: Reg, value: i32) -> Self {
        Self::SetScore(reg, value)
    }

    pub fn add(reg: Reg, value: i32) -> Self {
        Self::AddScore(reg, value)
    }

    pub fn op(target: Reg, op: ScoreOp, source: Reg) -> Self {
        Self::Operation(target, op, source)
    }

    pub fn copy(target: Reg, source: Reg) -> Self {
        Self::Operation(target, ScoreOp::Assign, source)
    }

    pub fn call(symbol: Symbol) -> Self {
        Self::Call(symbol)
    }

    /// `execute store result score <reg> run data get storage <path>`
    pub fn load(reg: Reg, path: Path) -> Self {
        Self::Execute {
            subs: vec![Sub::Store(StoreKind::Result, StoreTarget::Score(reg))],
            run: Some(Box::new(Self::DataGet(path))),
        }
    }

    /// `execute store result storage <path> int 1 run scoreboard players get <reg>`
    pub fn save(path: Path, reg: Reg) -> Self {
        Self::save_as(path, NumericTag::Int, reg)
    }

    pub fn save_as(path: Path, tag: NumericTag, reg: Reg) -> Self {
        Self::Execute {
            subs: vec![Sub::Store(StoreKind::Result, StoreTarget::Storage(path, tag))],
            run: Some(Box::new(Self::GetScore(reg))),
        }
    }

    /// Prepend a subcommand, merging into an existing `execute`.
    pub fn guarded(self, sub: Sub) -> Self {
        match self {
            Self::Execute { mut subs, run } => {
                subs.insert(0, sub);
                Self::Execute { subs, run }
            }
            other => Self::Execute {
                subs: vec![sub],
                run: Some(Box::new(other)),
            },
        }
    }

    /// Text form of the command, with module paths resolved against
    /// `namespace`.
    pub fn render(&self, namespace: &str) -> String {
        match self {
            Self::SetScore(reg, v) => format!("scoreboard players set {} {v}", reg.holder()),
            Self::AddScore(reg, v) => match *v {
                i32::MIN => format!(
                    "scoreboard players operation {} += {}",
                    reg.holder(),
                    Reg::Const(i32::MIN).holder()
                ),
                v if v < 0 => format!("scoreboard players remove {} {}", reg.holder(), -v),
                v => format!("scoreboard players add {} {v}", reg.holder()),
            },
            Self::Operation(target, op, source) => format!(
                "scoreboard players operation {} {} {}",
                target.holder(),
                op.symbol(),
                source.holder()
            ),
            Self::GetScore(reg) => format!("scoreboard players get {}", reg.holder()),
            Self::DataAppendValue(path, value) => format!(
                "data modify storage {} append value {}",
                path.render(namespace),
                value.render()
            ),
            Self::DataAppendFrom(path, source) => format!(
                "data modify storage {} append from storage {}",
                path.render(namespace),
                source.render(namespace)
            ),
            Self::DataSetValue(path, value) => format!(
                "data modify storage {} set value {}",
                path.render(namespace),
                value.render()
            ),
            Self::DataSetFrom(path, source) => format!(
                "data modify storage {} set from storage {}",
                path.render(namespace),
                source.render(namespace)
            ),
            Self::DataRemove(path) => format!("data remove storage {}", path.render(namespace)),
            Self::DataGet(path) => format!("data get storage {}", path.render(namespace)),
            Self::Call(symbol) => format!("function {}", symbol.qualified_name(namespace)),
            Self::CallTag(tag) => format!("function #{}", tag.name()),
            Self::AddObjective => format!("scoreboard objectives add {OBJECTIVE} dummy"),
            Self::Execute { subs, run } => {
                let mut out = String::from("execute");
                for sub in subs {
                    out.push(' ');
                    out.push_str(&sub.render(namespace));
                }
                if let Some(run) = run {
                    out.push_str(" run ");
                    out.push_str(&run.render(namespace));
                }
                out
            }
        }
    }
}
