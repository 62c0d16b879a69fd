//! Typed names of generated sequences.
//!
//! Every callable sequence is identified by a [`Symbol`]; its qualified name
//! is produced in exactly one place, [`Symbol::qualified_name`].

/// Namespace of the shared runtime library.
pub const RUNTIME_NAMESPACE: &str = "masm";

/// `{origin, member}` of an import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    pub origin: String,
    pub member: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Get,
    Set,
    Size,
    Grow,
    SwapIn,
    SwapOut,
    GrowUnchecked,
    GrowLoop,
}

impl MemoryOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Size => "size",
            Self::Grow => "grow",
            Self::SwapIn => "swap_in",
            Self::SwapOut => "swap_out",
            Self::GrowUnchecked => "grow_unchecked",
            Self::GrowLoop => "grow_loop",
        }
    }

    /// Operations visible across modules.
    pub const PUBLIC: [MemoryOp; 4] = [Self::Get, Self::Set, Self::Size, Self::Grow];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalOp {
    Get,
    Set,
}

impl GlobalOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
        }
    }
}

/// Where a dispatch tree's node names are rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeBase {
    /// Page loader of module memory `i`.
    MemSwapIn(u32),
    /// Page writer of module memory `i`.
    MemSwapOut(u32),
    /// Byte reader over the page window.
    ByteGet,
    /// Byte writer over the page window.
    ByteSet,
}

impl TreeBase {
    fn qualified_name(self, namespace: &str) -> String {
        match self {
            Self::MemSwapIn(i) => format!("{namespace}:__internal/mems/{i}/swap_in"),
            Self::MemSwapOut(i) => format!("{namespace}:__internal/mems/{i}/swap_out"),
            Self::ByteGet => format!("{RUNTIME_NAMESPACE}:__internal/mem/get"),
            Self::ByteSet => format!("{RUNTIME_NAMESPACE}:__internal/mem/set"),
        }
    }
}

/// Sequences of the shared runtime library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    Load,
    ByteGet,
    ByteSet,
    DivS,
    RemS,
    DivU,
    RemU,
    UDivMod,
    UDivModLarge,
    UDivModSmall,
    UDivModPos,
    UDivModNeg,
    Shl,
    ShlLoop,
    ShrS,
    ShrSLoop,
    ShrU,
    ShrUFirst,
    Rotl,
    Rotr,
    And,
    AndLoop,
    Or,
    OrLoop,
    Xor,
    XorLoop,
    Clz,
    ClzLoop,
    Ctz,
    CtzLoop,
    Popcnt,
    PopcntLoop,
}

impl RuntimeFn {
    pub fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::ByteGet => "mem/get",
            Self::ByteSet => "mem/set",
            Self::DivS => "div_s",
            Self::RemS => "rem_s",
            Self::DivU => "div_u",
            Self::RemU => "rem_u",
            Self::UDivMod => "udivmod",
            Self::UDivModLarge => "udivmod/large",
            Self::UDivModSmall => "udivmod/small",
            Self::UDivModPos => "udivmod/pos",
            Self::UDivModNeg => "udivmod/neg",
            Self::Shl => "shl",
            Self::ShlLoop => "shl/loop",
            Self::ShrS => "shr_s",
            Self::ShrSLoop => "shr_s/loop",
            Self::ShrU => "shr_u",
            Self::ShrUFirst => "shr_u/first",
            Self::Rotl => "rotl",
            Self::Rotr => "rotr",
            Self::And => "and",
            Self::AndLoop => "and/loop",
            Self::Or => "or",
            Self::OrLoop => "or/loop",
            Self::Xor => "xor",
            Self::XorLoop => "xor/loop",
            Self::Clz => "clz",
            Self::ClzLoop => "clz/loop",
            Self::Ctz => "ctz",
            Self::CtzLoop => "ctz/loop",
            Self::Popcnt => "popcnt",
            Self::PopcntLoop => "popcnt/loop",
        }
    }
}

/// A callable sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Internal body of function `i` (frame convention).
    Func(u32),
    /// Fragment `i` of the module's fragment pool.
    Pool(u32),
    Memory(u32, MemoryOp),
    /// Flushes whichever of the module's memories owns the page window.
    SwapOutAll,
    Global(u32, GlobalOp),
    /// Node covering `lo..=hi` of a dispatch tree.
    Tree(TreeBase, u32, u32),
    /// Exported function (stack convention).
    ExportFunc(String),
    ExportMemory(String, MemoryOp),
    ExportGlobal(String, GlobalOp),
    ImportFunc(ExternalId),
    ImportMemory(ExternalId, MemoryOp),
    ImportGlobal(ExternalId, GlobalOp),
    Init,
    Runtime(RuntimeFn),
}

impl Symbol {
    /// The `namespace:path` name of this sequence when emitted by the module
    /// with the given namespace.
    pub fn qualified_name(&self, namespace: &str) -> String {
        match self {
            Self::Func(i) => format!("{namespace}:__internal/funcs/{i}"),
            Self::Pool(i) => format!("{namespace}:__internal/func_pool/{i}"),
            Self::Memory(i, op) => format!("{namespace}:__internal/mems/{i}/{}", op.name()),
            Self::SwapOutAll => format!("{namespace}:__internal/mems/swap_out"),
            Self::Global(i, op) => format!("{namespace}:__internal/globals/{i}/{}", op.name()),
            Self::Tree(base, lo, hi) => format!("{}/{lo}-{hi}", base.qualified_name(namespace)),
            Self::ExportFunc(name) => format!("{namespace}:{name}"),
            Self::ExportMemory(name, op) => format!("{namespace}:__mems/{name}/{}", op.name()),
            Self::ExportGlobal(name, op) => {
                format!("{namespace}:__globals/{name}/{}", op.name())
            }
            Self::ImportFunc(ext) => format!("{}:{}", ext.origin, ext.member),
            Self::ImportMemory(ext, op) => {
                format!("{}:__mems/{}/{}", ext.origin, ext.member, op.name())
            }
            Self::ImportGlobal(ext, op) => {
                format!("{}:__globals/{}/{}", ext.origin, ext.member, op.name())
            }
            Self::Init => format!("{namespace}:__init"),
            Self::Runtime(f) => format!("{RUNTIME_NAMESPACE}:__internal/{}", f.name()),
        }
    }
}

/// A function tag: a named list of sequences invoked together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Every module's [`Symbol::SwapOutAll`].
    SwapOut,
    /// Run once when the pack loads.
    Load,
}

impl Tag {
    pub fn name(self) -> &'static str {
        match self {
            Self::SwapOut => "masm:__internal/mems/swap_out",
            Self::Load => "minecraft:load",
        }
    }
}
