//! Per-compilation state: unified index spaces, the fragment pool, and the
//! sequences emitted so far.

use masm_types::ast::{
    BlockType, ExportKind, Expr, FuncType, GlobalType, ImportDesc, Limits, Module, ValueType,
};

use crate::command::Command;
use crate::compiler::{check_name, check_namespace};
use crate::dispatch::SequenceSink;
use crate::error::{CodegenResult, CompileError};
use crate::output::{CompiledModule, Sequence};
use crate::symbol::{ExternalId, Symbol, Tag};

/// Largest page count a memory may declare.
pub const MAX_PAGES: u32 = 65536;

// ══════════════════════════════════════════════════════════════════════════════
// Unified index spaces
// ══════════════════════════════════════════════════════════════════════════════

/// An entry of the function index space. Imports come first.
#[derive(Debug, Clone)]
pub enum FuncEntry<'m> {
    Module {
        ty: &'m FuncType,
        locals: &'m [ValueType],
        body: &'m Expr,
    },
    Import {
        ty: &'m FuncType,
        external: ExternalId,
    },
}

impl FuncEntry<'_> {
    pub fn ty(&self) -> &FuncType {
        match self {
            Self::Module { ty, .. } | Self::Import { ty, .. } => ty,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MemEntry {
    Module(Limits),
    Import(ExternalId),
}

impl MemEntry {
    /// Effective maximum page count of a module memory.
    pub fn max_pages(&self) -> Option<u32> {
        match self {
            Self::Module(limits) => Some(limits.max.unwrap_or(MAX_PAGES)),
            Self::Import(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GlobalEntry<'m> {
    Module { ty: GlobalType, init: &'m Expr },
    Import { ty: GlobalType, external: ExternalId },
}

impl GlobalEntry<'_> {
    pub fn ty(&self) -> GlobalType {
        match self {
            Self::Module { ty, .. } | Self::Import { ty, .. } => *ty,
        }
    }
}

/// The module's index spaces with imports merged in front of definitions,
/// plus its exports split by kind.
#[derive(Debug, Clone)]
pub struct Tables<'m> {
    pub types: &'m [FuncType],
    pub funcs: Vec<FuncEntry<'m>>,
    pub mems: Vec<MemEntry>,
    pub globals: Vec<GlobalEntry<'m>>,
    pub func_exports: Vec<(String, u32)>,
    pub mem_exports: Vec<(String, u32)>,
    pub global_exports: Vec<(String, u32)>,
}

impl<'m> Tables<'m> {
    pub fn from_module(module: &'m Module) -> CodegenResult<Self> {
        let mut tables = Self {
            types: &module.types,
            funcs: Vec::new(),
            mems: Vec::new(),
            globals: Vec::new(),
            func_exports: Vec::new(),
            mem_exports: Vec::new(),
            global_exports: Vec::new(),
        };

        for import in &module.imports {
            check_namespace(&import.module)?;
            check_name("import", &import.name)?;
            let external = ExternalId {
                origin: import.module.clone(),
                member: import.name.clone(),
            };
            match &import.desc {
                ImportDesc::Func { ty } => {
                    let ty = tables.func_type_at(*ty)?;
                    tables.funcs.push(FuncEntry::Import { ty, external });
                }
                ImportDesc::Mem { limits } => {
                    check_limits(limits)?;
                    tables.mems.push(MemEntry::Import(external));
                }
                ImportDesc::Global { ty } => {
                    tables.globals.push(GlobalEntry::Import { ty: *ty, external });
                }
                ImportDesc::Table { .. } => {
                    return Err(CompileError::Unsupported(format!(
                        "table import {}.{}",
                        import.module, import.name
                    )));
                }
            }
        }

        for func in &module.funcs {
            let ty = tables.func_type_at(func.ty)?;
            tables.funcs.push(FuncEntry::Module {
                ty,
                locals: &func.locals,
                body: &func.body,
            });
        }
        for limits in &module.mems {
            check_limits(limits)?;
            tables.mems.push(MemEntry::Module(*limits));
        }
        for global in &module.globals {
            tables.globals.push(GlobalEntry::Module {
                ty: global.ty,
                init: &global.init,
            });
        }

        for export in &module.exports {
            check_name("export", &export.name)?;
            let entry = (export.name.clone(), export.index);
            match export.kind {
                ExportKind::Func => {
                    tables.func(export.index)?;
                    tables.func_exports.push(entry);
                }
                ExportKind::Mem => {
                    tables.mem(export.index)?;
                    tables.mem_exports.push(entry);
                }
                ExportKind::Global => {
                    tables.global(export.index)?;
                    tables.global_exports.push(entry);
                }
                ExportKind::Table => {
                    return Err(CompileError::Unsupported(format!(
                        "table export {}",
                        export.name
                    )));
                }
            }
        }

        Ok(tables)
    }

    fn func_type_at(&self, index: u32) -> CodegenResult<&'m FuncType> {
        self.types.get(index as usize).ok_or(CompileError::InvalidIndex {
            kind: "type",
            index,
        })
    }

    pub fn func(&self, index: u32) -> CodegenResult<&FuncEntry<'m>> {
        self.funcs.get(index as usize).ok_or(CompileError::InvalidIndex {
            kind: "function",
            index,
        })
    }

    pub fn mem(&self, index: u32) -> CodegenResult<&MemEntry> {
        self.mems.get(index as usize).ok_or(CompileError::InvalidIndex {
            kind: "memory",
            index,
        })
    }

    pub fn global(&self, index: u32) -> CodegenResult<&GlobalEntry<'m>> {
        self.globals.get(index as usize).ok_or(CompileError::InvalidIndex {
            kind: "global",
            index,
        })
    }

    /// `(param count, result count)` of a block signature.
    pub fn block_arity(&self, ty: &BlockType) -> CodegenResult<(u32, u32)> {
        match ty {
            BlockType::Empty => Ok((0, 0)),
            BlockType::Value(ValueType::I32) => Ok((0, 1)),
            BlockType::Value(other) => Err(CompileError::UnsupportedType(format!(
                "{other} block result"
            ))),
            BlockType::Func(index) => {
                let ty = self.func_type_at(*index)?;
                Ok((ty.params.len() as u32, ty.results.len() as u32))
            }
        }
    }
}

fn check_limits(limits: &Limits) -> CodegenResult<()> {
    let max = limits.max.unwrap_or(MAX_PAGES);
    if max > MAX_PAGES {
        return Err(CompileError::LimitExceeded(format!(
            "memory maximum of {max} pages exceeds {MAX_PAGES}"
        )));
    }
    if limits.min > max {
        return Err(CompileError::LimitExceeded(format!(
            "memory minimum of {} pages exceeds its maximum of {max}",
            limits.min
        )));
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Fragment pool
// ══════════════════════════════════════════════════════════════════════════════

/// Handle to a fragment in the [`FragmentPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentId(pub u32);

impl FragmentId {
    pub fn symbol(self) -> Symbol {
        Symbol::Pool(self.0)
    }
}

/// Arena of anonymous sequences: block bodies, continuations, loop bodies.
///
/// A slot is reserved before its commands are known, so a fragment can call
/// itself (loops) or be referenced before it is filled.
#[derive(Debug, Default)]
pub struct FragmentPool {
    fragments: Vec<Vec<Command>>,
}

impl FragmentPool {
    pub fn alloc(&mut self) -> FragmentId {
        self.fragments.push(Vec::new());
        FragmentId(self.fragments.len() as u32 - 1)
    }

    pub fn set(&mut self, id: FragmentId, commands: Vec<Command>) {
        if let Some(slot) = self.fragments.get_mut(id.0 as usize) {
            *slot = commands;
        }
    }

    /// Store `commands` in a fresh fragment and return its symbol.
    pub fn add(&mut self, commands: Vec<Command>) -> Symbol {
        let id = self.alloc();
        self.set(id, commands);
        id.symbol()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn get(&self, id: FragmentId) -> Option<&[Command]> {
        self.fragments.get(id.0 as usize).map(Vec::as_slice)
    }

    fn into_sequences(self) -> impl Iterator<Item = Sequence> {
        self.fragments
            .into_iter()
            .enumerate()
            .map(|(i, commands)| Sequence {
                symbol: Symbol::Pool(i as u32),
                commands,
            })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Context
// ══════════════════════════════════════════════════════════════════════════════

/// Everything one compilation accumulates. Consumed by [`Context::finish`].
pub struct Context<'m> {
    pub namespace: String,
    pub tables: Tables<'m>,
    pub pool: FragmentPool,
    /// Commands of the module's `__init` sequence.
    pub init: Vec<Command>,
    pub sequences: Vec<Sequence>,
    pub tags: Vec<(Tag, Symbol)>,
}

impl<'m> Context<'m> {
    pub fn new(namespace: &str, tables: Tables<'m>) -> Self {
        Self {
            namespace: namespace.to_string(),
            tables,
            pool: FragmentPool::default(),
            init: Vec::new(),
            sequences: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Append the fragment pool and the init sequence, producing the final
    /// output.
    pub fn finish(self) -> CompiledModule {
        let Self {
            namespace,
            pool,
            init,
            mut sequences,
            tags,
            ..
        } = self;
        tracing::debug!(
            namespace = %namespace,
            sequences = sequences.len(),
            fragments = pool.len(),
            "assembling module"
        );
        sequences.extend(pool.into_sequences());
        sequences.push(Sequence {
            symbol: Symbol::Init,
            commands: init,
        });
        CompiledModule {
            namespace,
            sequences,
            tags,
        }
    }
}

impl SequenceSink for Context<'_> {
    fn emit(&mut self, symbol: Symbol, commands: Vec<Command>) {
        self.sequences.push(Sequence { symbol, commands });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masm_types::ast::{Export, Func, Import};

    fn i32_type() -> FuncType {
        FuncType {
            params: vec![ValueType::I32],
            results: vec![ValueType::I32],
        }
    }

    #[test]
    fn test_imports_precede_definitions() {
        let module = Module {
            types: vec![i32_type()],
            imports: vec![Import {
                module: "env".into(),
                name: "f".into(),
                desc: ImportDesc::Func { ty: 0 },
            }],
            funcs: vec![Func {
                ty: 0,
                locals: vec![],
                body: vec![],
            }],
            ..Module::default()
        };
        let tables = Tables::from_module(&module).unwrap();
        assert_eq!(tables.funcs.len(), 2);
        assert!(matches!(tables.funcs[0], FuncEntry::Import { .. }));
        assert!(matches!(tables.funcs[1], FuncEntry::Module { .. }));
    }

    #[test]
    fn test_export_index_checked() {
        let module = Module {
            exports: vec![Export {
                name: "f".into(),
                kind: ExportKind::Func,
                index: 0,
            }],
            ..Module::default()
        };
        let err = Tables::from_module(&module).unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidIndex {
                kind: "function",
                index: 0
            }
        );
    }

    fn exported_func(name: &str) -> Module {
        Module {
            types: vec![i32_type()],
            funcs: vec![Func {
                ty: 0,
                locals: vec![],
                body: vec![],
            }],
            exports: vec![Export {
                name: name.into(),
                kind: ExportKind::Func,
                index: 0,
            }],
            ..Module::default()
        }
    }

    fn imported_func(origin: &str, member: &str) -> Module {
        Module {
            types: vec![i32_type()],
            imports: vec![Import {
                module: origin.into(),
                name: member.into(),
                desc: ImportDesc::Func { ty: 0 },
            }],
            ..Module::default()
        }
    }

    #[test]
    fn test_export_names_checked() {
        assert!(Tables::from_module(&exported_func("api/add")).is_ok());
        for bad in ["../../../../escaped", "add\nsay hi", "Add"] {
            assert_eq!(
                Tables::from_module(&exported_func(bad)).unwrap_err(),
                CompileError::InvalidName {
                    kind: "export",
                    name: bad.into()
                }
            );
        }
    }

    #[test]
    fn test_import_names_checked() {
        assert!(Tables::from_module(&imported_func("env", "log")).is_ok());
        assert_eq!(
            Tables::from_module(&imported_func("env", "../up")).unwrap_err(),
            CompileError::InvalidName {
                kind: "import",
                name: "../up".into()
            }
        );
        for origin in ["../env", "Env", "env\nx", ""] {
            assert_eq!(
                Tables::from_module(&imported_func(origin, "log")).unwrap_err(),
                CompileError::InvalidNamespace(origin.into())
            );
        }
    }

    #[test]
    fn test_memory_limits() {
        let over = Module {
            mems: vec![Limits {
                min: 0,
                max: Some(MAX_PAGES + 1),
            }],
            ..Module::default()
        };
        assert!(matches!(
            Tables::from_module(&over),
            Err(CompileError::LimitExceeded(_))
        ));

        let inverted = Module {
            mems: vec![Limits {
                min: 3,
                max: Some(2),
            }],
            ..Module::default()
        };
        assert!(matches!(
            Tables::from_module(&inverted),
            Err(CompileError::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_fragment_pool_reserves_slots() {
        let mut pool = FragmentPool::default();
        let a = pool.alloc();
        let b = pool.add(vec![Command::AddObjective]);
        assert_eq!(a, FragmentId(0));
        assert_eq!(b, Symbol::Pool(1));
        assert!(pool.get(a).unwrap().is_empty());
        pool.set(a, vec![Command::AddObjective]);
        assert_eq!(pool.get(a).unwrap().len(), 1);
    }

    #[test]
    fn test_block_arity() {
        let module = Module {
            types: vec![i32_type()],
            ..Module::default()
        };
        let tables = Tables::from_module(&module).unwrap();
        assert_eq!(tables.block_arity(&BlockType::Empty).unwrap(), (0, 0));
        assert_eq!(
            tables.block_arity(&BlockType::Value(ValueType::I32)).unwrap(),
            (0, 1)
        );
        assert_eq!(tables.block_arity(&BlockType::Func(0)).unwrap(), (1, 1));
        assert!(matches!(
            tables.block_arity(&BlockType::Value(ValueType::F32)),
            Err(CompileError::UnsupportedType(_))
        ));
    }
}
