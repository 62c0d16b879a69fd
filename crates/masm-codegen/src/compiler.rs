//! Module compilation driver.
//!
//! Order of emission: function bodies, memory sequences, global accessors,
//! export and import forwarders, the fragment pool, and finally `__init`.

use masm_types::ast::{Data, ImportDesc, Module, ValueType};

use crate::command::{Command, Nbt, Path, Reg};
use crate::context::{Context, FuncEntry, GlobalEntry, Tables};
use crate::dispatch::SequenceSink;
use crate::error::{CodegenResult, CompileError};
use crate::linearizer::{call_sequence, Linearizer};
use crate::memory;
use crate::output::CompiledModule;
use crate::symbol::{GlobalOp, MemoryOp, Symbol, Tag, RUNTIME_NAMESPACE};

/// Longest namespace a module may be compiled under.
pub const MAX_NAMESPACE_LEN: usize = 16;

/// Namespaces are non-empty, at most [`MAX_NAMESPACE_LEN`] characters of
/// `[a-z0-9_.-]`, and not the runtime's own.
pub fn check_namespace(namespace: &str) -> CodegenResult<()> {
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(CompileError::NamespaceTooLong {
            namespace: namespace.to_string(),
            max: MAX_NAMESPACE_LEN,
        });
    }
    let valid_char = |c: char| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-');
    if namespace.is_empty() || namespace == RUNTIME_NAMESPACE || !namespace.chars().all(valid_char)
    {
        return Err(CompileError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// Export names and import members become function paths: non-empty
/// `/`-separated segments of `[a-z0-9_.-]`, none of them `.` or `..`.
pub fn check_name(kind: &'static str, name: &str) -> CodegenResult<()> {
    let valid_char = |c: char| matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-');
    let valid_segment =
        |seg: &str| !seg.is_empty() && seg != "." && seg != ".." && seg.chars().all(valid_char);
    if name.split('/').all(valid_segment) {
        Ok(())
    } else {
        Err(CompileError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

fn check_value_type(ty: ValueType, context: impl FnOnce() -> String) -> CodegenResult<()> {
    match ty {
        ValueType::I32 => Ok(()),
        other => Err(CompileError::UnsupportedType(format!("{other} in {}", context()))),
    }
}

/// Every value type the module declares must be i32, used or not.
fn check_types(module: &Module) -> CodegenResult<()> {
    for (i, ty) in module.types.iter().enumerate() {
        for vt in ty.params.iter().chain(&ty.results) {
            check_value_type(*vt, || format!("type {i}"))?;
        }
    }
    for (i, func) in module.funcs.iter().enumerate() {
        for vt in &func.locals {
            check_value_type(*vt, || format!("locals of function {i}"))?;
        }
    }
    for (i, global) in module.globals.iter().enumerate() {
        check_value_type(global.ty.value_type, || format!("global {i}"))?;
    }
    for import in &module.imports {
        if let ImportDesc::Global { ty } = import.desc {
            check_value_type(ty.value_type, || {
                format!("imported global {}.{}", import.module, import.name)
            })?;
        }
    }
    Ok(())
}

/// Compile a decoded module under `namespace`.
pub fn compile(namespace: &str, module: &Module) -> CodegenResult<CompiledModule> {
    check_namespace(namespace)?;
    check_types(module)?;
    let tables = Tables::from_module(module)?;

    if !module.tables.is_empty() {
        tracing::warn!(count = module.tables.len(), "ignoring tables");
    }
    if !module.elems.is_empty() {
        tracing::warn!(count = module.elems.len(), "ignoring element segments");
    }

    let mut ctx = Context::new(namespace, tables);
    ctx.init.extend([
        Command::DataSetValue(Path::module("mems"), Nbt::empty_list()),
        Command::DataSetValue(Path::module("globals"), Nbt::empty_list()),
    ]);

    emit_functions(&mut ctx)?;
    emit_memories(&mut ctx);
    emit_globals(&mut ctx)?;
    emit_exports(&mut ctx);
    emit_data(&mut ctx, &module.data)?;

    if let Some(start) = module.start {
        ctx.tables.func(start)?;
        ctx.init.extend(call_sequence(Symbol::Func(start), 0));
    }

    let compiled = ctx.finish();
    tracing::debug!(
        namespace,
        sequences = compiled.sequences.len(),
        commands = compiled.command_count(),
        "compiled module"
    );
    Ok(compiled)
}

fn emit_functions(ctx: &mut Context<'_>) -> CodegenResult<()> {
    for index in 0..ctx.tables.funcs.len() as u32 {
        let commands = match ctx.tables.func(index)?.clone() {
            FuncEntry::Module { ty, locals, body } => {
                Linearizer::new(&ctx.tables, &mut ctx.pool)
                    .compile_function(ty, locals, body)
                    .inspect_err(|err| {
                        tracing::debug!(function = index, %err, "function failed to compile");
                    })?
            }
            // Frame convention in, stack convention out.
            FuncEntry::Import { ty, external } => {
                let mut commands: Vec<Command> = (0..ty.params.len() as u32)
                    .map(|j| Command::DataAppendFrom(Path::runtime("stack"), Path::local(j)))
                    .collect();
                commands.push(Command::call(Symbol::ImportFunc(external)));
                commands
            }
        };
        ctx.emit(Symbol::Func(index), commands);
    }
    Ok(())
}

fn emit_memories(ctx: &mut Context<'_>) {
    let mems = ctx.tables.mems.clone();
    for (index, entry) in mems.iter().enumerate() {
        let index = index as u32;
        let namespace = ctx.namespace.clone();
        memory::emit_memory(&mut *ctx, &namespace, index, entry);
        ctx.init.extend(memory::init_memory(index, entry));
    }
    if let Some(commands) = memory::swap_out_all(&ctx.namespace, &mems) {
        ctx.emit(Symbol::SwapOutAll, commands);
        ctx.tags.push((Tag::SwapOut, Symbol::SwapOutAll));
    }
}

fn emit_globals(ctx: &mut Context<'_>) -> CodegenResult<()> {
    let globals = ctx.tables.globals.clone();
    for (index, entry) in globals.iter().enumerate() {
        let index = index as u32;
        let slot = Path::module("globals").index(index as i32);
        ctx.init
            .push(Command::DataAppendValue(Path::module("globals"), Nbt::Int(0)));
        match entry {
            GlobalEntry::Module { init, .. } => {
                let init = Linearizer::new(&ctx.tables, &mut ctx.pool).compile_const(init)?;
                ctx.init.extend(init);
                ctx.init.extend([
                    Command::DataSetFrom(slot.clone(), Path::stack(-1)),
                    Command::DataRemove(Path::stack(-1)),
                ]);
                ctx.emit(
                    Symbol::Global(index, GlobalOp::Get),
                    vec![Command::DataAppendFrom(Path::runtime("stack"), slot.clone())],
                );
                ctx.emit(
                    Symbol::Global(index, GlobalOp::Set),
                    vec![
                        Command::DataSetFrom(slot, Path::stack(-1)),
                        Command::DataRemove(Path::stack(-1)),
                    ],
                );
            }
            GlobalEntry::Import { ty, external } => {
                let ops: &[GlobalOp] = if ty.mutable {
                    &[GlobalOp::Get, GlobalOp::Set]
                } else {
                    &[GlobalOp::Get]
                };
                for &op in ops {
                    ctx.emit(
                        Symbol::Global(index, op),
                        vec![Command::call(Symbol::ImportGlobal(external.clone(), op))],
                    );
                }
            }
        }
    }
    Ok(())
}

fn emit_exports(ctx: &mut Context<'_>) {
    for (name, index) in ctx.tables.func_exports.clone() {
        let params = ctx
            .tables
            .funcs
            .get(index as usize)
            .map_or(0, |f| f.ty().params.len() as u32);
        ctx.emit(
            Symbol::ExportFunc(name),
            call_sequence(Symbol::Func(index), params),
        );
    }
    for (name, index) in ctx.tables.mem_exports.clone() {
        for op in MemoryOp::PUBLIC {
            ctx.emit(
                Symbol::ExportMemory(name.clone(), op),
                vec![Command::call(Symbol::Memory(index, op))],
            );
        }
    }
    for (name, index) in ctx.tables.global_exports.clone() {
        let mutable = ctx
            .tables
            .globals
            .get(index as usize)
            .is_some_and(|g| g.ty().mutable);
        ctx.emit(
            Symbol::ExportGlobal(name.clone(), GlobalOp::Get),
            vec![Command::call(Symbol::Global(index, GlobalOp::Get))],
        );
        if mutable {
            ctx.emit(
                Symbol::ExportGlobal(name, GlobalOp::Set),
                vec![Command::call(Symbol::Global(index, GlobalOp::Set))],
            );
        }
    }
}

fn emit_data(ctx: &mut Context<'_>, segments: &[Data]) -> CodegenResult<()> {
    for segment in segments {
        ctx.tables.mem(segment.mem)?;
        let offset = Linearizer::new(&ctx.tables, &mut ctx.pool).compile_const(&segment.offset)?;
        ctx.init.extend(offset);
        ctx.init.extend([
            Command::load(Reg::Address, Path::stack(-1)),
            Command::DataRemove(Path::stack(-1)),
        ]);
        for (k, byte) in segment.init.iter().enumerate() {
            ctx.init.push(Command::copy(Reg::Index, Reg::Address));
            if k > 0 {
                ctx.init.push(Command::add(Reg::Index, k as i32));
            }
            ctx.init.push(Command::set(Reg::A, i32::from(*byte)));
            ctx.init
                .push(Command::call(Symbol::Memory(segment.mem, MemoryOp::Set)));
        }
    }
    Ok(())
}
