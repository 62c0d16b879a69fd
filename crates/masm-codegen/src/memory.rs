//! Linear memory sequences.
//!
//! Every module memory is a list of 64 KiB pages in the module's storage.
//! Byte access goes through a single shared page window in runtime storage,
//! `mem = {id, page, data}`. A fault flushes the window's current owner via
//! the swap-out tag and loads the wanted page; the owner check compares the
//! window's `id` string with the memory's `"<namespace>:<index>"`.

use std::collections::BTreeMap;

use crate::command::{
    Command, Compare, Condition, Nbt, NumericTag, Path, Range, Reg, ScoreOp, StoreKind,
    StoreTarget, Sub, PAGE_SIZE,
};
use crate::context::{MemEntry, MAX_PAGES};
use crate::dispatch::{DispatchTree, SequenceSink};
use crate::symbol::{MemoryOp, RuntimeFn, Symbol, Tag, TreeBase};

/// Bytes in the window and in every page.
pub fn zero_page() -> Nbt {
    Nbt::ByteArray(vec![0; PAGE_SIZE as usize])
}

/// The initial value of the runtime page window.
pub fn empty_window() -> Nbt {
    let mut fields = BTreeMap::new();
    fields.insert("id".to_string(), Nbt::String(String::new()));
    fields.insert("page".to_string(), Nbt::Int(-1));
    fields.insert("data".to_string(), zero_page());
    Nbt::Compound(fields)
}

fn window(key: &'static str) -> Path {
    Path::runtime("mem").key(key)
}

fn pages(index: u32) -> Path {
    Path::module("mems").index(index as i32)
}

fn window_id(namespace: &str, index: u32) -> Nbt {
    Nbt::String(format!("{namespace}:{index}"))
}

/// `execute store success score <reg> run data modify storage tmp set value <id>`:
/// leaves `0` in `reg` exactly when the window belongs to memory `index`.
fn owner_check(namespace: &str, index: u32, reg: Reg) -> [Command; 2] {
    [
        Command::DataSetFrom(Path::runtime("tmp"), window("id")),
        Command::Execute {
            subs: vec![Sub::Store(StoreKind::Success, StoreTarget::Score(reg))],
            run: Some(Box::new(Command::DataSetValue(
                Path::runtime("tmp"),
                window_id(namespace, index),
            ))),
        },
    ]
}

/// Emit every sequence of memory `index`.
pub fn emit_memory(sink: &mut dyn SequenceSink, namespace: &str, index: u32, entry: &MemEntry) {
    match entry {
        MemEntry::Import(external) => {
            for op in MemoryOp::PUBLIC {
                sink.emit(
                    Symbol::Memory(index, op),
                    vec![Command::call(Symbol::ImportMemory(external.clone(), op))],
                );
            }
        }
        MemEntry::Module(limits) => {
            let max = limits.max.unwrap_or(MAX_PAGES);
            if max == 0 {
                emit_empty(sink, index);
            } else {
                emit_paged(sink, namespace, index, max);
            }
        }
    }
}

/// A memory that can never hold a page.
fn emit_empty(sink: &mut dyn SequenceSink, index: u32) {
    sink.emit(
        Symbol::Memory(index, MemoryOp::Get),
        vec![Command::set(Reg::A, 0)],
    );
    sink.emit(Symbol::Memory(index, MemoryOp::Set), Vec::new());
    sink.emit(
        Symbol::Memory(index, MemoryOp::Size),
        vec![Command::DataAppendValue(Path::runtime("stack"), Nbt::Int(0))],
    );
    sink.emit(
        Symbol::Memory(index, MemoryOp::Grow),
        vec![
            Command::load(Reg::A, Path::stack(-1)),
            Command::DataSetValue(Path::stack(-1), Nbt::Int(-1))
                .guarded(Sub::unless_matches(Reg::A, Range::exact(0))),
        ],
    );
}

fn emit_paged(sink: &mut dyn SequenceSink, namespace: &str, index: u32, max: u32) {
    let swap_in_tree = DispatchTree::new(TreeBase::MemSwapIn(index), Reg::Index).build(
        sink,
        0,
        max,
        &mut |page| Command::DataSetFrom(window("data"), pages(index).index(page as i32)),
    );
    let swap_out_tree = DispatchTree::new(TreeBase::MemSwapOut(index), Reg::Index).build(
        sink,
        0,
        max,
        &mut |page| Command::DataSetFrom(pages(index).index(page as i32), window("data")),
    );

    let on_fault = |cmd: Command| cmd.guarded(Sub::if_matches(Reg::PageFault, Range::exact(1)));
    let mut swap_in = vec![Command::set(Reg::PageFault, 0)];
    swap_in.extend(owner_check(namespace, index, Reg::PageFault));
    swap_in.extend([
        Command::load(Reg::Swap, window("page"))
            .guarded(Sub::if_matches(Reg::PageFault, Range::exact(0))),
        Command::set(Reg::PageFault, 1)
            .guarded(Sub::Unless(Condition::Compare(
                Reg::Swap,
                Compare::Eq,
                Reg::TargetPage,
            )))
            .guarded(Sub::if_matches(Reg::PageFault, Range::exact(0))),
        on_fault(Command::CallTag(Tag::SwapOut)),
        on_fault(Command::copy(Reg::Index, Reg::TargetPage)),
        on_fault(Command::call(swap_in_tree)),
        on_fault(Command::DataSetValue(window("id"), window_id(namespace, index))),
        on_fault(Command::save(window("page"), Reg::TargetPage)),
    ]);
    sink.emit(Symbol::Memory(index, MemoryOp::SwapIn), swap_in);

    sink.emit(
        Symbol::Memory(index, MemoryOp::SwapOut),
        vec![
            Command::load(Reg::Index, window("page")),
            Command::call(swap_out_tree),
        ],
    );

    for (op, byte_op) in [
        (MemoryOp::Get, RuntimeFn::ByteGet),
        (MemoryOp::Set, RuntimeFn::ByteSet),
    ] {
        sink.emit(
            Symbol::Memory(index, op),
            vec![
                Command::copy(Reg::TargetAddress, Reg::Index),
                Command::copy(Reg::TargetPage, Reg::Index),
                Command::op(Reg::TargetPage, ScoreOp::Div, Reg::Const(PAGE_SIZE)),
                Command::add(Reg::TargetPage, PAGE_SIZE)
                    .guarded(Sub::if_matches(Reg::TargetPage, Range::at_most(-1))),
                Command::call(Symbol::Memory(index, MemoryOp::SwapIn)),
                Command::copy(Reg::Index, Reg::TargetAddress),
                Command::op(Reg::Index, ScoreOp::Mod, Reg::Const(PAGE_SIZE)),
                Command::call(Symbol::Runtime(byte_op)),
            ],
        );
    }

    sink.emit(
        Symbol::Memory(index, MemoryOp::Size),
        vec![
            Command::DataAppendValue(Path::runtime("stack"), Nbt::Int(0)),
            Command::Execute {
                subs: vec![Sub::Store(
                    StoreKind::Result,
                    StoreTarget::Storage(Path::stack(-1), NumericTag::Int),
                )],
                run: Some(Box::new(Command::DataGet(pages(index)))),
            },
        ],
    );

    let max = max as i32;
    sink.emit(
        Symbol::Memory(index, MemoryOp::Grow),
        vec![
            Command::load(Reg::A, Path::stack(-1)),
            Command::load(Reg::B, pages(index)),
            Command::copy(Reg::C, Reg::B),
            Command::op(Reg::C, ScoreOp::Add, Reg::A),
            Command::set(Reg::D, 0),
            Command::set(Reg::D, 1)
                .guarded(Sub::if_matches(Reg::C, Range::between(0, max)))
                .guarded(Sub::if_matches(Reg::A, Range::between(0, max))),
            Command::save(Path::stack(-1), Reg::B),
            Command::DataSetValue(Path::stack(-1), Nbt::Int(-1))
                .guarded(Sub::if_matches(Reg::D, Range::exact(0))),
            Command::call(Symbol::Memory(index, MemoryOp::GrowUnchecked))
                .guarded(Sub::if_matches(Reg::D, Range::exact(1))),
        ],
    );

    // Appends `#a` zero pages.
    let grow_loop = Symbol::Memory(index, MemoryOp::GrowLoop);
    sink.emit(
        Symbol::Memory(index, MemoryOp::GrowUnchecked),
        vec![Command::call(grow_loop.clone()).guarded(Sub::if_matches(Reg::A, Range::at_least(1)))],
    );
    sink.emit(
        grow_loop.clone(),
        vec![
            Command::DataAppendFrom(pages(index), Path::runtime("zero_page")),
            Command::add(Reg::A, -1),
            Command::call(grow_loop).guarded(Sub::if_matches(Reg::A, Range::at_least(1))),
        ],
    );
}

/// The module's member of the swap-out tag: flushes the window if one of
/// the module's paged memories owns it. `None` when nothing is paged.
pub fn swap_out_all(namespace: &str, mems: &[MemEntry]) -> Option<Vec<Command>> {
    let mut commands = Vec::new();
    for (index, entry) in mems.iter().enumerate() {
        if !matches!(entry.max_pages(), Some(max) if max > 0) {
            continue;
        }
        let index = index as u32;
        commands.extend(owner_check(namespace, index, Reg::Swap));
        commands.push(
            Command::call(Symbol::Memory(index, MemoryOp::SwapOut))
                .guarded(Sub::if_matches(Reg::Swap, Range::exact(0))),
        );
    }
    (!commands.is_empty()).then_some(commands)
}

/// Init commands allocating memory `index`'s initial pages.
pub fn init_memory(index: u32, entry: &MemEntry) -> Vec<Command> {
    let mut commands = vec![Command::DataAppendValue(
        Path::module("mems"),
        Nbt::empty_list(),
    )];
    if let MemEntry::Module(limits) = entry {
        if entry.max_pages().is_some_and(|max| max > 0) && limits.min > 0 {
            commands.push(Command::set(Reg::A, limits.min as i32));
            commands.push(Command::call(Symbol::Memory(index, MemoryOp::GrowUnchecked)));
        }
    }
    commands
}
