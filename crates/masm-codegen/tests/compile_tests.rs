//! Whole-module compilation tests: what gets emitted, under which names,
//! and which modules are rejected.
//!
//! Behaviour of the emitted commands is exercised end to end by the
//! executor tests in `masm-compiler`.

use masm_codegen::symbol::{GlobalOp, MemoryOp, RuntimeFn};
use masm_codegen::{compile, CompileError, CompiledModule, Symbol, Tag};
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction, MemorySection,
    MemoryType, Module, RefType, TableSection, TableType, TypeSection, ValType,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn memory(min: u64, max: Option<u64>) -> MemoryType {
    MemoryType {
        minimum: min,
        maximum: max,
        memory64: false,
        shared: false,
        page_size_log2: None,
    }
}

fn global(mutable: bool) -> GlobalType {
    GlobalType {
        val_type: ValType::I32,
        mutable,
        shared: false,
    }
}

/// One function of type `params -> results` with the given body.
fn single_function(params: Vec<ValType>, results: Vec<ValType>, body: &[Instruction]) -> Module {
    let mut module = Module::new();
    let mut types = TypeSection::new();
    types.ty().function(params, results);
    module.section(&types);
    let mut funcs = FunctionSection::new();
    funcs.function(0);
    module.section(&funcs);
    let mut exports = ExportSection::new();
    exports.export("f", ExportKind::Func, 0);
    module.section(&exports);
    let mut code = CodeSection::new();
    let mut f = Function::new(vec![]);
    for instr in body {
        f.instruction(instr);
    }
    f.instruction(&Instruction::End);
    code.function(&f);
    module.section(&code);
    module
}

fn compile_bytes(namespace: &str, bytes: &[u8]) -> Result<CompiledModule, CompileError> {
    let module = masm_decoder::decode(bytes).expect("fixture should decode");
    compile(namespace, &module)
}

fn names(compiled: &CompiledModule) -> Vec<String> {
    compiled
        .sequences
        .iter()
        .map(|s| s.symbol.qualified_name(&compiled.namespace))
        .collect()
}

/// A module with one paged memory, a mutable and an immutable global,
/// exports of each kind, a data segment and a start function.
fn stateful_module() -> Vec<u8> {
    let mut module = Module::new();
    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![]);
    types.ty().function(vec![ValType::I32], vec![ValType::I32]);
    module.section(&types);

    let mut funcs = FunctionSection::new();
    funcs.function(0);
    funcs.function(1);
    module.section(&funcs);

    let mut mems = MemorySection::new();
    mems.memory(memory(1, Some(4)));
    module.section(&mems);

    let mut globals = GlobalSection::new();
    globals.global(global(true), &ConstExpr::i32_const(5));
    globals.global(global(false), &ConstExpr::i32_const(6));
    module.section(&globals);

    let mut exports = ExportSection::new();
    exports.export("id", ExportKind::Func, 1);
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("counter", ExportKind::Global, 0);
    exports.export("fixed", ExportKind::Global, 1);
    module.section(&exports);

    module.section(&wasm_encoder::StartSection { function_index: 0 });

    let mut code = CodeSection::new();
    let mut start = Function::new(vec![]);
    start.instruction(&Instruction::End);
    code.function(&start);
    let mut id = Function::new(vec![]);
    id.instruction(&Instruction::LocalGet(0));
    id.instruction(&Instruction::End);
    code.function(&id);
    module.section(&code);

    let mut data = DataSection::new();
    data.active(0, &ConstExpr::i32_const(8), [1u8, 2, 3]);
    module.section(&data);

    let bytes = module.finish();
    wasmparser::validate(&bytes).expect("fixture should validate");
    bytes
}

// ══════════════════════════════════════════════════════════════════════════════
// Emitted sequences
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_add_function_layout() {
    let module = single_function(
        vec![ValType::I32, ValType::I32],
        vec![ValType::I32],
        &[
            Instruction::LocalGet(0),
            Instruction::LocalGet(1),
            Instruction::I32Add,
        ],
    );
    let compiled = compile_bytes("demo", &module.finish()).unwrap();
    assert_eq!(
        names(&compiled),
        vec!["demo:__internal/funcs/0", "demo:f", "demo:__init"]
    );
    let body = &compiled.render()[0].1;
    assert_eq!(
        body[0],
        "data modify storage masm:__internal stack append from storage masm:__internal frames[-1][0]"
    );
    assert_eq!(body[5], "scoreboard players operation #a masm += #b masm");
}

#[test]
fn test_stateful_module_symbols() {
    let compiled = compile_bytes("demo", &stateful_module()).unwrap();
    let symbols: Vec<&Symbol> = compiled.sequences.iter().map(|s| &s.symbol).collect();

    for expected in [
        Symbol::Func(0),
        Symbol::Func(1),
        Symbol::Memory(0, MemoryOp::Get),
        Symbol::Memory(0, MemoryOp::Set),
        Symbol::Memory(0, MemoryOp::SwapIn),
        Symbol::Memory(0, MemoryOp::SwapOut),
        Symbol::Memory(0, MemoryOp::GrowUnchecked),
        Symbol::Memory(0, MemoryOp::GrowLoop),
        Symbol::SwapOutAll,
        Symbol::Global(0, GlobalOp::Get),
        Symbol::Global(1, GlobalOp::Set),
        Symbol::ExportFunc("id".into()),
        Symbol::ExportMemory("memory".into(), MemoryOp::Grow),
        Symbol::ExportGlobal("counter".into(), GlobalOp::Set),
        Symbol::ExportGlobal("fixed".into(), GlobalOp::Get),
        Symbol::Init,
    ] {
        assert!(symbols.contains(&&expected), "missing {expected:?}");
    }
    // Immutable globals get no exported setter.
    assert!(!symbols.contains(&&Symbol::ExportGlobal("fixed".into(), GlobalOp::Set)));
    assert_eq!(compiled.sequences.last().unwrap().symbol, Symbol::Init);
    assert_eq!(
        compiled.tag_members(Tag::SwapOut),
        vec!["demo:__internal/mems/swap_out"]
    );
}

#[test]
fn test_init_sequence_order() {
    let compiled = compile_bytes("demo", &stateful_module()).unwrap();
    let init = compiled.render().pop().unwrap().1;
    assert_eq!(init[0], "data modify storage demo:__internal mems set value []");
    assert_eq!(init[1], "data modify storage demo:__internal globals set value []");
    assert_eq!(init[2], "data modify storage demo:__internal mems append value []");
    assert_eq!(init[3], "scoreboard players set #a masm 1");
    assert_eq!(init[4], "function demo:__internal/mems/0/grow_unchecked");
    // Data bytes are written through the memory's setter.
    assert!(init
        .iter()
        .any(|l| l == "scoreboard players set #a masm 3"));
    // The start function runs last.
    assert_eq!(
        init[init.len() - 3],
        "function demo:__internal/funcs/0"
    );
    assert_eq!(
        init.last().unwrap(),
        "scoreboard players set #br_depth masm 2147483647"
    );
}

#[test]
fn test_imports_forward_to_other_namespaces() {
    let mut module = Module::new();
    let mut types = TypeSection::new();
    types.ty().function(vec![ValType::I32], vec![]);
    module.section(&types);
    let mut imports = ImportSection::new();
    imports.import("env", "log", EntityType::Function(0));
    imports.import("lib", "heap", EntityType::Memory(memory(1, None)));
    imports.import("lib", "sp", EntityType::Global(global(true)));
    module.section(&imports);

    let compiled = compile_bytes("demo", &module.finish()).unwrap();
    let rendered = compiled.render();
    let find = |name: &str| {
        rendered
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, lines)| lines.clone())
            .unwrap()
    };
    assert_eq!(
        find("demo:__internal/funcs/0"),
        vec![
            "data modify storage masm:__internal stack append from storage masm:__internal frames[-1][0]",
            "function env:log",
        ]
    );
    assert_eq!(find("demo:__internal/mems/0/get"), vec!["function lib:__mems/heap/get"]);
    assert_eq!(
        find("demo:__internal/globals/0/set"),
        vec!["function lib:__globals/sp/set"]
    );
    assert!(compiled.tags.is_empty());
}

#[test]
fn test_immutable_imported_global_has_no_setter() {
    let mut module = Module::new();
    let mut imports = ImportSection::new();
    imports.import("lib", "base", EntityType::Global(global(false)));
    imports.import("lib", "sp", EntityType::Global(global(true)));
    module.section(&imports);

    let compiled = compile_bytes("demo", &module.finish()).unwrap();
    let symbols: Vec<&Symbol> = compiled.sequences.iter().map(|s| &s.symbol).collect();
    assert!(symbols.contains(&&Symbol::Global(0, GlobalOp::Get)));
    assert!(!symbols.contains(&&Symbol::Global(0, GlobalOp::Set)));
    assert!(symbols.contains(&&Symbol::Global(1, GlobalOp::Get)));
    assert!(symbols.contains(&&Symbol::Global(1, GlobalOp::Set)));
    assert!(!names(&compiled).contains(&"demo:__internal/globals/0/set".to_string()));
}

#[test]
fn test_import_and_export_names_become_paths() {
    let mut module = Module::new();
    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![]);
    module.section(&types);
    let mut imports = ImportSection::new();
    imports.import("env", "../../escaped", EntityType::Function(0));
    module.section(&imports);
    let err = compile_bytes("demo", &module.finish()).unwrap_err();
    assert_eq!(
        err,
        CompileError::InvalidName {
            kind: "import",
            name: "../../escaped".into()
        }
    );

    let module = single_function(vec![], vec![], &[]);
    let bytes = module.finish();
    assert!(compile_bytes("demo", &bytes).is_ok());
    let mut renamed = masm_decoder::decode(&bytes).unwrap();
    for bad in ["../../../../escaped", "f\nsay hi", "F"] {
        renamed.exports[0].name = bad.into();
        assert_eq!(
            compile("demo", &renamed).unwrap_err(),
            CompileError::InvalidName {
                kind: "export",
                name: bad.into()
            }
        );
    }
}

#[test]
fn test_arithmetic_calls_runtime() {
    let module = single_function(
        vec![ValType::I32, ValType::I32],
        vec![ValType::I32],
        &[
            Instruction::LocalGet(0),
            Instruction::LocalGet(1),
            Instruction::I32DivU,
        ],
    );
    let compiled = compile_bytes("demo", &module.finish()).unwrap();
    let body = &compiled.sequences[0].commands;
    assert!(body.contains(&masm_codegen::command::Command::call(Symbol::Runtime(
        RuntimeFn::DivU
    ))));
}

#[test]
fn test_compilation_is_deterministic() {
    let bytes = stateful_module();
    let a = compile_bytes("demo", &bytes).unwrap().render();
    let b = compile_bytes("demo", &bytes).unwrap().render();
    assert_eq!(a, b);
}

#[test]
fn test_namespace_substitution() {
    let bytes = single_function(
        vec![ValType::I32],
        vec![ValType::I32],
        &[Instruction::LocalGet(0), Instruction::Call(0)],
    )
    .finish();
    let a = compile_bytes("one", &bytes).unwrap();
    let b = compile_bytes("two", &bytes).unwrap();
    assert_eq!(a.sequences, b.sequences);
    assert_ne!(a.render(), b.render());
}

// ══════════════════════════════════════════════════════════════════════════════
// Rejected modules
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_unused_wide_type_rejected() {
    let mut module = Module::new();
    let mut types = TypeSection::new();
    types.ty().function(vec![ValType::I64], vec![]);
    module.section(&types);
    let err = compile_bytes("demo", &module.finish()).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedType(ref msg) if msg.contains("i64")));
}

#[test]
fn test_table_import_rejected() {
    let mut module = Module::new();
    let mut imports = ImportSection::new();
    imports.import(
        "env",
        "table",
        EntityType::Table(TableType {
            element_type: RefType::FUNCREF,
            minimum: 1,
            maximum: None,
            table64: false,
            shared: false,
        }),
    );
    module.section(&imports);
    let err = compile_bytes("demo", &module.finish()).unwrap_err();
    assert!(matches!(err, CompileError::Unsupported(_)));
}

#[test]
fn test_local_tables_are_ignored() {
    let mut module = Module::new();
    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        minimum: 1,
        maximum: None,
        table64: false,
        shared: false,
    });
    module.section(&tables);
    assert!(compile_bytes("demo", &module.finish()).is_ok());
}

#[test]
fn test_call_indirect_rejected() {
    let module = single_function(
        vec![],
        vec![],
        &[
            Instruction::I32Const(0),
            Instruction::CallIndirect {
                type_index: 0,
                table_index: 0,
            },
        ],
    );
    let err = compile_bytes("demo", &module.finish()).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnsupportedInstruction("call_indirect".into())
    );
}

#[test]
fn test_memory_over_limit_rejected() {
    let mut module = Module::new();
    let mut mems = MemorySection::new();
    mems.memory(memory(0, Some(70_000)));
    module.section(&mems);
    let err = compile_bytes("demo", &module.finish()).unwrap_err();
    assert!(matches!(err, CompileError::LimitExceeded(_)));
}

#[test]
fn test_namespace_too_long() {
    let err = compile("a_very_long_namespace", &masm_types::ast::Module::default()).unwrap_err();
    assert!(matches!(err, CompileError::NamespaceTooLong { max: 16, .. }));
}
