//! The `masm` command end to end: argument parsing, compilation and the
//! data pack written to disk.

use std::fs;
use std::path::Path;

use clap::Parser;
use masm_cli::{default_namespace, run, Cli};
use wasm_encoder::{
    CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction, MemorySection,
    MemoryType, Module, TypeSection, ValType,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// `add(a, b)` plus a one-page exported memory.
fn add_module() -> Vec<u8> {
    add_module_exported_as("add")
}

fn add_module_exported_as(name: &str) -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    types
        .ty()
        .function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
    module.section(&types);

    let mut funcs = FunctionSection::new();
    funcs.function(0);
    module.section(&funcs);

    let mut mems = MemorySection::new();
    mems.memory(MemoryType {
        minimum: 1,
        maximum: Some(1),
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&mems);

    let mut exports = ExportSection::new();
    exports.export(name, ExportKind::Func, 0);
    exports.export("memory", ExportKind::Memory, 0);
    module.section(&exports);

    let mut code = CodeSection::new();
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::End);
    code.function(&f);
    module.section(&code);

    module.finish()
}

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("masm").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn read_json(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    serde_json::from_str(&text).unwrap()
}

// ══════════════════════════════════════════════════════════════════════════════
// Arguments
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_defaults() {
    let cli = cli(&["add.wasm"]);
    assert_eq!(cli.output, Path::new("out"));
    assert_eq!(cli.description, "masm data pack");
    assert_eq!(cli.namespace, None);
    assert!(!cli.dump);
    assert!(!cli.no_runtime);
}

#[test]
fn test_short_flags() {
    let cli = cli(&["-o", "pack", "-d", "demo pack", "-n", "demo", "--no-runtime", "-"]);
    assert_eq!(cli.output, Path::new("pack"));
    assert_eq!(cli.description, "demo pack");
    assert_eq!(cli.namespace.as_deref(), Some("demo"));
    assert!(cli.no_runtime);
    assert_eq!(cli.input, Path::new("-"));
}

#[test]
fn test_input_is_required() {
    assert!(Cli::try_parse_from(["masm"]).is_err());
}

#[test]
fn test_default_namespace() {
    assert_eq!(default_namespace(Path::new("dir/Add.wasm")), "add");
    assert_eq!(default_namespace(Path::new("my module.wasm")), "my_module");
    assert_eq!(default_namespace(Path::new("-")), "module");
}

// ══════════════════════════════════════════════════════════════════════════════
// Pack output
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_writes_pack_with_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("add.wasm");
    fs::write(&input, add_module()).unwrap();
    let out = dir.path().join("pack");

    let summary = run(&cli(&[
        "-o",
        out.to_str().unwrap(),
        "-d",
        "adder",
        input.to_str().unwrap(),
    ]))
    .unwrap();
    assert!(summary.functions > 0);
    assert_eq!(summary.tags, 2);

    let meta = read_json(&out.join("pack.mcmeta"));
    assert_eq!(meta["pack"]["description"], "adder");
    assert_eq!(meta["pack"]["pack_format"], masm_cli::pack::PACK_FORMAT);

    let add = fs::read_to_string(out.join("data/add/functions/add.mcfunction")).unwrap();
    assert!(add.lines().any(|line| line == "function add:__internal/funcs/0"));
    assert!(out.join("data/masm/functions/__internal/load.mcfunction").exists());

    let load = read_json(&out.join("data/minecraft/tags/functions/load.json"));
    assert_eq!(
        load["values"],
        serde_json::json!(["masm:__internal/load", "add:__init"])
    );
    let swap_out = read_json(&out.join("data/masm/tags/functions/__internal/mems/swap_out.json"));
    assert_eq!(
        swap_out["values"],
        serde_json::json!(["add:__internal/mems/swap_out"])
    );
}

#[test]
fn test_no_runtime_omits_library() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("add.wasm");
    fs::write(&input, add_module()).unwrap();
    let out = dir.path().join("pack");

    run(&cli(&[
        "-o",
        out.to_str().unwrap(),
        "-n",
        "calc",
        "--no-runtime",
        input.to_str().unwrap(),
    ]))
    .unwrap();

    assert!(out.join("data/calc/functions/add.mcfunction").exists());
    assert!(!out.join("data/masm/functions").exists());
    let load = read_json(&out.join("data/minecraft/tags/functions/load.json"));
    assert_eq!(load["values"], serde_json::json!(["calc:__init"]));
}

#[test]
fn test_compile_error_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("add.wasm");
    fs::write(&input, add_module()).unwrap();
    let out = dir.path().join("pack");

    let err = run(&cli(&[
        "-o",
        out.to_str().unwrap(),
        "-n",
        "this-namespace-is-too-long",
        input.to_str().unwrap(),
    ]))
    .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.starts_with("failed to compile"), "{message}");
    assert!(message.contains("this-namespace-is-too-long"), "{message}");
    assert!(!out.exists());
}

#[test]
fn test_missing_input_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(&cli(&[dir.path().join("absent.wasm").to_str().unwrap()])).unwrap_err();
    assert!(err.to_string().starts_with("failed to read"));
}

#[test]
fn test_export_name_cannot_escape_pack() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("add.wasm");
    fs::write(&input, add_module_exported_as("../../../../escaped")).unwrap();
    let out = dir.path().join("pack");

    let err = run(&cli(&["-o", out.to_str().unwrap(), input.to_str().unwrap()])).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("invalid export name"), "{message}");
    assert!(!out.exists());
    assert!(!dir.path().join("escaped.mcfunction").exists());
}
