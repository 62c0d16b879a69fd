//! The `masm` command: read a module, compile it and write a data pack.

pub mod pack;

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use masm_compiler::CompileOptions;

pub use pack::{write_pack, PackSummary};

/// Compile a WebAssembly module into a Minecraft data pack.
#[derive(Parser, Debug, Clone)]
#[command(name = "masm", version, about)]
pub struct Cli {
    /// Directory the data pack is written to
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Description stored in pack.mcmeta
    #[arg(short, long, default_value = "masm data pack")]
    pub description: String,

    /// Namespace of the compiled module [default: derived from the file name]
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Print the decoded module as JSON to stderr
    #[arg(long)]
    pub dump: bool,

    /// Do not write the runtime library into the pack
    #[arg(long)]
    pub no_runtime: bool,

    /// Input .wasm file, or `-` for stdin
    pub input: PathBuf,
}

/// Namespace for a module read from `input`: the lowercased file stem with
/// unusable characters replaced by `_`, or `module` for stdin.
pub fn default_namespace(input: &Path) -> String {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-" && !s.is_empty());
    match stem {
        Some(stem) => stem
            .to_ascii_lowercase()
            .chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '_' | '.' | '-' => c,
                _ => '_',
            })
            .collect(),
        None => "module".to_string(),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read module from stdin")?;
        Ok(bytes)
    } else {
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

pub fn run(cli: &Cli) -> Result<PackSummary> {
    let bytes = read_input(&cli.input)?;
    let namespace = cli
        .namespace
        .clone()
        .unwrap_or_else(|| default_namespace(&cli.input));
    tracing::debug!(input = %cli.input.display(), %namespace, bytes = bytes.len(), "compiling");

    let options = CompileOptions {
        dump_module: cli.dump,
    };
    let module = masm_compiler::compile_with_options(&namespace, &bytes, &options)
        .with_context(|| format!("failed to compile {}", cli.input.display()))?;

    let mut modules = Vec::with_capacity(2);
    if !cli.no_runtime {
        modules.push(masm_compiler::runtime());
    }
    modules.push(module);

    write_pack(&cli.output, &cli.description, &modules)
        .with_context(|| format!("failed to write data pack to {}", cli.output.display()))
}
