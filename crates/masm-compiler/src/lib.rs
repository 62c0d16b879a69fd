//! masm compiler: orchestrates the full compilation pipeline.
//!
//! ```text
//! .wasm bytes → Decoder → Module → Codegen → CompiledModule (command sequences)
//! ```
//!
//! The namespace is checked before anything is decoded, so an unusable
//! namespace fails fast whatever the input bytes are. The shared runtime
//! library every compiled module calls into is available from [`runtime`].

use masm_types::ast::Module;
use masm_types::DecodeError;
use thiserror::Error;

pub use masm_codegen::{CompileError, CompiledModule, Sequence, Symbol, Tag, MAX_NAMESPACE_LEN};

/// Any failure of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Pipeline switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Write the decoded module to stderr as pretty JSON.
    pub dump_module: bool,
}

/// Compile a binary module under `namespace`.
pub fn compile(namespace: &str, bytes: &[u8]) -> Result<CompiledModule, Error> {
    compile_with_options(namespace, bytes, &CompileOptions::default())
}

pub fn compile_with_options(
    namespace: &str,
    bytes: &[u8],
    options: &CompileOptions,
) -> Result<CompiledModule, Error> {
    masm_codegen::check_namespace(namespace)?;

    let module = masm_decoder::decode(bytes)?;
    tracing::debug!(
        namespace,
        types = module.types.len(),
        imports = module.imports.len(),
        functions = module.funcs.len(),
        memories = module.mems.len(),
        "decoded module"
    );
    if options.dump_module {
        eprintln!("{}", dump_module(&module));
    }

    Ok(masm_codegen::compile(namespace, &module)?)
}

/// The decoded module as pretty-printed JSON.
pub fn dump_module(module: &Module) -> String {
    serde_json::to_string_pretty(module)
        .unwrap_or_else(|e| format!(r#"{{"error":"serialization error: {e}"}}"#))
}

/// The shared runtime library, emitted once per pack under `masm`.
pub fn runtime() -> CompiledModule {
    masm_codegen::runtime::build()
}
