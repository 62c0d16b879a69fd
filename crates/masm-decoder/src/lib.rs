//! masm binary decoder: converts a WebAssembly binary into a [`Module`].
//!
//! The decoder follows the binary format closely and performs no semantic
//! validation. Every failure carries the byte offset where decoding stopped.
//!
//! [`Module`]: masm_types::ast::Module

pub mod decoder;
pub mod instr;
pub mod reader;

pub use decoder::decode;
pub use reader::Reader;
