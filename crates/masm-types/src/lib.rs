//! Shared types for the masm compiler.
//!
//! This crate defines the decoded module AST, the numeric opcode table, and
//! the decode error type used by every later stage.

mod error;
pub mod ast;
pub mod numeric;

pub use error::DecodeError;
pub use numeric::NumericOp;

/// Deepest nesting of `block`, `loop` and `if` the decoder accepts.
///
/// Decoding and code generation both recurse once per level.
pub const MAX_NESTING_DEPTH: usize = 512;

/// Result type used by the decoder.
pub type Result<T> = std::result::Result<T, DecodeError>;
