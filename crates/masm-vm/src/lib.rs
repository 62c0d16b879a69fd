//! Reference executor for masm command sequences.
//!
//! Runs [`CompiledModule`](masm_codegen::CompiledModule)s in memory with the
//! target's semantics: wrapping 32-bit scores, floor division, typed storage
//! values, `execute` conditions and stores, and function tags. Calls use an
//! explicit frame stack so deeply recursive programs never grow the host
//! stack, and every command consumes one unit of gas.
//!
//! The executor is stricter than the target in a few places: reading a
//! score nothing has written, and writing through a path that does not
//! resolve, are errors rather than silent no-ops.

pub mod error;
pub mod machine;
pub mod storage;

pub use error::{VmError, VmResult};
pub use machine::{Machine, DEFAULT_GAS_LIMIT};
