//! # masm-codegen
//!
//! Lowers a decoded module to named sequences of typed commands for a
//! scoreboard-and-storage command machine.
//!
//! Values live on an operand stack in storage; locals live in per-call
//! frames; scalar work happens in scoreboard registers. Structured control
//! flow is linearized with a branch-depth register and continuation
//! fragments (see [`linearizer`]). Linear memory is paged through a single
//! shared window (see [`memory`]). Operators without a direct command
//! equivalent call into the shared runtime library ([`runtime`]).
//!
//! [`compile`] is the entry point; [`runtime::build`] produces the library
//! every compiled module depends on.

pub mod command;
pub mod compiler;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod linearizer;
pub mod load_store;
pub mod memory;
pub mod numeric;
pub mod output;
pub mod runtime;
pub mod symbol;

pub use compiler::{check_name, check_namespace, compile, MAX_NAMESPACE_LEN};
pub use error::{CodegenResult, CompileError};
pub use output::{CompiledModule, Sequence};
pub use symbol::{Symbol, Tag};
