//! Codegen error types.

use thiserror::Error;

/// Errors that can occur while lowering a module to command sequences.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A value type other than `i32` appeared in a signature, local, global
    /// or block type.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// An instruction outside the lowered subset.
    #[error("unsupported instruction: {0}")]
    UnsupportedInstruction(String),

    /// A module feature the target cannot express (tables, table imports).
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    #[error("namespace '{namespace}' is longer than {max} characters")]
    NamespaceTooLong { namespace: String, max: usize },

    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),

    /// An export or import name that cannot become a function path.
    #[error("invalid {kind} name {name:?}")]
    InvalidName { kind: &'static str, name: String },

    /// An index past the end of its index space.
    #[error("{kind} index {index} out of bounds")]
    InvalidIndex { kind: &'static str, index: u32 },

    /// A branch to a label that does not enclose it.
    #[error("branch label {label} out of range at depth {depth}")]
    InvalidLabel { label: u32, depth: u32 },

    /// An instruction popped more values than the operand stack holds.
    #[error("operand stack underflow at {0}")]
    StackUnderflow(&'static str),

    /// Memory limits outside what the paging scheme supports.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CompileError>;
