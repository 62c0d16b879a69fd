//! Executor error types.

use thiserror::Error;

/// A condition the target machine would not diagnose but the executor
/// refuses to paper over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A register read before anything wrote it.
    #[error("read of unset score {0}")]
    UnsetScore(String),

    /// A write, append, remove or copy source that does not resolve.
    #[error("no value at {0}")]
    MissingPath(String),

    #[error("type mismatch at {path}: {message}")]
    TypeMismatch { path: String, message: String },

    /// `execute store ... run function ...`
    #[error("cannot store the result of a function call")]
    StoreOfCall,

    /// Gas exhaustion
    #[error("gas exhausted after {0} commands")]
    GasExhausted(u64),
}

/// Result alias for executor operations.
pub type VmResult<T> = Result<T, VmError>;
