use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure while decoding a binary module.
///
/// `offset` is the byte position in the input where decoding stopped. The
/// message texts are stable; tests and callers match on them.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("decode error at offset {offset}: {message}")]
pub struct DecodeError {
    pub offset: usize,
    pub message: String,
}

impl DecodeError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}
