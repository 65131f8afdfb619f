//! Error taxonomy for the core pipeline.

use thiserror::Error;

/// Errors raised while assembling or executing a Brainfuck program.
#[derive(Debug, Error)]
pub enum BfError {
    /// A `]` was encountered with no matching open `[` before it.
    #[error("unmatched ']' at source position {pos}")]
    UnmatchedClose {
        /// Character offset into the sanitized source.
        pos: usize,
    },

    /// The source ended with one or more `[` never closed.
    #[error("unmatched '[' ({count} bracket(s) left open)")]
    UnmatchedOpen {
        /// Number of brackets left open at end of source.
        count: usize,
    },

    /// A read or write against stdin/stdout failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The host JIT toolchain failed to initialize or compile the module.
    #[error("jit error: {0}")]
    Jit(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BfError>;
