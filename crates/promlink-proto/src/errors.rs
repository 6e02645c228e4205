//! Codec error types.
//!
//! Wire errors are diagnostic only: the engines drop malformed frames
//! silently, so these errors surface to embeddings that parse frames
//! themselves (transports, tooling, tests).

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced while parsing frame bytes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Buffer is shorter than the fixed frame layout requires.
    #[error("frame truncated: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Bytes the frame layout requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// First byte is not a representation id this protocol defines.
    #[error("unknown representation id {0:#04x}")]
    UnknownRepresentation(u8),

    /// Parse was attempted on an empty buffer.
    #[error("empty frame")]
    Empty,
}
