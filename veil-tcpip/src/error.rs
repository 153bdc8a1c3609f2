//! Error types for packet views

use thiserror::Error;

/// Result type alias for packet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing a packet view
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Buffer is shorter than the protocol's minimum header
    #[error("truncated packet: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Buffer does not carry the expected IP version
    #[error("unsupported IP version {0}")]
    Version(u8),
}
