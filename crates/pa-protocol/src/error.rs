//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A line exceeded the maximum accepted length
    #[error("Line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong { size: usize, max: usize },

    /// Line was not valid JSON for the expected message type
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
