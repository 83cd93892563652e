//! Status line of the orchestrator

use std::fmt;

/// Current state of the orchestrator as shown to the user.
///
/// Exactly one status is current at a time; every transition is broadcast
/// to observers as its display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// Building the session
    Initializing,
    /// Attaching to a server
    Connecting { server: String },
    /// Attached to a server
    Connected { server: String },
    /// No server attached
    Disconnected,
    /// Query sent, waiting for the first response data
    Processing,
    /// Response chunks are arriving
    Streaming,
    /// Ready for the next query
    Idle,
    /// Something failed; further operations may still be attempted
    Error { cause: String },
    /// Shutdown in progress
    ShuttingDown,
}

impl SessionStatus {
    /// Build an error status from any displayable cause
    pub fn error(cause: impl fmt::Display) -> Self {
        SessionStatus::Error {
            cause: cause.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SessionStatus::Error { .. })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Initializing => write!(f, "Initializing..."),
            SessionStatus::Connecting { server } => write!(f, "Connecting to {}...", server),
            SessionStatus::Connected { server } => write!(f, "Connected to {}", server),
            SessionStatus::Disconnected => write!(f, "Disconnected"),
            SessionStatus::Processing => write!(f, "Processing query..."),
            SessionStatus::Streaming => write!(f, "Streaming response..."),
            SessionStatus::Idle => write!(f, "Ready"),
            SessionStatus::Error { cause } => write!(f, "Error: {}", cause),
            SessionStatus::ShuttingDown => write!(f, "Shutting down..."),
        }
    }
}
