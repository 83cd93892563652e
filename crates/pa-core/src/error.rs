//! Core error types for PamirAI Assistant

use pa_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an RPC session
#[derive(Error, Debug)]
pub enum SessionError {
    /// No server is attached to the session
    #[error("Session is not connected")]
    NotConnected,

    /// The session object could not be built
    #[error("Failed to create session: {0}")]
    Construction(String),

    /// The server process could not be started
    #[error("Failed to start server {path}: {reason}")]
    SpawnFailed { path: PathBuf, reason: String },

    /// The server did not complete the startup exchange
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The server went away mid-exchange
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The server reported an error for the query
    #[error("Server error: {0}")]
    Server(String),

    /// Malformed traffic
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Section/key pair that the configuration schema does not define
    #[error("Unknown config key: {section}.{key}")]
    UnknownKey { section: String, key: String },

    /// Value of the wrong type for the key
    #[error("Invalid value for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
}

/// Failures surfaced by the session orchestrator to the UI layer.
///
/// Each variant maps to an Error status plus a conversation log entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// An operation needed a connected session
    #[error("Not connected to a server")]
    NotConnected,

    /// Connecting to the server failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A query failed while being processed
    #[error("Error processing query: {0}")]
    ProcessingError(String),

    /// Session cleanup did not finish in time
    #[error("Session cleanup timed out")]
    CleanupTimeout,

    /// Reloading or applying configuration failed
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// No session object could be constructed
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),
}
