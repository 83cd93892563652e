//! pa-core: Core abstractions and configuration for PamirAI Assistant
//!
//! This crate provides the shared error types, configuration structures,
//! domain types and the collaborator traits (RPC session, session factory,
//! configuration store) consumed by the session orchestrator.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ConfigError, OrchestratorError, SessionError};
pub use types::ServerDescriptor;
