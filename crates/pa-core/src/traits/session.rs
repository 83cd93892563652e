//! RPC session traits

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::SessionError;

/// Response data delivered by a session while a query is processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    /// Incremental piece of the answer (streaming mode)
    Chunk(String),
    /// The complete answer; may be empty when everything was streamed
    Complete(String),
}

/// Callback receiving response events.
///
/// It can be invoked from any task and may keep being invoked after the
/// caller has lost interest in the answer, so it must be cheap and
/// non-blocking.
pub type ResponseHandler = Arc<dyn Fn(ResponseEvent) + Send + Sync>;

/// Abstraction over a session with an assistant server
#[async_trait]
pub trait RpcSession: Send + Sync {
    /// Attach the session to the server at `server_path`
    async fn connect(&self, server_path: &Path) -> Result<(), SessionError>;

    /// Answer `query`, reporting the response through `on_event`.
    ///
    /// Resolves once the server has finished (or failed) answering.
    async fn process_query(&self, query: &str, on_event: ResponseHandler)
        -> Result<(), SessionError>;

    /// Ask the server to cancel the in-flight query.
    ///
    /// Returns whether the server acknowledged the request.
    async fn stop_response(&self) -> Result<bool, SessionError>;

    /// Release the server and any resources held by the session
    async fn cleanup(&self) -> Result<(), SessionError>;

    /// Name reported by the connected server
    fn server_name(&self) -> Option<String>;

    /// Whether responses are delivered as chunks
    fn streaming_enabled(&self) -> bool;
}

/// Builds sessions from a configuration snapshot
pub trait SessionFactory: Send + Sync {
    /// Create a new, unconnected session
    fn create(&self, config: &AppConfig) -> Result<Arc<dyn RpcSession>, SessionError>;
}

impl<F> SessionFactory for F
where
    F: Fn(&AppConfig) -> Result<Arc<dyn RpcSession>, SessionError> + Send + Sync,
{
    fn create(&self, config: &AppConfig) -> Result<Arc<dyn RpcSession>, SessionError> {
        self(config)
    }
}
