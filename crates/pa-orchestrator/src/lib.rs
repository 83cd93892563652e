//! pa-orchestrator: Session orchestration for PamirAI Assistant
//!
//! The orchestrator sits between a UI surface and an assistant server
//! session. It owns the connection state, the conversation log, the status
//! line and the per-query stop flag, and mediates every call into the
//! session: connect, query, stop, configuration rebuild and shutdown.

pub mod backoff;
pub mod conversation;
pub mod deadline;
pub mod discovery;
pub mod observer;
pub mod orchestrator;
pub mod session;
pub mod status;
pub mod stop;

pub use conversation::{ConversationLog, LogEntry, Role};
pub use deadline::Deadline;
pub use observer::{OrchestratorEvent, SubscriptionId};
pub use orchestrator::{
    CleanupOutcome, OrchestratorBuilder, SessionOrchestrator, ShutdownHandle, ShutdownOutcome,
    TerminateHook, STOPPING_MESSAGE,
};
pub use session::{StdioSession, StdioSessionFactory};
pub use status::SessionStatus;
pub use stop::StopFlag;
