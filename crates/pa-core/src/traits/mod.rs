//! Collaborator traits consumed by the session orchestrator

mod session;
mod store;

pub use session::{ResponseEvent, ResponseHandler, RpcSession, SessionFactory};
pub use store::ConfigStore;
