//! Session implementations

mod stdio;

pub use stdio::{StdioSession, StdioSessionFactory, LLM_ENV_PREFIX};
