//! pa-protocol: Messages exchanged with a stdio-attached assistant server
//!
//! The stdio session adapter talks to a spawned server process using one
//! JSON object per line. This crate defines those messages and the tokio
//! codec that frames them.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{JsonLineCodec, MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use message::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
