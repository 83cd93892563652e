//! Message types for the stdio session
//!
//! # Message Flow
//!
//! 1. The client spawns the server process; the server writes `Hello`
//! 2. The client sends `Query`; the server answers with zero or more `Chunk`
//!    messages followed by `Done` (or `Error`)
//! 3. `Stop` may be sent while a query is in flight; the server acknowledges
//!    with `Stopped` and then ends the query with `Done`
//! 4. `Shutdown` asks the server to exit

use serde::{Deserialize, Serialize};

/// Current protocol version string, announced by the client in `Query`.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Message sent from the assistant client to the server process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the server to answer a query
    Query {
        text: String,
        /// Whether the client wants incremental chunks
        stream: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },

    /// Cancel the in-flight query
    Stop,

    /// Ask the server to exit
    Shutdown,
}

impl ClientMessage {
    /// Build a query message tagged with the current protocol version
    pub fn query(text: impl Into<String>, stream: bool) -> Self {
        ClientMessage::Query {
            text: text.into(),
            stream,
            version: Some(PROTOCOL_VERSION.to_string()),
        }
    }
}

/// Message sent from the server process to the assistant client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after startup
    Hello {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },

    /// Incremental piece of a response
    Chunk { text: String },

    /// End of a response; carries the full text when available
    Done {
        #[serde(default)]
        text: Option<String>,
    },

    /// Acknowledges a `Stop`
    Stopped,

    /// The server failed to answer
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_wire_shape() {
        let json = serde_json::to_string(&ClientMessage::query("turn on", true)).unwrap();
        assert_eq!(
            json,
            r#"{"type":"query","text":"turn on","stream":true,"version":"1.0"}"#
        );
    }

    #[test]
    fn test_stop_wire_shape() {
        let json = serde_json::to_string(&ClientMessage::Stop).unwrap();
        assert_eq!(json, r#"{"type":"stop"}"#);
    }

    #[test]
    fn test_server_messages_tolerate_missing_optionals() {
        let hello: ServerMessage = serde_json::from_str(r#"{"type":"hello","name":"Lights"}"#).unwrap();
        assert_eq!(
            hello,
            ServerMessage::Hello {
                name: "Lights".to_string(),
                description: None
            }
        );

        let done: ServerMessage = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, ServerMessage::Done { text: None });
    }

    #[test]
    fn test_error_and_stopped_wire_shapes() {
        let error: ServerMessage =
            serde_json::from_str(r#"{"type":"error","message":"model offline"}"#).unwrap();
        assert_eq!(
            error,
            ServerMessage::Error {
                message: "model offline".to_string()
            }
        );

        let stopped: ServerMessage = serde_json::from_str(r#"{"type":"stopped"}"#).unwrap();
        assert_eq!(stopped, ServerMessage::Stopped);
    }
}
