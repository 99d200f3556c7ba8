use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Spawning the server or completing the handshake failed. The client
    /// that produced this error is closed and must be rebuilt.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A tool call, listing or resource read failed.
    #[error("Failed to {operation}: {message}")]
    Call { operation: String, message: String },

    #[error("Client is not connected (session is {state})")]
    NotConnected { state: &'static str },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request {request_id} timed out after {duration:?}")]
    Timeout {
        duration: Duration,
        request_id: String,
    },
}

impl Error {
    /// Wrap a lower-level failure with the operation it interrupted.
    pub fn call(operation: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Error::Call {
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    pub fn timeout(duration: Duration, request_id: impl Into<String>) -> Self {
        Error::Timeout {
            duration,
            request_id: request_id.into(),
        }
    }

    pub fn connection(message: impl std::fmt::Display) -> Self {
        Error::Connection(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_display() {
        let err = Error::call("review code", "file not found");
        assert_eq!(err.to_string(), "Failed to review code: file not found");
    }

    #[test]
    fn test_call_wraps_nested_error() {
        let inner = Error::Rpc {
            code: -32603,
            message: "boom".into(),
        };
        let err = Error::call("call tool 'validate'", &inner);
        assert_eq!(
            err.to_string(),
            "Failed to call tool 'validate': JSON-RPC error -32603: boom"
        );
    }
}
