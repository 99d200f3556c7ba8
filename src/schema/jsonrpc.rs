use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC error codes
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Any JSON-RPC object that can be decoded off the wire, or encoded to be
/// sent. Variant order matters for untagged decoding: requests carry both
/// `id` and `method`, notifications only `method`, and errors are tried
/// before responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Error(JSONRPCError),
    Response(JSONRPCResponse),
}

/// A uniquely identifying ID for a request in JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => s.fmt(f),
            RequestId::Number(n) => n.fmt(f),
        }
    }
}

/// An opaque token used to represent a cursor for pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Cursor(s.to_string())
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Cursor(s)
    }
}

/// A request that expects a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A notification which does not expect a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JSONRPCNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A successful (non-error) response to a request. The result is kept as raw
/// JSON and decoded into the typed result by whoever issued the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

/// A response to a request that indicates an error occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: ErrorObject,
}

impl JSONRPCError {
    pub fn new(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: ErrorObject {
                code,
                message: message.into(),
                data: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type that occurred.
    pub code: i32,
    /// A short description of the error.
    pub message: String,
    /// Additional information about the error, defined by the sender.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_untagged_message_decoding() {
        let request: JSONRPCMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}),
        )
        .unwrap();
        assert!(matches!(request, JSONRPCMessage::Request(r) if r.id == RequestId::Number(7)));

        let notification: JSONRPCMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}),
        )
        .unwrap();
        assert!(matches!(notification, JSONRPCMessage::Notification(_)));

        let response: JSONRPCMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "id": "req-1", "result": {"tools": []}}),
        )
        .unwrap();
        match response {
            JSONRPCMessage::Response(r) => {
                assert_eq!(r.id, RequestId::String("req-1".into()));
                assert_eq!(r.result, json!({"tools": []}));
            }
            other => panic!("Expected response, got {other:?}"),
        }

        let error: JSONRPCMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "req-2",
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();
        assert!(matches!(error, JSONRPCMessage::Error(e) if e.error.code == METHOD_NOT_FOUND));
    }

    #[test]
    fn test_request_id_display() {
        assert_eq!(RequestId::String("req-3".into()).to_string(), "req-3");
        assert_eq!(RequestId::Number(42).to_string(), "42");
    }
}
