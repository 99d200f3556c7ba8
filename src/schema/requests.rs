use serde::Serialize;
use serde_json::{Map, Value};

use super::*;

/// Requests this client sends to the server. Serialized adjacently tagged so
/// that the method name and the params object can be lifted straight into a
/// [`JSONRPCRequest`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub(crate) enum ClientRequest {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "initialize")]
    Initialize {
        #[serde(rename = "protocolVersion")]
        protocol_version: String,
        capabilities: ClientCapabilities,
        #[serde(rename = "clientInfo")]
        client_info: Implementation,
    },
    #[serde(rename = "tools/list")]
    ListTools {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "tools/call")]
    CallTool {
        name: String,
        arguments: Map<String, Value>,
    },
    #[serde(rename = "resources/list")]
    ListResources {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "resources/templates/list")]
    ListResourceTemplates {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
    #[serde(rename = "resources/read")]
    ReadResource { uri: String },
    #[serde(rename = "prompts/list")]
    ListPrompts {
        #[serde(skip_serializing_if = "Option::is_none")]
        cursor: Option<Cursor>,
    },
}

impl ClientRequest {
    pub fn method(&self) -> &'static str {
        match self {
            ClientRequest::Ping => "ping",
            ClientRequest::Initialize { .. } => "initialize",
            ClientRequest::ListTools { .. } => "tools/list",
            ClientRequest::CallTool { .. } => "tools/call",
            ClientRequest::ListResources { .. } => "resources/list",
            ClientRequest::ListResourceTemplates { .. } => "resources/templates/list",
            ClientRequest::ReadResource { .. } => "resources/read",
            ClientRequest::ListPrompts { .. } => "prompts/list",
        }
    }

    /// Build the JSON-RPC envelope for this request under the given id.
    pub fn into_jsonrpc(self, id: RequestId) -> crate::Result<JSONRPCRequest> {
        let method = self.method().to_string();
        let params = match serde_json::to_value(self)? {
            Value::Object(mut obj) => obj.remove("params"),
            _ => None,
        };
        Ok(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method,
            params,
        })
    }
}

pub(crate) const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paginated_request_envelope() {
        let request = ClientRequest::ListTools {
            cursor: Some("page-2".into()),
        }
        .into_jsonrpc(RequestId::String("req-1".into()))
        .unwrap();
        assert_eq!(request.method, "tools/list");
        assert_eq!(request.params, Some(json!({"cursor": "page-2"})));

        let request = ClientRequest::ListPrompts { cursor: None }
            .into_jsonrpc(RequestId::Number(3))
            .unwrap();
        assert_eq!(request.method, "prompts/list");
        assert_eq!(request.params, Some(json!({})));
    }

    #[test]
    fn test_ping_has_no_params() {
        let request = ClientRequest::Ping
            .into_jsonrpc(RequestId::Number(1))
            .unwrap();
        assert_eq!(request.method, "ping");
        assert!(request.params.is_none());
        let wire = serde_json::to_value(&request).unwrap();
        assert!(!wire.as_object().unwrap().contains_key("params"));
    }

    #[test]
    fn test_call_tool_envelope_keeps_argument_order() {
        let mut arguments = Map::new();
        arguments.insert("skills".into(), json!(["Rust", "Tokio"]));
        arguments.insert("max_budget".into(), json!(1000));
        arguments.insert("platforms".into(), json!(["upwork"]));

        let request = ClientRequest::CallTool {
            name: "search_gigs".into(),
            arguments,
        }
        .into_jsonrpc(RequestId::String("req-9".into()))
        .unwrap();

        let params = request.params.unwrap();
        assert_eq!(params["name"], "search_gigs");
        let keys: Vec<&String> = params["arguments"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["skills", "max_budget", "platforms"]);
    }
}
