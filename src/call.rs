use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    schema::{CallToolResult, Content},
};

/// Message used when a tool result carries neither a structured payload nor
/// any text.
pub const NO_VALID_RESPONSE: &str = "No valid response received";

/// A named tool invocation with its argument map.
///
/// Arguments keep their insertion order on the wire. Once built, a request
/// is only read, never changed in place: every builder method consumes and
/// returns the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    name: String,
    arguments: Map<String, Value>,
    operation: Option<String>,
    timeout: Option<Duration>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
            operation: None,
            timeout: None,
        }
    }

    /// Build a request from a JSON value, which must be an object.
    pub fn from_value(name: impl Into<String>, arguments: Value) -> Result<Self> {
        let name = name.into();
        match arguments {
            Value::Object(arguments) => Ok(Self {
                arguments,
                ..Self::new(name)
            }),
            Value::Null => Ok(Self::new(name)),
            other => Err(Error::InvalidArguments(format!(
                "arguments for '{name}' must be a JSON object, got {other}"
            ))),
        }
    }

    /// Build a request from any serializable parameter struct.
    pub fn from_params<T: Serialize>(name: impl Into<String>, params: &T) -> Result<Self> {
        Self::from_value(name, serde_json::to_value(params)?)
    }

    /// Add one argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Add an argument only when a value is present.
    pub fn arg_opt(self, key: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.arg(key, value),
            None => self,
        }
    }

    /// Wording used in failure messages, e.g. `review code` gives
    /// `Failed to review code: ...`.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Override the client's default request timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn operation(&self) -> String {
        self.operation
            .clone()
            .unwrap_or_else(|| format!("call tool '{}'", self.name))
    }

    pub(crate) fn into_parts(self) -> (String, Map<String, Value>) {
        (self.name, self.arguments)
    }
}

/// The decoded outcome of a tool call. Exactly one variant per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    /// A JSON object, either the server's structured payload or a text part
    /// that parsed as an object.
    Structured(Map<String, Value>),
    /// The first text part, verbatim, when it was not a JSON object.
    Text(String),
    /// The call failed; the message says why.
    Error(String),
}

impl ToolCallResult {
    /// Decode a raw `tools/call` result.
    ///
    /// 1. A non-empty `structuredContent` object is returned as is.
    /// 2. Otherwise the first text part is parsed; a JSON object becomes
    ///    `Structured`, anything else is returned as `Text`.
    /// 3. With neither, the result is an `Error`.
    ///
    /// A result the server flagged with `isError` and no structured payload
    /// becomes an `Error` carrying the server's text.
    pub fn decode(raw: CallToolResult, operation: &str) -> Self {
        if let Some(Value::Object(payload)) = raw.structured_content {
            if !payload.is_empty() {
                return ToolCallResult::Structured(payload);
            }
        }

        let first_text = raw.content.iter().find_map(Content::as_text);

        if raw.is_error == Some(true) {
            let message = first_text.unwrap_or("tool reported an error");
            return ToolCallResult::Error(Error::call(operation, message).to_string());
        }

        match first_text {
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(parsed)) => ToolCallResult::Structured(parsed),
                _ => ToolCallResult::Text(text.to_string()),
            },
            None => ToolCallResult::Error(NO_VALID_RESPONSE.to_string()),
        }
    }

    /// Turn a failure during the call into the `Error` variant.
    pub fn failure(operation: &str, error: impl std::fmt::Display) -> Self {
        ToolCallResult::Error(Error::call(operation, error).to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolCallResult::Error(_))
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            ToolCallResult::Structured(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolCallResult::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ToolCallResult::Error(message) => Some(message),
            _ => None,
        }
    }

    /// Look up a top-level field of a structured result.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_structured().and_then(|map| map.get(key))
    }

    /// Flatten into a single JSON object: structured results as they are,
    /// text under `response` and failures under `error`.
    pub fn into_json(self) -> Value {
        match self {
            ToolCallResult::Structured(map) => Value::Object(map),
            ToolCallResult::Text(text) => serde_json::json!({ "response": text }),
            ToolCallResult::Error(message) => serde_json::json!({ "error": message }),
        }
    }
}
