//! Test utilities for `freelance_mcp_client`.
//!
//! The centrepiece is [`StubServer`], a scripted in-process server that
//! speaks the same newline-delimited JSON-RPC as the real freelance server.
//! Tests describe the tools and resources it should expose, override the
//! reply for any method, and afterwards inspect every message the client
//! sent. Downstream crates can use it via `freelance_mcp_client::testutils`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::{Map, Value};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream},
    task::JoinHandle,
};

use crate::{
    client::ToolClient,
    config::ClientConfig,
    error::{Error, Result},
    schema::{
        CallToolResult, Cursor, InitializeResult, JSONRPCError, JSONRPCMessage,
        JSONRPCNotification, JSONRPCRequest, JSONRPCResponse, ListPromptsResult,
        ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, ReadResourceResult,
        RequestId, Resource, ResourceContents, Tool, INVALID_PARAMS, JSONRPC_VERSION,
        METHOD_NOT_FOUND,
    },
    transport::StreamTransport,
};

/// Install a fmt subscriber for test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Create two in-memory duplex pipes forming one bidirectional channel.
///
/// The first two elements are the server's (`reader`, `writer`), the last
/// two the client's.
pub fn make_duplex_pair() -> (
    impl AsyncRead + Send + Sync + Unpin + 'static,
    impl AsyncWrite + Send + Sync + Unpin + 'static,
    impl AsyncRead + Send + Sync + Unpin + 'static,
    impl AsyncWrite + Send + Sync + Unpin + 'static,
) {
    let (server_reader, client_writer) = io::duplex(64 * 1024);
    let (client_reader, server_writer) = io::duplex(64 * 1024);
    (server_reader, server_writer, client_reader, client_writer)
}

/// Serialise a [`JSONRPCMessage`], append a `\n` delimiter and write it to the
/// provided writer.
pub async fn send_message<W>(writer: &mut W, message: &JSONRPCMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_vec(message)?;
    writer.write_all(&json).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single newline-delimited JSON-RPC message from the reader.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> Result<JSONRPCMessage>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_until(b'\n', &mut buf).await?;
    if buf.is_empty() {
        return Err(Error::ConnectionClosed);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(serde_json::from_slice(&buf)?)
}

/// How the stub answers one request.
#[derive(Debug, Clone)]
pub enum StubReply {
    Result(Value),
    Error { code: i32, message: String },
    /// Never answer.
    Hang,
    /// Close the connection instead of answering.
    Disconnect,
}

impl StubReply {
    pub fn result(value: impl serde::Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => StubReply::Result(value),
            Err(e) => StubReply::error(INVALID_PARAMS, e.to_string()),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        StubReply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn tool(result: CallToolResult) -> Self {
        Self::result(result)
    }
}

/// The client's end of a [`StubServer`] pipe.
pub type StubTransport = StreamTransport<DuplexStream, DuplexStream>;

type ToolHandler = Arc<dyn Fn(&Map<String, Value>) -> StubReply + Send + Sync>;

/// A scripted server for exercising [`ToolClient`] without a child process.
#[derive(Clone)]
pub struct StubServer {
    info: InitializeResult,
    tools: Vec<(Tool, ToolHandler)>,
    resources: Vec<(Resource, ResourceContents)>,
    overrides: HashMap<String, StubReply>,
    page_size: Option<usize>,
    banner: Vec<String>,
    after_initialized: Vec<JSONRPCMessage>,
}

impl Default for StubServer {
    fn default() -> Self {
        Self {
            info: InitializeResult::new("stub-freelance-server", "0.1.0")
                .with_tools()
                .with_resources()
                .with_prompts(),
            tools: Vec::new(),
            resources: Vec::new(),
            overrides: HashMap::new(),
            page_size: None,
            banner: Vec::new(),
            after_initialized: Vec::new(),
        }
    }
}

impl StubServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a tool whose reply is computed from the call's arguments.
    pub fn with_tool<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> StubReply + Send + Sync + 'static,
    {
        self.tools.push((Tool::new(name), Arc::new(handler)));
        self
    }

    /// Expose a tool that always returns the same result.
    pub fn with_tool_result(self, name: &str, result: CallToolResult) -> Self {
        self.with_tool(name, move |_| StubReply::tool(result.clone()))
    }

    /// Expose a tool that echoes its arguments back as structured content.
    pub fn with_echo_tool(self, name: &str) -> Self {
        self.with_tool(name, |args| {
            let echoed = Value::Object(args.clone());
            StubReply::tool(CallToolResult::new().with_structured_content(echoed))
        })
    }

    pub fn with_text_resource(mut self, uri: &str, text: &str) -> Self {
        self.resources.push((
            Resource::new(uri, uri.rsplit('/').next().unwrap_or(uri)),
            ResourceContents::text(uri, text),
        ));
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.info = self.info.with_instructions(instructions);
        self
    }

    /// Replace the reply for every request with this method.
    pub fn on(mut self, method: &str, reply: StubReply) -> Self {
        self.overrides.insert(method.to_string(), reply);
        self
    }

    /// Split listings into pages of at most `size` items.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size.max(1));
        self
    }

    /// Write a line that is not JSON-RPC before anything else, like a server
    /// printing a banner on stdout.
    pub fn with_banner(mut self, line: &str) -> Self {
        self.banner.push(line.to_string());
        self
    }

    /// Send a `ping` request to the client once it reports `initialized`.
    pub fn pinging_client(mut self) -> Self {
        self.after_initialized.push(JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::String("stub-ping".to_string()),
            method: "ping".to_string(),
            params: None,
        }));
        self
    }

    /// Send a notification to the client once it reports `initialized`,
    /// e.g. `notifications/message` log records.
    pub fn notifying_client(mut self, method: &str, params: Option<Value>) -> Self {
        let notification = JSONRPCNotification::new(method, params);
        self.after_initialized
            .push(JSONRPCMessage::Notification(notification));
        self
    }

    /// Start serving on an in-memory pipe. Returns the client's end as a
    /// transport and a handle to inspect the traffic.
    pub fn spawn(self) -> (StubTransport, StubHandle) {
        let (server_reader, client_writer) = io::duplex(64 * 1024);
        let (client_reader, server_writer) = io::duplex(64 * 1024);
        let received = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(self.serve(server_reader, server_writer, received.clone()));
        (
            StreamTransport::new(client_reader, client_writer),
            StubHandle { received, task },
        )
    }

    async fn serve<R, W>(
        self,
        reader: R,
        mut writer: W,
        received: Arc<Mutex<Vec<JSONRPCMessage>>>,
    ) where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        for line in &self.banner {
            let raw = format!("{line}\n");
            if writer.write_all(raw.as_bytes()).await.is_err() {
                return;
            }
        }

        let mut reader = BufReader::new(reader);
        while let Ok(message) = read_message(&mut reader).await {
            if let Ok(mut log) = received.lock() {
                log.push(message.clone());
            }

            let outgoing = match message {
                JSONRPCMessage::Request(request) => match self.reply(&request) {
                    StubReply::Result(result) => vec![JSONRPCMessage::Response(JSONRPCResponse {
                        jsonrpc: JSONRPC_VERSION.to_string(),
                        id: request.id,
                        result,
                    })],
                    StubReply::Error { code, message } => vec![JSONRPCMessage::Error(
                        JSONRPCError::new(request.id, code, message),
                    )],
                    StubReply::Hang => Vec::new(),
                    StubReply::Disconnect => return,
                },
                JSONRPCMessage::Notification(JSONRPCNotification { method, .. })
                    if method == "notifications/initialized" =>
                {
                    self.after_initialized.clone()
                }
                _ => Vec::new(),
            };

            for message in &outgoing {
                if send_message(&mut writer, message).await.is_err() {
                    return;
                }
            }
        }
    }

    fn reply(&self, request: &JSONRPCRequest) -> StubReply {
        if let Some(reply) = self.overrides.get(&request.method) {
            return reply.clone();
        }

        let params = request.params.clone().unwrap_or(Value::Null);
        let cursor = params.get("cursor").and_then(Value::as_str);
        match request.method.as_str() {
            "initialize" => StubReply::result(&self.info),
            "ping" => StubReply::Result(Value::Object(Map::new())),
            "tools/list" => {
                let tools: Vec<Tool> = self.tools.iter().map(|(t, _)| t.clone()).collect();
                let (tools, next_cursor) = self.page(tools, cursor);
                StubReply::result(ListToolsResult { tools, next_cursor })
            }
            "tools/call" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let empty = Map::new();
                let arguments = params
                    .get("arguments")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                match self.tools.iter().find(|(tool, _)| tool.name == name) {
                    Some((_, handler)) => handler(arguments),
                    None => StubReply::error(INVALID_PARAMS, format!("Unknown tool: {name}")),
                }
            }
            "resources/list" => {
                let resources: Vec<Resource> =
                    self.resources.iter().map(|(r, _)| r.clone()).collect();
                let (resources, next_cursor) = self.page(resources, cursor);
                StubReply::result(ListResourcesResult {
                    resources,
                    next_cursor,
                })
            }
            "resources/templates/list" => StubReply::result(ListResourceTemplatesResult::default()),
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
                match self.resources.iter().find(|(r, _)| r.uri == uri) {
                    Some((_, contents)) => {
                        StubReply::result(ReadResourceResult::new().with_content(contents.clone()))
                    }
                    None => StubReply::error(INVALID_PARAMS, format!("Unknown resource: {uri}")),
                }
            }
            "prompts/list" => StubReply::result(ListPromptsResult::new()),
            other => StubReply::error(METHOD_NOT_FOUND, format!("Method not found: {other}")),
        }
    }

    /// Cursors are the decimal offset of the next page.
    fn page<T>(&self, items: Vec<T>, cursor: Option<&str>) -> (Vec<T>, Option<Cursor>) {
        let Some(size) = self.page_size else {
            return (items, None);
        };
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let total = items.len();
        let page: Vec<T> = items.into_iter().skip(start).take(size).collect();
        let next = (start + size < total).then(|| Cursor::from((start + size).to_string()));
        (page, next)
    }
}

/// Handle to a running [`StubServer`].
pub struct StubHandle {
    received: Arc<Mutex<Vec<JSONRPCMessage>>>,
    task: JoinHandle<()>,
}

impl StubHandle {
    /// Every message the client has sent so far, in order.
    pub fn received(&self) -> Vec<JSONRPCMessage> {
        self.received
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Requests the client sent with the given method.
    pub fn requests(&self, method: &str) -> Vec<JSONRPCRequest> {
        self.received()
            .into_iter()
            .filter_map(|m| match m {
                JSONRPCMessage::Request(r) if r.method == method => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter_map(|m| match m {
                JSONRPCMessage::Notification(n) => Some(n.method),
                _ => None,
            })
            .collect()
    }

    /// Responses the client sent back for server-initiated requests.
    pub fn responses(&self) -> Vec<JSONRPCResponse> {
        self.received()
            .into_iter()
            .filter_map(|m| match m {
                JSONRPCMessage::Response(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Wait for the stub to see the client hang up. Returns `false` if it is
    /// still running after `limit`. Call at most once per handle.
    pub async fn finished(&mut self, limit: Duration) -> bool {
        tokio::time::timeout(limit, &mut self.task).await.is_ok()
    }
}

/// A stub server and a client already connected to it.
pub async fn connected_stub_client(stub: StubServer) -> Result<(ToolClient, StubHandle)> {
    connected_stub_client_with_config(stub, ClientConfig::default()).await
}

pub async fn connected_stub_client_with_config(
    stub: StubServer,
    config: ClientConfig,
) -> Result<(ToolClient, StubHandle)> {
    let (transport, handle) = stub.spawn();
    let mut client = ToolClient::with_transport(config, Box::new(transport));
    client.connect().await?;
    Ok((client, handle))
}
