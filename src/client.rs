use std::{collections::HashSet, fmt, panic::AssertUnwindSafe};

use futures::{future::BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    call::{ToolCallRequest, ToolCallResult},
    capabilities::{Capabilities, Listing},
    config::ClientConfig,
    error::{Error, Result},
    resource::ResourceContent,
    schema::{
        requests::ClientRequest, CallToolResult, Cursor, InitializeResult, ListPromptsResult,
        ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, Prompt,
        ReadResourceResult, Resource, ResourceTemplate, Tool,
    },
    session::Session,
    transport::{ProcessTransport, Transport},
};

enum SessionState {
    Disconnected,
    Connected(Session),
    Closed,
}

/// Where a [`ToolClient`] is in its lifecycle. A client only ever moves
/// forward: `Disconnected`, then `Connected`, then `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connected,
    Closed,
}

impl SessionStatus {
    fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connected => "connected",
            SessionStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client for a tool-invocation server reached over stdio.
///
/// A client owns at most one session. Every operation takes `&mut self`, so
/// calls on a session are strictly sequential.
///
/// ```no_run
/// use freelance_mcp_client::{ClientConfig, ToolCallRequest, ToolCallResult, ToolClient};
///
/// # async fn demo() -> freelance_mcp_client::Result<()> {
/// let client = ToolClient::new(ClientConfig::from_env());
/// let result = client
///     .run(|client| {
///         Box::pin(async move {
///             let request = ToolCallRequest::new("search_gigs").arg("skills", vec!["Rust"]);
///             client.call_tool(request).await
///         })
///     })
///     .await??;
///
/// match result {
///     ToolCallResult::Structured(payload) => println!("{payload:?}"),
///     ToolCallResult::Text(text) => println!("{text}"),
///     ToolCallResult::Error(message) => eprintln!("{message}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct ToolClient {
    config: ClientConfig,
    transport: Option<Box<dyn Transport>>,
    state: SessionState,
    server_info: Option<InitializeResult>,
}

impl ToolClient {
    /// A client that launches the server described by `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            transport: None,
            state: SessionState::Disconnected,
            server_info: None,
        }
    }

    /// A client that talks over the given transport instead of spawning a
    /// process. Timeouts and client info still come from `config`.
    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new(config)
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Disconnected => SessionStatus::Disconnected,
            SessionState::Connected(_) => SessionStatus::Connected,
            SessionState::Closed => SessionStatus::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// What the server reported during the handshake.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Start the server and perform the handshake.
    ///
    /// Only valid on a fresh client. On failure the transport is torn down
    /// and the client is left `Closed`; build a new one to try again.
    pub async fn connect(&mut self) -> Result<()> {
        let status = self.status();
        if status != SessionStatus::Disconnected {
            return Err(Error::InvalidState(format!(
                "cannot connect a client that is {status}"
            )));
        }
        self.state = SessionState::Closed;

        let target = match self.transport {
            Some(_) => "injected transport".to_string(),
            None => self.config.launch_description(),
        };
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => Box::new(ProcessTransport::from_config(&self.config)),
        };

        let mut session = Session::open(transport)
            .await
            .map_err(|e| Error::connection(format!("failed to start {target}: {e}")))?;

        let handshake = session
            .initialize(
                self.config.client_info.clone(),
                self.config.handshake_timeout,
            )
            .await;

        match handshake {
            Ok(result) => {
                info!(
                    "Connected to {} {} (protocol {})",
                    result.server_info.name, result.server_info.version, result.protocol_version
                );
                self.server_info = Some(result);
                self.state = SessionState::Connected(session);
                Ok(())
            }
            Err(e) => {
                session.close().await;
                Err(Error::connection(format!("handshake with {target} failed: {e}")))
            }
        }
    }

    /// Close the session and stop the server. Safe to call at any time and
    /// any number of times; teardown problems are logged, not returned. The
    /// client is `Closed` afterwards.
    pub async fn disconnect(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Connected(session) => {
                info!("Disconnecting from server");
                session.close().await;
            }
            SessionState::Disconnected | SessionState::Closed => {
                debug!("Disconnect on a client with no open session");
            }
        }
        self.transport = None;
    }

    /// Connect, run `f`, then disconnect whatever `f` did, including
    /// panicking. A panic inside `f` is resumed once the server is stopped.
    ///
    /// Returns the connection error if the handshake fails, otherwise the
    /// value produced by `f`.
    pub async fn run<T, F>(mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut ToolClient) -> BoxFuture<'a, T>,
    {
        if let Err(e) = self.connect().await {
            self.disconnect().await;
            return Err(e);
        }

        let outcome = AssertUnwindSafe(f(&mut self)).catch_unwind().await;
        self.disconnect().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Invoke a tool. Failures of the call itself come back as
    /// [`ToolCallResult::Error`]; `Err` is reserved for calling on a client
    /// that is not connected.
    pub async fn call_tool(&mut self, request: ToolCallRequest) -> Result<ToolCallResult> {
        let timeout = request.timeout().unwrap_or(self.config.request_timeout);
        let operation = request.operation();
        let session = self.session_mut()?;

        let (name, arguments) = request.into_parts();
        debug!("Calling tool {} with {} argument(s)", name, arguments.len());
        let outcome = session
            .request::<CallToolResult>(ClientRequest::CallTool { name, arguments }, timeout)
            .await;

        Ok(match outcome {
            Ok(raw) => ToolCallResult::decode(raw, &operation),
            Err(e) => {
                warn!("Failed to {}: {}", operation, e);
                ToolCallResult::failure(&operation, e)
            }
        })
    }

    /// Full tool descriptors, across all pages.
    pub async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        self.list_all::<ListToolsResult>("list tools").await
    }

    pub async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        self.list_all::<ListResourcesResult>("list resources").await
    }

    pub async fn list_prompts(&mut self) -> Result<Vec<Prompt>> {
        self.list_all::<ListPromptsResult>("list prompts").await
    }

    /// Resource templates, or `Unavailable` if the server cannot list them.
    pub async fn list_resource_templates(&mut self) -> Result<Listing<Vec<ResourceTemplate>>> {
        match self
            .list_all::<ListResourceTemplatesResult>("list resource templates")
            .await
        {
            Ok(templates) => Ok(Listing::Available(templates)),
            Err(e @ Error::NotConnected { .. }) => Err(e),
            Err(e) => {
                warn!("{}", e);
                Ok(Listing::unavailable(e))
            }
        }
    }

    /// Names of everything the server offers. Tools and resources must list
    /// successfully; prompts are optional and a failure there is reported
    /// as [`Listing::Unavailable`].
    pub async fn list_capabilities(&mut self) -> Result<Capabilities> {
        let tools = self.list_tools().await?;
        let resources = self.list_resources().await?;
        let prompts = match self.list_prompts().await {
            Ok(prompts) => Listing::Available(prompts.into_iter().map(|p| p.name).collect()),
            Err(e @ Error::NotConnected { .. }) => return Err(e),
            Err(e) => {
                warn!("Prompt listing unavailable: {}", e);
                Listing::unavailable(e)
            }
        };

        Ok(Capabilities {
            tools: tools.into_iter().map(|t| t.name).collect(),
            resources: resources.into_iter().map(|r| r.uri).collect(),
            prompts,
        })
    }

    /// Read a resource and return its first content part.
    pub async fn read_resource(&mut self, uri: &str) -> Result<ResourceContent> {
        let timeout = self.config.request_timeout;
        let operation = format!("read resource {uri}");
        let session = self.session_mut()?;

        let result: ReadResourceResult = session
            .request(
                ClientRequest::ReadResource {
                    uri: uri.to_string(),
                },
                timeout,
            )
            .await
            .map_err(|e| Error::call(&operation, e))?;

        result
            .contents
            .into_iter()
            .next()
            .map(ResourceContent::from)
            .ok_or_else(|| Error::call(&operation, "server returned no content"))
    }

    pub async fn ping(&mut self) -> Result<()> {
        let timeout = self.config.request_timeout;
        let session = self.session_mut()?;
        session
            .request::<Value>(ClientRequest::Ping, timeout)
            .await
            .map(|_| ())
            .map_err(|e| Error::call("ping server", e))
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        match &mut self.state {
            SessionState::Connected(session) => Ok(session),
            SessionState::Disconnected => Err(Error::NotConnected {
                state: SessionStatus::Disconnected.as_str(),
            }),
            SessionState::Closed => Err(Error::NotConnected {
                state: SessionStatus::Closed.as_str(),
            }),
        }
    }

    /// Fetch every page of a listing, following `nextCursor` until the
    /// server stops returning one or repeats itself.
    async fn list_all<P: Page>(&mut self, operation: &str) -> Result<Vec<P::Item>> {
        let timeout = self.config.request_timeout;
        let session = self.session_mut()?;

        let mut items = Vec::new();
        let mut cursor = None;
        let mut seen = HashSet::new();
        loop {
            let page: P = session
                .request(P::request(cursor.take()), timeout)
                .await
                .map_err(|e| Error::call(operation, e))?;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!("Server repeated cursor {} while trying to {}", next.0, operation);
                    break;
                }
                None => break,
            }
        }
        Ok(items)
    }
}

/// One page of a paginated listing.
trait Page: DeserializeOwned {
    type Item;

    fn request(cursor: Option<Cursor>) -> ClientRequest;

    fn into_parts(self) -> (Vec<Self::Item>, Option<Cursor>);
}

impl Page for ListToolsResult {
    type Item = Tool;

    fn request(cursor: Option<Cursor>) -> ClientRequest {
        ClientRequest::ListTools { cursor }
    }

    fn into_parts(self) -> (Vec<Tool>, Option<Cursor>) {
        (self.tools, self.next_cursor)
    }
}

impl Page for ListResourcesResult {
    type Item = Resource;

    fn request(cursor: Option<Cursor>) -> ClientRequest {
        ClientRequest::ListResources { cursor }
    }

    fn into_parts(self) -> (Vec<Resource>, Option<Cursor>) {
        (self.resources, self.next_cursor)
    }
}

impl Page for ListResourceTemplatesResult {
    type Item = ResourceTemplate;

    fn request(cursor: Option<Cursor>) -> ClientRequest {
        ClientRequest::ListResourceTemplates { cursor }
    }

    fn into_parts(self) -> (Vec<ResourceTemplate>, Option<Cursor>) {
        (self.resource_templates, self.next_cursor)
    }
}

impl Page for ListPromptsResult {
    type Item = Prompt;

    fn request(cursor: Option<Cursor>) -> ClientRequest {
        ClientRequest::ListPrompts { cursor }
    }

    fn into_parts(self) -> (Vec<Prompt>, Option<Cursor>) {
        (self.prompts, self.next_cursor)
    }
}

impl fmt::Debug for ToolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolClient")
            .field("status", &self.status())
            .field("server", &self.config.launch_description())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_calls_fail_fast_before_connect() {
        let mut client = ToolClient::new(ClientConfig::default());
        assert_eq!(client.status(), SessionStatus::Disconnected);

        let err = client
            .call_tool(ToolCallRequest::new("validate"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected { state: "disconnected" }));
        assert!(matches!(
            client.read_resource("freelance://market-trends").await,
            Err(Error::NotConnected { .. })
        ));
        assert!(matches!(
            client.list_resource_templates().await,
            Err(Error::NotConnected { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_spawn_closes_client() {
        let config = ClientConfig::default()
            .with_program("/nonexistent/python")
            .with_handshake_timeout(Duration::from_secs(1));
        let mut client = ToolClient::new(config);

        match client.connect().await {
            Err(Error::Connection(msg)) => assert!(msg.contains("/nonexistent/python")),
            other => panic!("Expected connection error, got {other:?}"),
        }
        assert_eq!(client.status(), SessionStatus::Closed);
        assert!(matches!(
            client.connect().await,
            Err(Error::InvalidState(_))
        ));

        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.status(), SessionStatus::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_before_connect() {
        let mut client = ToolClient::new(ClientConfig::default());
        client.disconnect().await;
        assert_eq!(client.status(), SessionStatus::Closed);
        assert!(matches!(
            client.list_capabilities().await,
            Err(Error::NotConnected { state: "closed" })
        ));
    }
}
