use std::{
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use futures::{Sink, Stream};
use tokio::{
    io::{AsyncRead, AsyncWrite, BufReader, ReadBuf},
    process::{Child, Command},
};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::{
    codec::JsonRpcCodec,
    config::ClientConfig,
    error::{Error, Result},
    schema::JSONRPCMessage,
};

/// Transport trait for the ways a client can reach a server.
///
/// A transport is used exactly once: `connect`, then `framed` to obtain the
/// message stream, and finally `close` after the session on top of it has
/// been shut down.
#[async_trait]
pub trait Transport: Send {
    /// Establish the underlying connection (e.g. spawn the server process).
    async fn connect(&mut self) -> Result<()>;

    /// Hand out the framed message stream. Fails if called twice or before
    /// `connect`.
    fn framed(&mut self) -> Result<Box<dyn TransportStream>>;

    /// Release whatever `connect` acquired.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Trait for a bidirectional stream of JSON-RPC messages
pub trait TransportStream:
    Stream<Item = Result<JSONRPCMessage>> + Sink<JSONRPCMessage, Error = Error> + Send + Unpin
{
}

impl<T> TransportStream for Framed<T, JsonRpcCodec> where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Joins a separate reader and writer (child stdout/stdin, or the two halves
/// of an in-memory pipe) into one duplex stream for codec framing.
pub struct Duplex<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: AsyncRead, W> Duplex<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

impl<R, W> AsyncRead for Duplex<R, W>
where
    R: AsyncRead + Unpin,
    W: Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl<R, W> AsyncWrite for Duplex<R, W>
where
    R: Unpin,
    W: AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

/// Spawns the server as a child process and talks to it over its
/// stdin/stdout. The child's stderr is inherited so server logs stay visible.
pub struct ProcessTransport {
    command: Command,
    description: String,
    child: Option<Child>,
    shutdown_grace: Duration,
    max_frame_bytes: usize,
}

impl ProcessTransport {
    /// Build the launch command from the configuration: program, arguments,
    /// inherited environment plus configured overrides and the API key.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if !config.inherit_env {
            command.env_clear();
        }
        command.envs(&config.env);
        if let Some(key) = &config.api_key {
            command.env(&config.api_key_var, key);
        }
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        Self {
            command,
            description: config.launch_description(),
            child: None,
            shutdown_grace: config.shutdown_grace,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// OS process id of the running server, if it has been spawned.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn connect(&mut self) -> Result<()> {
        info!("Spawning server process: {}", self.description);
        let child = self.command.spawn().map_err(|e| {
            Error::Transport(format!("failed to spawn '{}': {e}", self.description))
        })?;
        debug!("Server process started with pid {:?}", child.id());
        self.child = Some(child);
        Ok(())
    }

    fn framed(&mut self) -> Result<Box<dyn TransportStream>> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| Error::Transport("process not spawned".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("failed to capture server stdout".to_string()))?;

        let duplex = Duplex::new(stdout, stdin);
        let codec = JsonRpcCodec::with_max_frame_bytes(self.max_frame_bytes);
        Ok(Box::new(Framed::new(duplex, codec)))
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // The server exits on its own once it sees EOF on stdin; give it a
        // moment before resorting to a kill.
        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Server process exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for server process: {}", e);
                child.kill().await?;
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Server process still running after {:?}, killing it",
                    self.shutdown_grace
                );
                child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Wraps an already-connected reader/writer pair, such as an in-memory pipe
/// to an in-process server.
pub struct StreamTransport<R, W> {
    halves: Option<(R, W)>,
    max_frame_bytes: usize,
}

impl<R, W> StreamTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            halves: Some((reader, writer)),
            max_frame_bytes: crate::codec::DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn connect(&mut self) -> Result<()> {
        // Stream transports are already connected
        Ok(())
    }

    fn framed(&mut self) -> Result<Box<dyn TransportStream>> {
        let (reader, writer) = self.halves.take().ok_or(Error::ConnectionClosed)?;
        let codec = JsonRpcCodec::with_max_frame_bytes(self.max_frame_bytes);
        Ok(Box::new(Framed::new(Duplex::new(reader, writer), codec)))
    }
}
