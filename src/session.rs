use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use dashmap::DashMap;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    schema::{
        requests::{ClientRequest, INITIALIZED_NOTIFICATION},
        ClientCapabilities, Implementation, InitializeResult, JSONRPCError, JSONRPCMessage,
        JSONRPCNotification, JSONRPCRequest, JSONRPCResponse, RequestId, JSONRPC_VERSION,
        LATEST_PROTOCOL_VERSION, METHOD_NOT_FOUND,
    },
    transport::{Transport, TransportStream},
};

/// Either a response or error from JSON-RPC
#[derive(Debug)]
enum ResponseOrError {
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

type TransportSink = Arc<Mutex<SplitSink<Box<dyn TransportStream>, JSONRPCMessage>>>;
type PendingRequests = Arc<DashMap<RequestId, oneshot::Sender<ResponseOrError>>>;

/// One open JSON-RPC session over a transport.
///
/// A background task reads inbound frames and routes responses to the
/// request that is waiting for them; it also answers server pings and logs
/// server notifications. Everything else happens on the caller's task.
pub(crate) struct Session {
    sink: TransportSink,
    pending: PendingRequests,
    /// Set by the reader task once the inbound stream has ended.
    stream_closed: Arc<AtomicBool>,
    next_request_id: u64,
    reader: JoinHandle<()>,
    transport: Box<dyn Transport>,
}

impl Session {
    /// Connect the transport and start routing its inbound messages. On
    /// failure the transport is closed again before the error is returned.
    pub async fn open(mut transport: Box<dyn Transport>) -> Result<Self> {
        let stream = match transport.connect().await {
            Ok(()) => transport.framed(),
            Err(e) => Err(e),
        };
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    warn!("Failed to close transport after open error: {}", close_err);
                }
                return Err(e);
            }
        };

        let (sink, stream) = stream.split();
        let sink: TransportSink = Arc::new(Mutex::new(sink));
        let pending: PendingRequests = Arc::new(DashMap::new());
        let stream_closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            stream,
            pending.clone(),
            sink.clone(),
            stream_closed.clone(),
        ));

        Ok(Self {
            sink,
            pending,
            stream_closed,
            next_request_id: 1,
            reader,
            transport,
        })
    }

    /// Run the initialize exchange followed by the `initialized` notification.
    pub async fn initialize(
        &mut self,
        client_info: Implementation,
        timeout: Duration,
    ) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request(
                ClientRequest::Initialize {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: ClientCapabilities::default(),
                    client_info,
                },
                timeout,
            )
            .await?;

        if result.protocol_version != LATEST_PROTOCOL_VERSION {
            info!(
                "Server negotiated protocol version {} (requested {})",
                result.protocol_version, LATEST_PROTOCOL_VERSION
            );
        }

        self.notify(INITIALIZED_NOTIFICATION, None).await?;
        Ok(result)
    }

    /// Send a request and wait for its response, decoding the result into `T`.
    pub async fn request<T>(&mut self, request: ClientRequest, timeout: Duration) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let method = request.method();
        let id = self.next_request_id();
        let message = request.into_jsonrpc(id.clone())?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        if self.stream_closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        debug!("Sending request {} method: {}", id, method);
        if let Err(e) = send(&self.sink, JSONRPCMessage::Request(message)).await {
            self.pending.remove(&id);
            return Err(e);
        }

        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                debug!("Response channel for request {} closed", id);
                return Err(Error::ConnectionClosed);
            }
            Err(_) => {
                self.pending.remove(&id);
                warn!("Request {} ({}) timed out after {:?}", id, method, timeout);
                return Err(Error::timeout(timeout, id.to_string()));
            }
        };

        match outcome {
            ResponseOrError::Response(response) => {
                serde_json::from_value(response.result).map_err(|e| {
                    Error::Protocol(format!("Failed to deserialize {method} response: {e}"))
                })
            }
            ResponseOrError::Error(error) => Err(Error::Rpc {
                code: error.error.code,
                message: error.error.message,
            }),
        }
    }

    pub async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JSONRPCNotification::new(method, params);
        send(&self.sink, JSONRPCMessage::Notification(notification)).await
    }

    /// Shut the session down: close the outgoing half so the server sees
    /// EOF, stop the reader, then close the transport. Failures are logged
    /// and do not prevent the later steps from running.
    pub async fn close(self) {
        let Session {
            sink,
            pending,
            reader,
            mut transport,
            ..
        } = self;

        if let Err(e) = sink.lock().await.close().await {
            warn!("Error closing session: {}", e);
        }
        reader.abort();
        let _ = reader.await;
        pending.clear();

        // A child's stdin only reaches EOF once both stream halves are gone.
        drop(sink);

        if let Err(e) = transport.close().await {
            warn!("Error closing transport: {}", e);
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        RequestId::String(format!("req-{id}"))
    }
}

async fn send(sink: &TransportSink, message: JSONRPCMessage) -> Result<()> {
    let mut sink = sink.lock().await;
    sink.send(message).await
}

async fn read_loop(
    mut stream: SplitStream<Box<dyn TransportStream>>,
    pending: PendingRequests,
    sink: TransportSink,
    stream_closed: Arc<AtomicBool>,
) {
    while let Some(item) = stream.next().await {
        match item {
            Ok(JSONRPCMessage::Response(response)) => {
                let id = response.id.clone();
                route(&pending, id, ResponseOrError::Response(response));
            }
            Ok(JSONRPCMessage::Error(error)) => {
                let id = error.id.clone();
                route(&pending, id, ResponseOrError::Error(error));
            }
            Ok(JSONRPCMessage::Request(request)) => {
                let reply = answer_server_request(request);
                if let Err(e) = send(&sink, reply).await {
                    warn!("Failed to answer server request: {}", e);
                }
            }
            Ok(JSONRPCMessage::Notification(notification)) => log_notification(notification),
            Err(e) => {
                error!("Error reading from server: {}", e);
                break;
            }
        }
    }

    debug!("Server stream ended, failing {} pending request(s)", pending.len());
    stream_closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed channel.
    pending.clear();
}

fn route(pending: &PendingRequests, id: RequestId, outcome: ResponseOrError) {
    match pending.remove(&id) {
        Some((_, tx)) => {
            let _ = tx.send(outcome);
        }
        None => warn!("Received response for unknown request ID: {}", id),
    }
}

/// This client exposes no capabilities of its own, so the only server
/// request it honours is `ping`.
fn answer_server_request(request: JSONRPCRequest) -> JSONRPCMessage {
    if request.method == "ping" {
        debug!("Answering server ping {}", request.id);
        JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: request.id,
            result: Value::Object(Default::default()),
        })
    } else {
        warn!("Server sent unsupported request: {}", request.method);
        JSONRPCMessage::Error(JSONRPCError::new(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", request.method),
        ))
    }
}

fn log_notification(notification: JSONRPCNotification) {
    if notification.method != "notifications/message" {
        debug!("Server notification: {}", notification.method);
        return;
    }

    let params = notification.params.unwrap_or_default();
    let level = params.get("level").and_then(Value::as_str).unwrap_or("info");
    let logger = params.get("logger").and_then(Value::as_str).unwrap_or("server");
    let data = params.get("data").cloned().unwrap_or(Value::Null);
    match level {
        "debug" => debug!(logger, "{}", data),
        "info" | "notice" => info!(logger, "{}", data),
        "warning" => warn!(logger, "{}", data),
        _ => error!(logger, "{}", data),
    }
}
