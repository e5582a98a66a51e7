// Host bridge backend: the editor's automation surface exposed as
// newline-delimited JSON-RPC over a Unix socket.
//
// Request/response traffic uses one persistent connection per session.
// `events.subscribe` opens a second connection on which the bridge streams
// notifications; a spawned reader task hands them to the sink.
//
// The session trait is synchronous. Every call drives tokio socket I/O
// through `Handle::block_on`, so callers must be on a blocking thread
// (the supervisor runs calls under `spawn_blocking`) or outside any runtime,
// in which case the session brings its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use autosave_common::error::HostError;

use super::{HostConnector, HostSession};

#[cfg(unix)]
use std::future::Future;
#[cfg(unix)]
use std::io::ErrorKind;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
#[cfg(unix)]
use std::sync::{Mutex, PoisonError};

#[cfg(unix)]
use autosave_common::error::ConnectionError;
#[cfg(unix)]
use autosave_common::protocol::bridge::{
    DirtyResult, DocumentParams, DocumentsListResult, EventParams, PingResult, SubscribeResult,
    DOCUMENTS_LIST, DOCUMENT_IS_DIRTY, DOCUMENT_SAVE, ERROR_NO_PATH, EVENTS_SUBSCRIBE,
    EVENT_DOCUMENT_BEFORE_CLOSE, EVENT_DOCUMENT_CHANGED, EVENT_DOCUMENT_OPENED,
    EVENT_DOCUMENT_SAVED, EVENT_SELECTION_CHANGED, HOST_PING,
};
#[cfg(unix)]
use autosave_common::protocol::jsonrpc::{Notification, Request, RequestId, Response};
#[cfg(unix)]
use autosave_common::types::HostDocument;
#[cfg(unix)]
use serde::de::DeserializeOwned;
#[cfg(unix)]
use serde_json::Value;
#[cfg(unix)]
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::UnixStream;
#[cfg(unix)]
use tokio::runtime::{Builder, Handle, Runtime};
#[cfg(unix)]
use tokio::task::JoinHandle;
#[cfg(unix)]
use tokio::time::timeout;
#[cfg(unix)]
use tracing::{debug, trace, warn};

#[cfg(unix)]
use super::{EventSink, EventSubscription, HostEvent};

/// Connects to the bridge socket.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    socket_path: PathBuf,
    timeout: Duration,
}

impl BridgeConnector {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { socket_path: socket_path.into(), timeout }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Open a session without the trait object wrapping (diagnostics).
    #[cfg(unix)]
    pub fn open(&self) -> Result<BridgeSession, HostError> {
        BridgeSession::open(&self.socket_path, self.timeout)
    }
}

impl HostConnector for BridgeConnector {
    fn connect(&self) -> Result<Arc<dyn HostSession>, HostError> {
        #[cfg(unix)]
        {
            let session = self.open()?;
            session.ping()?;
            Ok(Arc::new(session))
        }

        #[cfg(not(unix))]
        {
            Err(HostError::unavailable("named pipe bridge transport is not implemented yet"))
        }
    }
}

// ── Runtime ────────────────────────────────────────────────────────

/// The runtime that owns the bridge sockets: the caller's when there is one,
/// otherwise a single-worker runtime private to the session.
#[cfg(unix)]
struct BridgeRuntime {
    handle: Handle,
    owned: Option<Runtime>,
}

#[cfg(unix)]
impl BridgeRuntime {
    fn acquire() -> Result<Arc<Self>, HostError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Arc::new(Self { handle, owned: None }));
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("autosave-bridge")
            .enable_all()
            .build()
            .map_err(|error| {
                HostError::unavailable(format!("failed to start bridge runtime: {error}"))
            })?;
        Ok(Arc::new(Self { handle: runtime.handle().clone(), owned: Some(runtime) }))
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

#[cfg(unix)]
impl Drop for BridgeRuntime {
    fn drop(&mut self) {
        // The last reference may go away on an async thread.
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

// ── Session ────────────────────────────────────────────────────────

#[cfg(unix)]
type Connection = BufReader<UnixStream>;

#[cfg(unix)]
pub struct BridgeSession {
    socket_path: PathBuf,
    timeout: Duration,
    runtime: Arc<BridgeRuntime>,
    connection: Mutex<Connection>,
    next_request_id: AtomicI64,
    broken: AtomicBool,
}

#[cfg(unix)]
impl BridgeSession {
    fn open(socket_path: &Path, timeout: Duration) -> Result<Self, HostError> {
        let runtime = BridgeRuntime::acquire()?;
        let connection = runtime.block_on(connect_stream(socket_path, timeout))?;
        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            timeout,
            runtime,
            connection: Mutex::new(connection),
            next_request_id: AtomicI64::new(1),
            broken: AtomicBool::new(false),
        })
    }

    /// Host application name and version as reported by `host.ping`.
    pub fn identify(&self) -> Result<PingResult, HostError> {
        self.call(HOST_PING, None)
    }

    fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<R, HostError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(ConnectionError::HandleInvalidated.into());
        }

        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let result =
            self.runtime.block_on(exchange(&mut connection, method, params, id, self.timeout));
        if let Err(error) = &result {
            // A timed-out exchange may leave a late response in the buffer.
            if error.is_connection_fault() {
                self.broken.store(true, Ordering::SeqCst);
            }
        }
        result
    }
}

#[cfg(unix)]
impl HostSession for BridgeSession {
    fn ping(&self) -> Result<(), HostError> {
        self.identify().map(|_| ())
    }

    fn documents(&self) -> Result<Vec<HostDocument>, HostError> {
        let result: DocumentsListResult = self.call(DOCUMENTS_LIST, None)?;
        Ok(result.documents)
    }

    fn is_dirty(&self, host_id: &str) -> Result<bool, HostError> {
        let result: DirtyResult = self.call(DOCUMENT_IS_DIRTY, Some(document_params(host_id)?))?;
        Ok(result.dirty)
    }

    fn save(&self, host_id: &str) -> Result<(), HostError> {
        let _: Value = self.call(DOCUMENT_SAVE, Some(document_params(host_id)?))?;
        Ok(())
    }

    fn subscribe(&self, sink: EventSink) -> Result<Box<dyn EventSubscription>, HostError> {
        let socket_path = self.socket_path.clone();
        let call_timeout = self.timeout;
        let stream = self.runtime.block_on(async move {
            let mut stream = connect_stream(&socket_path, call_timeout).await?;
            let subscribed: SubscribeResult =
                exchange(&mut stream, EVENTS_SUBSCRIBE, None, 0, call_timeout).await?;
            debug!(events = ?subscribed.events, "bridge event stream attached");
            Ok::<_, HostError>(stream)
        })?;

        let task = self.runtime.handle.spawn(read_events(stream, sink));
        Ok(Box::new(BridgeSubscription { task: Some(task), _runtime: self.runtime.clone() }))
    }
}

#[cfg(unix)]
struct BridgeSubscription {
    task: Option<JoinHandle<()>>,
    _runtime: Arc<BridgeRuntime>,
}

#[cfg(unix)]
impl EventSubscription for BridgeSubscription {
    fn unsubscribe(&mut self) {
        // Aborting drops the reader and closes the stream; nothing to wait for.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(unix)]
impl Drop for BridgeSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ── Wire helpers ───────────────────────────────────────────────────

#[cfg(unix)]
async fn connect_stream(socket_path: &Path, after: Duration) -> Result<Connection, HostError> {
    let stream = timeout(after, UnixStream::connect(socket_path))
        .await
        .map_err(|_| HostError::Timeout { op: "connect", after })?
        .map_err(|error| {
            HostError::unavailable(format!(
                "failed to connect to bridge socket `{}`: {error}",
                socket_path.display()
            ))
        })?;
    Ok(BufReader::new(stream))
}

#[cfg(unix)]
fn document_params(host_id: &str) -> Result<Value, HostError> {
    serde_json::to_value(DocumentParams { host_id: host_id.to_string() })
        .map_err(|error| HostError::Protocol(error.to_string()))
}

/// Write one request and read lines until the matching response arrives.
#[cfg(unix)]
async fn exchange<R: DeserializeOwned>(
    connection: &mut Connection,
    method: &'static str,
    params: Option<Value>,
    id: i64,
    after: Duration,
) -> Result<R, HostError> {
    timeout(after, exchange_unbounded(connection, method, params, id))
        .await
        .map_err(|_| HostError::Timeout { op: method, after })?
}

#[cfg(unix)]
async fn exchange_unbounded<R: DeserializeOwned>(
    connection: &mut Connection,
    method: &'static str,
    params: Option<Value>,
    id: i64,
) -> Result<R, HostError> {
    let request = Request::new(method, params, RequestId::Number(id));
    let mut payload =
        serde_json::to_vec(&request).map_err(|error| HostError::Protocol(error.to_string()))?;
    payload.push(b'\n');

    connection.write_all(&payload).await.map_err(io_to_host_error)?;
    connection.flush().await.map_err(io_to_host_error)?;

    loop {
        let mut line = String::new();
        let read = connection.read_line(&mut line).await.map_err(io_to_host_error)?;
        if read == 0 {
            return Err(ConnectionError::HandleInvalidated.into());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response: Response = serde_json::from_str(line).map_err(|error| {
            HostError::Protocol(format!("invalid response to `{method}`: {error}"))
        })?;
        if response.id != RequestId::Number(id) {
            trace!(method, "skipping response for another request");
            continue;
        }

        if let Some(error) = response.error {
            if error.code == ERROR_NO_PATH {
                return Err(HostError::NoPath);
            }
            return Err(HostError::rejected(method, error.message));
        }

        let result = response.result.unwrap_or(Value::Null);
        return serde_json::from_value(result).map_err(|error| {
            HostError::Protocol(format!("unexpected result for `{method}`: {error}"))
        });
    }
}

#[cfg(unix)]
fn io_to_host_error(error: std::io::Error) -> HostError {
    match error.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            ConnectionError::HandleInvalidated.into()
        }
        _ => HostError::unavailable(error.to_string()),
    }
}

#[cfg(unix)]
async fn read_events(mut stream: Connection, sink: EventSink) {
    let mut line = String::new();
    loop {
        line.clear();
        match stream.read_line(&mut line).await {
            Ok(0) => {
                debug!("bridge event stream closed");
                return;
            }
            Ok(_) => {}
            Err(error) => {
                debug!(error = %error, "bridge event stream ended");
                return;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event(trimmed) {
            Some(event) => sink(event),
            None => warn!(line = trimmed, "ignoring unrecognized bridge notification"),
        }
    }
}

#[cfg(unix)]
fn parse_event(line: &str) -> Option<HostEvent> {
    let notification: Notification = serde_json::from_str(line).ok()?;
    let params: EventParams = serde_json::from_value(notification.params?).ok()?;
    let doc = params.document;
    match notification.method.as_str() {
        EVENT_DOCUMENT_CHANGED => Some(HostEvent::DocumentChanged(doc)),
        EVENT_SELECTION_CHANGED => Some(HostEvent::SelectionChanged(doc)),
        EVENT_DOCUMENT_OPENED => Some(HostEvent::DocumentOpened(doc)),
        EVENT_DOCUMENT_BEFORE_CLOSE => Some(HostEvent::DocumentBeforeClose(doc)),
        EVENT_DOCUMENT_SAVED => Some(HostEvent::DocumentSaved(doc)),
        _ => None,
    }
}
