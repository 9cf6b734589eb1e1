use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::sync::Arc;

use bytes::Bytes;
use scopewire_frame::{
    Envelope, FrameConfig, FrameError, FrameReader, FrameWriter, RequestEnvelope, ResponseEnvelope,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};
use crate::handler::{HandlerRegistry, HandlerResult, MessageHandler, NullPayload};
use crate::request::ServiceRequest;
use crate::state::ConnectionState;

type BoxedReader = FrameReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = FrameWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// A waiter for the next reply frame, fulfilled by the receive loop in
/// request-send order.
type PendingReply = oneshot::Sender<Result<Bytes>>;

type Cleanup = Box<dyn FnOnce() + Send>;

/// The FIFO of reply waiters, plus a closed flag set by teardown.
///
/// The flag lives under the same lock as the queue so a waiter can never
/// be registered after teardown has drained it — a push either lands
/// before the drain (and is failed by it) or observes `closed` and fails
/// immediately.
#[derive(Default)]
struct PendingQueue {
    closed: bool,
    waiters: VecDeque<PendingReply>,
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    handlers: Mutex<HandlerRegistry>,
    pending: Mutex<PendingQueue>,
    reader: Mutex<Option<BoxedReader>>,
    writer: AsyncMutex<BoxedWriter>,
    /// One outstanding request per connection — the protocol has no
    /// correlation IDs, so replies are only sound when FIFO-matched.
    request_gate: Semaphore,
    shutdown: CancellationToken,
    cleanup: Mutex<Option<Cleanup>>,
}

/// A duplex session over one transport.
///
/// Sends outbound requests and awaits matching replies; concurrently
/// receives inbound requests and dispatches them to registered handlers.
/// Clones share the same underlying session.
///
/// A connection starts in [`ConnectionState::Connecting`]; transports call
/// [`open`](Connection::open) once the underlying channel is established,
/// which starts the receive loop. Call [`close`](Connection::close) when
/// done — dropping without closing leaves teardown to the peer's EOF.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &*self.state_rx.borrow())
            .finish_non_exhaustive()
    }
}

/// Configures and assembles a [`Connection`].
pub struct ConnectionBuilder {
    frame_config: FrameConfig,
    cleanup: Option<Cleanup>,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            frame_config: FrameConfig::default(),
            cleanup: None,
        }
    }
}

impl ConnectionBuilder {
    /// Override the frame codec configuration.
    pub fn frame_config(mut self, config: FrameConfig) -> Self {
        self.frame_config = config;
        self
    }

    /// Register a cleanup to run exactly once when the connection reaches
    /// a terminal state (e.g. removing a port-discovery file).
    pub fn on_close(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Assemble a connection over an inbound and an outbound byte stream.
    ///
    /// The connection starts in `Connecting` and must be
    /// [`open`](Connection::open)ed before use.
    pub fn build(
        self,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Connection {
        let boxed_reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let boxed_writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let shared = Arc::new(Shared {
            state: state_tx,
            handlers: Mutex::new(HandlerRegistry::new()),
            pending: Mutex::new(PendingQueue::default()),
            reader: Mutex::new(Some(FrameReader::with_config(
                boxed_reader,
                self.frame_config.clone(),
            ))),
            writer: AsyncMutex::new(FrameWriter::with_config(boxed_writer, self.frame_config)),
            request_gate: Semaphore::new(1),
            shutdown: CancellationToken::new(),
            cleanup: Mutex::new(self.cleanup),
        });

        Connection { shared, state_rx }
    }
}

impl Connection {
    /// Start building a connection with explicit configuration.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::default()
    }

    /// Create a connection with default configuration over an inbound and
    /// an outbound byte stream. Starts in `Connecting`.
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::builder().build(reader, writer)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A channel observing every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Transition to `Open` and start the receive loop.
    ///
    /// Must be called from within a tokio runtime. A second call, or a
    /// call on a terminal connection, is a no-op.
    pub fn open(&self) {
        let mut opened = false;
        self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                opened = true;
                true
            } else {
                false
            }
        });
        if !opened {
            warn!(state = ?self.state(), "open() ignored");
            return;
        }

        let reader = lock(&self.shared.reader).take();
        let Some(reader) = reader else {
            warn!("receive loop already started");
            return;
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(receive_loop(shared, reader));
        debug!("connection opened");
    }

    // ---- Handler registration ----

    /// Register a handler taking a typed request and returning a typed
    /// response. Replaces any previous handler for the same name.
    pub fn set_handler<Req, Resp, F, Fut>(&self, name: impl Into<String>, f: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        lock(&self.shared.handlers).insert(name, MessageHandler::new(f));
    }

    /// Register a handler taking a typed request and returning nothing.
    pub fn set_sink_handler<Req, F, Fut>(&self, name: impl Into<String>, f: F)
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        lock(&self.shared.handlers).insert(name, MessageHandler::from_sink(f));
    }

    /// Register a handler taking no request body and returning a typed
    /// response.
    pub fn set_source_handler<Resp, F, Fut>(&self, name: impl Into<String>, f: F)
    where
        Resp: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Resp>> + Send + 'static,
    {
        lock(&self.shared.handlers).insert(name, MessageHandler::from_source(f));
    }

    /// Register a handler taking no request body and returning nothing.
    pub fn set_signal_handler<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        lock(&self.shared.handlers).insert(name, MessageHandler::from_signal(f));
    }

    /// Register a handler for a typed [`ServiceRequest`].
    pub fn handle<R, F, Fut>(&self, f: F)
    where
        R: ServiceRequest,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<R::Response>> + Send + 'static,
    {
        self.set_handler(R::IDENTIFIER, f);
    }

    // ---- Sending ----

    /// Send a typed request and await its reply.
    ///
    /// Suspends until the receive loop fulfils the pending reply, or fails
    /// with [`PeerError::ConnectionClosed`]/[`PeerError::Cancelled`] if the
    /// connection is torn down first. There is no built-in timeout; wrap
    /// the call in `tokio::time::timeout` if one is needed.
    pub async fn send_request<Req, Resp>(&self, name: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(PeerError::EncodingFailed)?;
        let reply = self.round_trip(name, payload).await?;
        serde_json::from_slice(&reply).map_err(PeerError::DecodingFailed)
    }

    /// Send a request with no body and await its reply.
    pub async fn send_request_empty<Resp>(&self, name: &str) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        self.send_request(name, &NullPayload::NULL).await
    }

    /// Send a typed [`ServiceRequest`] and await its typed response.
    pub async fn send<R: ServiceRequest>(&self, request: &R) -> Result<R::Response> {
        self.send_request(R::IDENTIFIER, request).await
    }

    /// Send a notification with no body. No reply is awaited; whatever the
    /// peer's handler returns is discarded on the wire.
    pub async fn send_notification(&self, name: &str) -> Result<()> {
        self.send_notification_with(name, &NullPayload::NULL).await
    }

    /// Send a notification with a typed body. No reply is awaited.
    pub async fn send_notification_with<Req>(&self, name: &str, body: &Req) -> Result<()>
    where
        Req: Serialize + ?Sized,
    {
        self.ensure_open()?;
        let payload = serde_json::to_vec(body).map_err(PeerError::EncodingFailed)?;
        let envelope = RequestEnvelope::new(name, payload);
        let wire = serde_json::to_vec(&envelope).map_err(PeerError::EncodingFailed)?;
        self.write_frame(&wire).await
    }

    async fn round_trip(&self, name: &str, payload: Vec<u8>) -> Result<Bytes> {
        self.ensure_open()?;

        let permit = match self.shared.request_gate.acquire().await {
            Ok(permit) => permit,
            // The gate is closed during teardown; callers still queued
            // never had their request on the wire.
            Err(_) => return Err(PeerError::Cancelled),
        };
        self.ensure_open()?;

        let envelope = RequestEnvelope::new(name, payload);
        let wire = serde_json::to_vec(&envelope).map_err(PeerError::EncodingFailed)?;

        // Register the waiter before writing, so a fast peer cannot reply
        // into an empty queue. The closed check shares the queue's lock:
        // a teardown that already drained the queue must not gain a
        // waiter nobody will ever fulfil.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.shared.pending);
            if pending.closed {
                return Err(PeerError::ConnectionClosed);
            }
            pending.waiters.push_back(tx);
        }

        debug!(identifier = %name, bytes = wire.len(), "sending request");
        if let Err(err) = self.write_frame(&wire).await {
            let _ = lock(&self.shared.pending).waiters.pop_back();
            return Err(err);
        }

        let result = match rx.await {
            Ok(result) => result,
            Err(_) => Err(PeerError::ConnectionClosed),
        };
        drop(permit);
        result
    }

    async fn write_frame(&self, wire: &[u8]) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        match writer.send(wire).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%err, "write failed, tearing connection down");
                drop(writer);
                self.shared.teardown(ConnectionState::Failed);
                Err(PeerError::Frame(err))
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state().is_open() {
            Ok(())
        } else {
            Err(PeerError::NotConnected)
        }
    }

    /// Close the connection.
    ///
    /// Fails all outstanding pending replies with `ConnectionClosed`, runs
    /// the registered cleanup exactly once, and shuts the write half down
    /// so the peer observes EOF. Idempotent.
    pub async fn close(&self) {
        let mut closing = false;
        self.shared.state.send_if_modified(|state| {
            if state.is_terminal() || *state == ConnectionState::Closing {
                false
            } else {
                *state = ConnectionState::Closing;
                closing = true;
                true
            }
        });
        if !closing {
            return;
        }

        self.shared.teardown(ConnectionState::Closed);

        let mut writer = self.shared.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            debug!(%err, "write-half shutdown failed");
        }
    }

    /// Wait until the connection reaches a terminal state.
    pub async fn closed(&self) {
        let mut rx = self.state_rx.clone();
        while !rx.borrow_and_update().is_terminal() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Shared {
    /// Move to a terminal state, failing every waiter and releasing every
    /// resource. The first caller wins; later calls are no-ops.
    fn teardown(&self, final_state: ConnectionState) {
        let mut first = false;
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = final_state;
                first = true;
                true
            }
        });
        if !first {
            return;
        }

        self.shutdown.cancel();
        self.request_gate.close();

        let waiters: Vec<PendingReply> = {
            let mut pending = lock(&self.pending);
            pending.closed = true;
            pending.waiters.drain(..).collect()
        };
        for waiter in waiters {
            let _ = waiter.send(Err(PeerError::ConnectionClosed));
        }

        // Handlers may capture clones of this connection; dropping them
        // here breaks the reference cycle.
        lock(&self.handlers).clear();

        if let Some(cleanup) = lock(&self.cleanup).take() {
            cleanup();
        }

        info!(state = ?final_state, "connection torn down");
    }
}

/// Reads frames until cancellation, EOF, or an unrecoverable error,
/// discriminating requests from replies and routing each.
async fn receive_loop(shared: Arc<Shared>, mut reader: BoxedReader) {
    let shutdown = shared.shutdown.clone();
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => {
                shared.teardown(ConnectionState::Closed);
                return;
            }
            received = reader.receive() => match received {
                Ok(frame) => frame,
                Err(FrameError::ConnectionClosed) => {
                    debug!("peer closed the stream");
                    shared.teardown(ConnectionState::Closed);
                    return;
                }
                Err(err) => {
                    warn!(%err, "receive failed, tearing connection down");
                    shared.teardown(ConnectionState::Failed);
                    return;
                }
            },
        };

        match Envelope::parse(&frame) {
            Ok(Envelope::Request(request)) => dispatch(&shared, request),
            Ok(Envelope::Response(response)) => {
                let waiter = lock(&shared.pending).waiters.pop_front();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(Bytes::from(response.payload)));
                    }
                    None => warn!("reply with no pending request, dropping"),
                }
            }
            // A malformed payload fails only that frame, not the session.
            Err(err) => warn!(%err, "undecodable frame payload, dropping"),
        }
    }
}

/// Run a handler concurrently with continued frame reading and write its
/// reply back. A failing handler produces an empty-payload reply so FIFO
/// reply matching stays aligned.
fn dispatch(shared: &Arc<Shared>, request: RequestEnvelope) {
    let handler = lock(&shared.handlers).get(&request.identifier);
    let Some(handler) = handler else {
        warn!(identifier = %request.identifier, "no handler registered, dropping request");
        return;
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let identifier = request.identifier;
        debug!(%identifier, "handling request");

        let envelope = match handler.call(Bytes::from(request.payload)).await {
            Ok(payload) => ResponseEnvelope::new(payload),
            Err(err) => {
                warn!(%identifier, error = %err, "handler failed, replying with empty payload");
                ResponseEnvelope::empty()
            }
        };

        let wire = match serde_json::to_vec(&envelope) {
            Ok(wire) => wire,
            Err(err) => {
                warn!(%identifier, %err, "reply serialization failed");
                return;
            }
        };

        let mut writer = shared.writer.lock().await;
        if let Err(err) = writer.send(&wire).await {
            warn!(%identifier, %err, "reply write failed, tearing connection down");
            drop(writer);
            shared.teardown(ConnectionState::Failed);
        }
    });
}
