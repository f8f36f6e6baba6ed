//! Transport session: the single persistent connection to the service
//!
//! One [`AdminSocketClient`] owns one physical WebSocket link and the
//! lifecycle task driving it. The task dials, runs the verification
//! handshake, serves inbound route requests while the app is active, and
//! re-dials after transport drops. Every reconnection that verifies
//! successfully replays the last activation payload so server-side state is
//! restored without caller involvement.
//!
//! All callers are serialized against connection readiness through
//! [`AdminSocketClient::ensure_ready`]; commands themselves are correlated
//! by token through the [`RequestCorrelator`], so responses may arrive in
//! any order.

use crate::core::config::{AdminCredentials, SdkConfig};
use crate::core::connection_state::{
    AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics,
};
use crate::core::correlator::RequestCorrelator;
use crate::core::protocol::{
    AdminAction, ApiCommand, ApiResponse, EventFrame, InboundRequest, WriteBody,
    ADMIN_SOCKET_API_ACTION, ADMIN_SOCKET_GET_QUERY, ADMIN_SOCKET_VERIFIED,
    ADMIN_SOCKET_VERIFY_ERROR, ADMIN_SOCKET_WRITE_DOC, ADMIN_VERIFY_SOCKET,
};
use crate::core::token::generate_response_token;
use crate::traits::{AdminError, ReadRoute, Result, WriteRoute};
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Verdict of the most recent verification cycle, broadcast to `connect()`
/// callers so repeated calls share one in-flight outcome
#[derive(Debug, Clone, PartialEq)]
enum ConnectOutcome {
    Pending,
    Ready,
    Rejected(String),
    Unreachable,
}

/// The caller's last-declared route registrations
///
/// `payload` is the activation body exactly as it went over the wire; the
/// resume replay sends this stored value, never a re-serialization.
#[derive(Clone)]
struct ActiveRoutes {
    reads: Vec<ReadRoute>,
    writes: Vec<WriteRoute>,
    payload: Value,
}

/// State shared between the client handle and its session task
struct SessionShared {
    config: SdkConfig,
    credentials: AdminCredentials,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    correlator: RequestCorrelator,
    routes: RwLock<Option<ActiveRoutes>>,
    /// Whether the inbound read/write servers are registered. A flag rather
    /// than listener accumulation, so re-activation cannot double-register.
    serving: AtomicBool,
    running: AtomicBool,
    shutdown_notify: Notify,
    outcome_tx: watch::Sender<ConnectOutcome>,
    outbound_tx: mpsc::UnboundedSender<EventFrame>,
}

/// Client half of the admin session
///
/// Exactly one instance exists per admin app. The physical connection and
/// both inbound server registrations are owned by the session task; no other
/// component touches them directly.
pub struct AdminSocketClient {
    shared: Arc<SessionShared>,
    outcome_rx: watch::Receiver<ConnectOutcome>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<EventFrame>>>,
}

impl AdminSocketClient {
    pub fn new(credentials: AdminCredentials, config: SdkConfig) -> Self {
        let (outcome_tx, outcome_rx) = watch::channel(ConnectOutcome::Pending);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            config,
            credentials,
            state: AtomicConnectionState::new(ConnectionState::Idle),
            metrics: AtomicMetrics::new(),
            correlator: RequestCorrelator::new(),
            routes: RwLock::new(None),
            serving: AtomicBool::new(false),
            running: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
            outcome_tx,
            outbound_tx,
        });

        Self {
            shared,
            outcome_rx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    /// Open the session and wait for the first verification verdict
    ///
    /// Only the call that observes `Idle` spawns the session task; every
    /// other concurrent or repeated call awaits the same in-flight outcome,
    /// so a second physical link is never opened.
    pub async fn connect(&self) -> Result<()> {
        if self
            .shared
            .state
            .compare_exchange(ConnectionState::Idle, ConnectionState::Connecting)
            .is_ok()
        {
            if let Some(outbound_rx) = self.outbound_rx.lock().take() {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(run_session(shared, outbound_rx));
            }
        }

        self.await_connect_outcome().await
    }

    async fn await_connect_outcome(&self) -> Result<()> {
        let mut outcome_rx = self.outcome_rx.clone();
        loop {
            let outcome = outcome_rx.borrow_and_update().clone();
            match outcome {
                ConnectOutcome::Ready => return Ok(()),
                ConnectOutcome::Rejected(message) => {
                    return Err(AdminError::Verification(message))
                }
                ConnectOutcome::Unreachable => return Err(AdminError::ServiceUnreachable),
                ConnectOutcome::Pending => {
                    if self.shared.state.is_failed() {
                        return Err(AdminError::ServiceUnreachable);
                    }
                    if outcome_rx.changed().await.is_err() {
                        return Err(AdminError::ChannelClosed("connect outcome".into()));
                    }
                }
            }
        }
    }

    /// Single entry point all outbound operations await before sending
    ///
    /// `Idle` triggers `connect()`. While the session is mid-handshake the
    /// caller polls the state; if the poll ceiling is reached the state is
    /// forced to `Failed` and every caller blocked in this cycle rejects.
    /// `Failed` rejects immediately and is only left by a later physical
    /// reconnect.
    pub async fn ensure_ready(&self) -> Result<()> {
        loop {
            match self.shared.state.get() {
                ConnectionState::Idle => return self.connect().await,
                ConnectionState::Connecting => {
                    let mut counter = 0u32;
                    while self.shared.state.is_connecting() {
                        tokio::time::sleep(self.shared.config.ready_poll_interval).await;
                        counter += 1;

                        if counter >= self.shared.config.ready_poll_limit
                            && self.shared.state.is_connecting()
                        {
                            warn!("readiness ceiling reached while still connecting");
                            self.shared.state.set(ConnectionState::Failed);
                        }
                    }
                    // state moved on, re-evaluate from the top
                }
                ConnectionState::Verified => return Ok(()),
                ConnectionState::Failed => return Err(AdminError::ServiceUnreachable),
            }
        }
    }

    /// Send a command and wait for its correlated response
    ///
    /// A response carrying an error body rejects with that error; a data
    /// body resolves with the data. There is deliberately no timeout here:
    /// a command stays pending until the service answers its token, and the
    /// only forced termination is the readiness gate's connecting ceiling.
    pub async fn send(&self, command: ApiCommand) -> Result<Value> {
        send_command(&self.shared, command).await
    }

    /// Declare the app's active route set
    ///
    /// On success the session stores the serialized activation payload; the
    /// same bytes are replayed after every reconnection until
    /// [`deactivate`](Self::deactivate) clears them.
    pub async fn activate(&self, reads: Vec<ReadRoute>, writes: Vec<WriteRoute>) -> Result<()> {
        let payload = activation_payload(&reads, &writes);
        let command = ApiCommand::new(AdminAction::StartApp, payload.clone());
        send_command(&self.shared, command).await?;

        *self.shared.routes.write() = Some(ActiveRoutes {
            reads,
            writes,
            payload,
        });
        self.shared.serving.store(true, Ordering::Release);
        Ok(())
    }

    /// Withdraw the app's route set and stop serving inbound requests
    pub async fn deactivate(&self) -> Result<()> {
        let command = ApiCommand::new(AdminAction::StopApp, json!({}));
        send_command(&self.shared, command).await?;

        self.shared.serving.store(false, Ordering::Release);
        *self.shared.routes.write() = None;
        Ok(())
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    #[inline]
    pub fn is_verified(&self) -> bool {
        self.shared.state.is_verified()
    }

    /// Number of commands still waiting on a response token
    pub fn pending_requests(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            messages_sent: self.shared.metrics.messages_sent(),
            messages_received: self.shared.metrics.messages_received(),
            reconnect_count: self.shared.metrics.reconnect_count(),
            connection_state: self.shared.state.get(),
        }
    }

    /// Stop the session task and give up the connection
    ///
    /// The task closes the link at its next scheduling point and will not
    /// re-dial afterwards.
    pub fn shutdown(&self) {
        info!("shutting down admin session");
        self.shared.running.store(false, Ordering::Release);
        self.shared.shutdown_notify.notify_one();
    }
}

/// Correlated send shared by the client handle and the resume replay
async fn send_command(shared: &Arc<SessionShared>, mut command: ApiCommand) -> Result<Value> {
    let token = command
        .response_id
        .take()
        .unwrap_or_else(generate_response_token);
    command.response_id = Some(token.clone());

    // The waiter goes in before the frame goes out; a same-tick response
    // must always find it.
    let waiter = shared.correlator.register(&token);

    let payload =
        serde_json::to_value(&command).map_err(|e| AdminError::Transport(e.to_string()))?;
    let frame = EventFrame::new(ADMIN_SOCKET_API_ACTION, payload);
    if shared.outbound_tx.send(frame).is_err() {
        shared.correlator.forget(&token);
        return Err(AdminError::ChannelClosed("session outbound queue".into()));
    }

    let response = waiter
        .await
        .map_err(|_| AdminError::ChannelClosed("response waiter".into()))?;

    match response.error {
        Some(api_error) => Err(AdminError::Api(api_error)),
        None => Ok(response.data.unwrap_or(Value::Null)),
    }
}

fn activation_payload(reads: &[ReadRoute], writes: &[WriteRoute]) -> Value {
    json!({
        "readRoutes": reads.iter().map(ReadRoute::wire_descriptor).collect::<Vec<_>>(),
        "writeRoutes": writes.iter().map(WriteRoute::wire_descriptor).collect::<Vec<_>>(),
    })
}

/// Session lifecycle task: dial, verify, serve, re-dial
async fn run_session(
    shared: Arc<SessionShared>,
    mut outbound_rx: mpsc::UnboundedReceiver<EventFrame>,
) {
    let mut is_reconnection = false;
    let mut reconnect_attempt = 0usize;

    loop {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        shared.state.set(ConnectionState::Connecting);
        shared.outcome_tx.send_replace(ConnectOutcome::Pending);

        let url = shared.config.connect_url();
        match connect_async(&url).await {
            Ok((ws_stream, _)) => {
                info!(%url, reconnection = is_reconnection, "connected to Heliograph service");
                reconnect_attempt = 0;

                match drive_connection(&shared, ws_stream, &mut outbound_rx, is_reconnection)
                    .await
                {
                    Ok(()) => debug!("session loop ended"),
                    Err(e) => warn!(error = %e, "connection lost"),
                }

                if !shared.running.load(Ordering::Acquire) {
                    break;
                }

                // The link is gone; the next verified cycle resumes state.
                is_reconnection = true;
                shared.state.set(ConnectionState::Connecting);
            }
            Err(e) => {
                error!(error = %e, "failed to reach Heliograph service");
            }
        }

        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        if shared.config.reconnection_delay_offset > Duration::ZERO {
            tokio::time::sleep(shared.config.reconnection_delay_offset).await;
        }

        match shared
            .config
            .reconnect_strategy
            .next_delay(reconnect_attempt)
        {
            Some(delay) => {
                info!(?delay, attempt = reconnect_attempt + 1, "reconnecting");
                tokio::time::sleep(delay).await;
                reconnect_attempt += 1;
                shared.metrics.increment_reconnects();
            }
            None => {
                warn!("reconnection strategy exhausted, giving up");
                shared.state.set(ConnectionState::Failed);
                shared.outcome_tx.send_replace(ConnectOutcome::Unreachable);
                break;
            }
        }
    }

    info!("session task exiting");
}

/// Drive one physical connection until it drops or the session shuts down
async fn drive_connection(
    shared: &Arc<SessionShared>,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::UnboundedReceiver<EventFrame>,
    is_reconnection: bool,
) -> Result<()> {
    let (mut write, mut read): (WsSink, WsSource) = ws_stream.split();

    // The verification handshake opens every physical connection.
    let credentials = serde_json::to_value(&shared.credentials)
        .map_err(|e| AdminError::Transport(e.to_string()))?;
    send_frame(&mut write, &EventFrame::new(ADMIN_VERIFY_SOCKET, credentials)).await?;
    shared.metrics.increment_sent();

    loop {
        tokio::select! {
            _ = shared.shutdown_notify.notified() => {
                let _ = write.close().await;
                return Ok(());
            }

            frame = outbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        send_frame(&mut write, &frame).await?;
                        shared.metrics.increment_sent();
                    }
                    // All senders live in SessionShared, so this only fires
                    // when the session itself is being torn down.
                    None => return Ok(()),
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        shared.metrics.increment_received();
                        match serde_json::from_str::<EventFrame>(&text) {
                            Ok(frame) => handle_frame(shared, frame, is_reconnection),
                            Err(e) => debug!(error = %e, "discarding unparseable frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(AdminError::Transport("server closed the connection".into()));
                    }
                    Some(Ok(_)) => {
                        // ping/pong/binary frames carry nothing for us
                    }
                    Some(Err(e)) => return Err(AdminError::Transport(e.to_string())),
                    None => return Err(AdminError::Transport("stream ended".into())),
                }
            }
        }
    }
}

async fn send_frame(write: &mut WsSink, frame: &EventFrame) -> Result<()> {
    let text = serde_json::to_string(frame).map_err(|e| AdminError::Transport(e.to_string()))?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| AdminError::Transport(e.to_string()))
}

/// Dispatch one inbound frame
///
/// Fixed event names are lifecycle and inbound-server traffic; any other
/// event name is a response on a token channel.
fn handle_frame(shared: &Arc<SessionShared>, frame: EventFrame, is_reconnection: bool) {
    match frame.event.as_str() {
        ADMIN_SOCKET_VERIFIED => {
            shared.state.set(ConnectionState::Verified);
            shared.outcome_tx.send_replace(ConnectOutcome::Ready);

            if is_reconnection {
                debug!("session verified after reconnect");
                resume_active_routes(shared);
            } else {
                info!("session verified");
            }
        }

        ADMIN_SOCKET_VERIFY_ERROR => {
            let message = verify_error_message(&frame.payload);
            shared.state.set(ConnectionState::Failed);
            error!(%message, "verification rejected by the service");
            shared
                .outcome_tx
                .send_replace(ConnectOutcome::Rejected(message));
        }

        ADMIN_SOCKET_GET_QUERY => serve_read_query(shared, frame.payload),

        ADMIN_SOCKET_WRITE_DOC => serve_write_doc(shared, frame.payload),

        _ => match serde_json::from_value::<ApiResponse>(frame.payload) {
            Ok(response) => {
                shared.correlator.resolve(&frame.event, response);
            }
            Err(e) => debug!(token = %frame.event, error = %e, "malformed response payload"),
        },
    }
}

fn verify_error_message(payload: &Value) -> String {
    if let Some(message) = payload.as_str() {
        return message.to_string();
    }
    payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string())
}

/// Replay the stored activation payload after a reconnection
///
/// Silent from the caller's perspective: no future is handed out and the
/// stored snapshot is not touched. Nothing happens when no routes are held,
/// whether because the app never activated or because it deactivated.
fn resume_active_routes(shared: &Arc<SessionShared>) {
    let snapshot = shared.routes.read().clone();
    let Some(active) = snapshot else {
        debug!("no active routes to resume");
        return;
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let command = ApiCommand::new(AdminAction::StartApp, active.payload.clone());
        match send_command(&shared, command).await {
            Ok(_) => {
                shared.serving.store(true, Ordering::Release);
                info!(
                    reads = active.reads.len(),
                    writes = active.writes.len(),
                    "active routes restored after reconnect"
                );
            }
            Err(e) => warn!(error = %e, "failed to restore active routes after reconnect"),
        }
    });
}

/// Serve one inbound read-query request on its own task
fn serve_read_query(shared: &Arc<SessionShared>, payload: Value) {
    if !shared.serving.load(Ordering::Acquire) {
        debug!("read query received while app is inactive, ignoring");
        return;
    }

    let request: InboundRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "malformed read query request");
            return;
        }
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let route = {
            let guard = shared.routes.read();
            guard.as_ref().and_then(|active| {
                active
                    .reads
                    .iter()
                    .find(|route| route.route_id == request.route_id)
                    .cloned()
            })
        };

        let reply = match route {
            Some(route) => {
                let body = request.body.clone();
                // A faulty handler answers its own token, nothing more.
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    (route.query_fn)(body)
                })) {
                    Ok(Ok(data)) => ok_reply(data),
                    Ok(Err(e)) => error_reply(&e.to_string()),
                    Err(_) => error_reply("Unknown error"),
                }
            }
            None => error_reply("Invalid route request"),
        };

        emit_reply(&shared, &request.response_id, reply);
    });
}

/// Serve one inbound write-document request on its own task
fn serve_write_doc(shared: &Arc<SessionShared>, payload: Value) {
    if !shared.serving.load(Ordering::Acquire) {
        debug!("write request received while app is inactive, ignoring");
        return;
    }

    let request: InboundRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "malformed write request");
            return;
        }
    };

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let route = {
            let guard = shared.routes.read();
            guard.as_ref().and_then(|active| {
                active
                    .writes
                    .iter()
                    .find(|route| route.route_id == request.route_id)
                    .cloned()
            })
        };

        let reply = match route {
            Some(route) => {
                let body: WriteBody =
                    serde_json::from_value(request.body.clone()).unwrap_or_default();
                let doc_future = (route.doc_fn)(body.client_data, body.parent_data);
                match std::panic::AssertUnwindSafe(doc_future).catch_unwind().await {
                    Ok(Ok(doc)) => match serde_json::to_value(&doc) {
                        Ok(value) => ok_reply(value),
                        Err(e) => error_reply(&e.to_string()),
                    },
                    Ok(Err(e)) => error_reply(&e.to_string()),
                    Err(_) => error_reply("Unknown error"),
                }
            }
            None => error_reply("Invalid write route request"),
        };

        emit_reply(&shared, &request.response_id, reply);
    });
}

fn ok_reply(data: Value) -> Value {
    json!({ "data": data })
}

fn error_reply(message: &str) -> Value {
    json!({ "error": { "message": message } })
}

fn emit_reply(shared: &Arc<SessionShared>, response_id: &str, reply: Value) {
    if shared
        .outbound_tx
        .send(EventFrame::new(response_id, reply))
        .is_err()
    {
        warn!(%response_id, "session gone before inbound reply could be sent");
    }
}
