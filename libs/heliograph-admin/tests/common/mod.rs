//! Common test utilities for admin SDK integration tests
//!
//! Hosts a mock Heliograph service speaking the admin protocol over a real
//! WebSocket listener, so tests exercise the full session lifecycle.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Behavior switches and recordings shared with the test body
pub struct ServerState {
    /// Answer verification with ADMIN_SOCKET_VERIFY_ERROR
    pub reject_verify: AtomicBool,
    /// Leave verification unanswered, pinning clients in Connecting
    pub hold_verify: AtomicBool,
    /// Reply `{data: {ok: true}}` to every admin command automatically
    pub auto_reply_commands: AtomicBool,
    /// Every (event, payload) frame received from any client
    pub received: Mutex<Vec<(String, Value)>>,
    /// Bodies of START_APP commands, in arrival order
    pub activations: Mutex<Vec<Value>>,
    /// Response tokens of admin commands, in arrival order
    pub command_tokens: Mutex<Vec<String>>,
    /// Total accepted connections
    pub connections: AtomicUsize,
    conn_senders: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            reject_verify: AtomicBool::new(false),
            hold_verify: AtomicBool::new(false),
            auto_reply_commands: AtomicBool::new(true),
            received: Mutex::new(Vec::new()),
            activations: Mutex::new(Vec::new()),
            command_tokens: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            conn_senders: Mutex::new(Vec::new()),
        }
    }
}

/// Mock Heliograph service for integration tests
pub struct MockHeliographServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    shutdown: Arc<Notify>,
}

/// Route SDK logs to the test output when RUST_LOG is set
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockHeliographServer {
    /// Create and start a new mock server on an ephemeral port
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::new());
        let shutdown = Arc::new(Notify::new());

        let accept_state = Arc::clone(&state);
        let accept_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let state = Arc::clone(&accept_state);
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, state).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = accept_shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            state,
            shutdown,
        }
    }

    async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        state.connections.fetch_add(1, Ordering::SeqCst);

        let (server_tx, mut server_rx) = mpsc::unbounded_channel::<Message>();
        state.conn_senders.lock().push(server_tx.clone());

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                outgoing = server_rx.recv() => {
                    match outgoing {
                        Some(Message::Close(frame)) => {
                            let _ = write.send(Message::Close(frame)).await;
                            break;
                        }
                        Some(msg) => {
                            if write.send(msg).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_frame(&text, &state, &server_tx);
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    fn handle_frame(text: &str, state: &Arc<ServerState>, reply_tx: &mpsc::UnboundedSender<Message>) {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let event = frame["event"].as_str().unwrap_or_default().to_string();
        let payload = frame["payload"].clone();
        state.received.lock().push((event.clone(), payload.clone()));

        let reply = |event: &str, payload: Value| {
            let text = json!({ "event": event, "payload": payload }).to_string();
            let _ = reply_tx.send(Message::Text(text));
        };

        match event.as_str() {
            "ADMIN_VERIFY_SOCKET" => {
                if state.hold_verify.load(Ordering::SeqCst) {
                    // stay silent, clients remain mid-handshake
                } else if state.reject_verify.load(Ordering::SeqCst) {
                    reply(
                        "ADMIN_SOCKET_VERIFY_ERROR",
                        json!({ "message": "Invalid project credentials" }),
                    );
                } else {
                    reply("ADMIN_SOCKET_VERIFIED", json!({}));
                }
            }
            "ADMIN_SOCKET_API_ACTION" => {
                let token = payload["responseId"].as_str().unwrap_or_default().to_string();
                state.command_tokens.lock().push(token.clone());

                if payload["action"] == json!("START_APP") {
                    state.activations.lock().push(payload["body"].clone());
                }

                if state.auto_reply_commands.load(Ordering::SeqCst) {
                    reply(
                        &token,
                        json!({
                            "data": { "ok": true },
                            "timestamp": chrono::Utc::now(),
                        }),
                    );
                }
            }
            _ => {}
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push a frame to every live connection
    pub fn emit(&self, event: &str, payload: Value) {
        let text = json!({ "event": event, "payload": payload }).to_string();
        for sender in self.state.conn_senders.lock().iter() {
            let _ = sender.send(Message::Text(text.clone()));
        }
    }

    /// Close every live connection, forcing clients into their reconnect path
    pub fn force_disconnect(&self) {
        let mut senders = self.state.conn_senders.lock();
        for sender in senders.drain(..) {
            let _ = sender.send(Message::Close(None));
        }
    }

    /// Wait until a frame with the given event name arrives from a client
    pub async fn wait_for_frame(&self, event: &str) -> Option<Value> {
        for _ in 0..500 {
            let found = self
                .state
                .received
                .lock()
                .iter()
                .find(|(name, _)| name == event)
                .map(|(_, payload)| payload.clone());
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    /// All payloads received so far for the given event name
    pub fn frames_for(&self, event: &str) -> Vec<Value> {
        self.state
            .received
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Wait until the server has accepted `count` connections in total
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        for _ in 0..500 {
            if self.state.connections.load(Ordering::SeqCst) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.force_disconnect();
    }
}

impl Drop for MockHeliographServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
