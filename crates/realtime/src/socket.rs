//! Socket session management.
//!
//! [`SocketManager`] owns the one persistent WebSocket connection a
//! client process holds, together with its authentication handshake and
//! reconnection policy. It is constructed once at the application's
//! composition root and passed by reference to every consumer; no
//! component may open its own transport.
//!
//! The manager is a thin handle; the work happens in a background
//! session task (connect → authenticate → process frames → reconnect)
//! that the handle drives through an unbounded command channel.
//! Connection state is published through a [`tokio::sync::watch`]
//! channel so the UI can render the current status without polling.
//!
//! Two properties the task upholds:
//!
//! - after every successful (re)connect, the cached identity is
//!   re-authenticated before any other outbound traffic;
//! - a transport failure never reaches callers as an error: it feeds
//!   the backoff schedule until either a connect succeeds or the
//!   attempt budget is exhausted and the session is declared lost.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use sajilo_core::types::UserId;

use crate::messages::{parse_event, ClientAction, Role, ServerEvent};
use crate::reconnect::{backoff_delay, ReconnectConfig};
use crate::router::EventRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Transport-level handshake timeout.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Configuration & status
// ---------------------------------------------------------------------------

/// Configuration for a [`SocketManager`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// WebSocket endpoint, e.g. `wss://api.example.com/socket`.
    pub url: String,
    pub reconnect: ReconnectConfig,
    pub handshake_timeout: Duration,
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport and nothing to do.
    Idle,
    /// First connect attempt of a cycle in progress.
    Connecting,
    /// Transport established; authentication sent but not confirmed.
    Connected,
    /// Server confirmed the authentication handshake.
    Authenticated,
    /// Transport lost; backoff/retry cycle running.
    Reconnecting,
    /// Attempt budget exhausted. Terminal until an explicit retry.
    Lost,
}

/// Errors from the transport layer. Internal to the session task; they
/// feed the reconnect policy instead of propagating to callers.
#[derive(Debug, thiserror::Error)]
enum SocketError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

// ---------------------------------------------------------------------------
// Commands & pending sends
// ---------------------------------------------------------------------------

enum Command {
    Connect { user_id: UserId, role: Role },
    Disconnect,
    Emit(ClientAction),
    NetworkChanged,
}

/// Sends registered while disconnected, flushed after the next
/// authentication. Bounded by construction: the latest action per
/// channel replaces any earlier one, in first-registration order.
#[derive(Default)]
struct PendingActions(Vec<ClientAction>);

impl PendingActions {
    fn queue(&mut self, action: ClientAction) {
        match self.0.iter_mut().find(|a| a.channel() == action.channel()) {
            Some(slot) => *slot = action,
            None => self.0.push(action),
        }
    }

    fn drain(&mut self) -> Vec<ClientAction> {
        std::mem::take(&mut self.0)
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

// ---------------------------------------------------------------------------
// SocketManager
// ---------------------------------------------------------------------------

/// Handle to the background socket session.
pub struct SocketManager {
    router: Arc<EventRouter>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cancel: CancellationToken,
}

impl SocketManager {
    /// Spawn the session task. No transport is opened until the first
    /// [`connect`](Self::connect) call.
    pub fn start(config: SocketConfig) -> Arc<Self> {
        let router = Arc::new(EventRouter::new());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);
        let cancel = CancellationToken::new();

        let task_router = Arc::clone(&router);
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            run_session(config, task_router, status_tx, cmd_rx, task_cancel).await;
            tracing::debug!("Socket session task exited");
        });

        Arc::new(Self {
            router,
            cmd_tx,
            status_rx,
            cancel,
        })
    }

    /// Open (or re-authenticate) the session for an identity.
    ///
    /// Idempotent: when the transport is already up this re-sends the
    /// `authenticate` action instead of reconnecting; when it is down,
    /// a connect cycle starts. The identity is cached and replayed
    /// after every reconnect.
    pub fn connect(&self, user_id: impl Into<UserId>, role: Role) {
        let _ = self.cmd_tx.send(Command::Connect {
            user_id: user_id.into(),
            role,
        });
    }

    /// Tear down the transport and forget the cached identity.
    /// Safe to call when not connected.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Send an action now if connected; otherwise register it to fire
    /// after the next authentication and nudge a connect attempt.
    pub fn emit(&self, action: ClientAction) {
        let _ = self.cmd_tx.send(Command::Emit(action));
    }

    /// Tell the session the device regained connectivity; any backoff
    /// delay currently pending is skipped.
    pub fn notify_network_change(&self) {
        let _ = self.cmd_tx.send(Command::NetworkChanged);
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch connection state changes (UI indicator, listeners).
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.status(),
            ConnectionStatus::Connected | ConnectionStatus::Authenticated
        )
    }

    /// The shared event router all consumers subscribe through.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Stop the session task outright (process teardown).
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

enum ConnExit {
    /// Transport dropped unexpectedly; feed the backoff cycle.
    Dropped,
    /// Explicit disconnect; back to idle.
    Disconnected,
    /// Cancellation or handle dropped; exit the task.
    Shutdown,
}

async fn run_session(
    config: SocketConfig,
    router: Arc<EventRouter>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
) {
    let mut identity: Option<(UserId, Role)> = None;
    let mut pending = PendingActions::default();

    'idle: loop {
        // Idle: no transport. Wait for a command that warrants one.
        let start = tokio::select! {
            _ = cancel.cancelled() => return,
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { return };
                match cmd {
                    Command::Connect { user_id, role } => {
                        identity = Some((user_id, role));
                        true
                    }
                    // An emit while down queues the action and, once an
                    // identity has ever been cached, opportunistically
                    // starts a connect attempt.
                    Command::Emit(action) => {
                        pending.queue(action);
                        identity.is_some()
                    }
                    Command::NetworkChanged => identity.is_some(),
                    Command::Disconnect => {
                        identity = None;
                        pending.clear();
                        let _ = status_tx.send(ConnectionStatus::Idle);
                        false
                    }
                }
            }
        };
        if !start {
            continue 'idle;
        }

        // Connect cycle: dial, run the connection, back off on failure.
        let mut failures: u32 = 0;
        loop {
            let _ = status_tx.send(if failures == 0 {
                ConnectionStatus::Connecting
            } else {
                ConnectionStatus::Reconnecting
            });

            match dial(&config).await {
                Ok(ws) => {
                    failures = 0;
                    let exit = run_connection(
                        ws,
                        &router,
                        &status_tx,
                        &mut cmd_rx,
                        &cancel,
                        &mut identity,
                        &mut pending,
                    )
                    .await;
                    match exit {
                        ConnExit::Dropped => {}
                        ConnExit::Disconnected => {
                            let _ = status_tx.send(ConnectionStatus::Idle);
                            continue 'idle;
                        }
                        ConnExit::Shutdown => return,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, url = %config.url, "Socket connect attempt failed");
                }
            }

            failures += 1;
            if failures > config.reconnect.max_attempts {
                tracing::error!(
                    attempts = config.reconnect.max_attempts,
                    "Reconnect attempts exhausted, session lost"
                );
                let _ = status_tx.send(ConnectionStatus::Lost);
                continue 'idle;
            }

            let delay = backoff_delay(failures, &config.reconnect);
            tracing::info!(
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            let _ = status_tx.send(ConnectionStatus::Reconnecting);

            let deadline = tokio::time::Instant::now() + delay;
            'backoff: loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break 'backoff,
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { return };
                        match cmd {
                            Command::Connect { user_id, role } => {
                                // Manual retry: fresh cycle, no waiting.
                                identity = Some((user_id, role));
                                failures = 0;
                                break 'backoff;
                            }
                            Command::Disconnect => {
                                identity = None;
                                pending.clear();
                                let _ = status_tx.send(ConnectionStatus::Idle);
                                continue 'idle;
                            }
                            Command::Emit(action) => pending.queue(action),
                            Command::NetworkChanged => {
                                tracing::info!("Network restored, skipping backoff delay");
                                break 'backoff;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Dial the endpoint with the handshake timeout applied. Each attempt
/// carries a fresh client id so the server can address this connection.
async fn dial(config: &SocketConfig) -> Result<WsStream, SocketError> {
    let client_id = uuid::Uuid::new_v4();
    let separator = if config.url.contains('?') { '&' } else { '?' };
    let url = format!("{}{}clientId={}", config.url, separator, client_id);

    match tokio::time::timeout(config.handshake_timeout, connect_async(&url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(SocketError::Connection(e.to_string())),
        Err(_) => Err(SocketError::HandshakeTimeout(config.handshake_timeout)),
    }
}

/// Drive one live connection until it drops, is shut down, or the
/// caller disconnects.
async fn run_connection(
    ws: WsStream,
    router: &EventRouter,
    status_tx: &watch::Sender<ConnectionStatus>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancellationToken,
    identity: &mut Option<(UserId, Role)>,
    pending: &mut PendingActions,
) -> ConnExit {
    let (mut sink, mut stream) = ws.split();
    let _ = status_tx.send(ConnectionStatus::Connected);
    tracing::info!("Socket connected");

    // Authentication goes out before any other traffic; nothing the
    // server pushes is trusted as subscribed until this is sent.
    if let Some((user_id, role)) = identity.as_ref() {
        let auth = ClientAction::Authenticate {
            user_id: user_id.clone(),
            user_type: *role,
        };
        if send_action(&mut sink, &auth).await.is_err() {
            return ConnExit::Dropped;
        }
    }

    // Flush sends registered while disconnected.
    let queued = pending.drain();
    for (idx, action) in queued.iter().enumerate() {
        if let Err(e) = send_action(&mut sink, action).await {
            tracing::warn!(error = %e, channel = action.channel(), "Flush failed, requeueing");
            for action in &queued[idx..] {
                pending.queue(action.clone());
            }
            return ConnExit::Dropped;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                return ConnExit::Shutdown;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    let _ = sink.close().await;
                    return ConnExit::Shutdown;
                };
                match cmd {
                    // connect() while connected re-authenticates instead
                    // of reconnecting.
                    Command::Connect { user_id, role } => {
                        *identity = Some((user_id.clone(), role));
                        let auth = ClientAction::Authenticate { user_id, user_type: role };
                        if send_action(&mut sink, &auth).await.is_err() {
                            return ConnExit::Dropped;
                        }
                    }
                    Command::Disconnect => {
                        *identity = None;
                        pending.clear();
                        let _ = sink.close().await;
                        return ConnExit::Disconnected;
                    }
                    Command::Emit(action) => {
                        if let Err(e) = send_action(&mut sink, &action).await {
                            tracing::warn!(error = %e, channel = action.channel(), "Send failed, requeueing");
                            pending.queue(action);
                            return ConnExit::Dropped;
                        }
                    }
                    Command::NetworkChanged => {}
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_text_frame(&text, router, status_tx),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Answered by tungstenite.
                    }
                    Some(Ok(Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Socket closed by server");
                        return ConnExit::Dropped;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Socket receive error");
                        return ConnExit::Dropped;
                    }
                    None => {
                        tracing::info!("Socket stream ended");
                        return ConnExit::Dropped;
                    }
                }
            }
        }
    }
}

fn handle_text_frame(
    text: &str,
    router: &EventRouter,
    status_tx: &watch::Sender<ConnectionStatus>,
) {
    match parse_event(text) {
        Ok(event) => {
            if matches!(event, ServerEvent::Authenticated(_)) {
                tracing::debug!("Authentication confirmed by server");
                let _ = status_tx.send(ConnectionStatus::Authenticated);
            }
            router.dispatch(&event);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unparseable socket frame");
        }
    }
}

async fn send_action(
    sink: &mut WsSink,
    action: &ClientAction,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let frame = match action.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, channel = action.channel(), "Failed to encode action");
            return Ok(());
        }
    };
    sink.send(Message::Text(frame)).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
