//! One node's push-channel lifecycle.
//!
//! [`NodeConnection`] owns a background task that dials the node, pumps
//! transport events through the driver's inbound translation, and applies
//! the reconnect policy when the socket drops. Everything the rest of the
//! library needs to know comes out as an ordered stream of [`NodeSignal`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};

use hydrolink_driver::{Driver, NodeProfile};
use hydrolink_protocol::{ClientEvent, NodeMessage, PlayerEvent, PlayerState};
use hydrolink_transport::TransportEvent;

use crate::stats::NodeStats;

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

/// Reconnect and resume policy for one node.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Delay between reconnect attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// How many reconnect attempts before the node closes for good.
    pub retry_count: u32,
    /// Ask the backend to keep the session alive across reconnects.
    pub resume: bool,
    /// How long the backend should hold a resumable session, in seconds.
    pub resume_timeout_secs: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            retry_delay_ms: 3_000,
            retry_count: 15,
            resume: false,
            resume_timeout_secs: 300,
        }
    }
}

/// Lifecycle state of a node's push channel.
///
/// ```text
///          open()                    socket drop
/// Closed ─────────> Connecting ──┐  ┌─────────────> Disconnected
///                      ^         │  │                  │      │
///                      │         v  │     retry        │      │ retries
///                      │      Connected <──────────────┘      │ exhausted or
///                      │                                      │ disconnect()
///                      └── retry ── Disconnected              v
///                                                           Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    /// Not running: never opened, or permanently shut down.
    Closed,
    /// Dialing or waiting for the handshake to finish.
    Connecting,
    /// Handshake done; the push channel is live.
    Connected,
    /// The socket dropped; a reconnect attempt may follow.
    Disconnected,
}

/// What a node surfaces to the layers above it.
///
/// The channel closes after the final [`ClientEvent::NodeClosed`], so a
/// drained receiver means the node is gone for good.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSignal {
    /// Lifecycle and diagnostics, forwarded to the client event bus.
    Event(ClientEvent),
    /// A per-guild player event, for the event router.
    Player(PlayerEvent),
    /// A per-guild position report.
    Update { guild_id: String, state: PlayerState },
}

// ---------------------------------------------------------------------------
// Connection handle
// ---------------------------------------------------------------------------

struct NodeShared {
    profile: NodeProfile,
    driver: Arc<dyn Driver>,
    options: ConnectionOptions,
    state: Mutex<ConnectState>,
    stats: Mutex<NodeStats>,
    /// Set by [`NodeConnection::disconnect`]; stops the reconnect loop.
    suppress: AtomicBool,
    /// Cuts the retry backoff short when a disconnect comes in.
    wake: Notify,
}

impl NodeShared {
    async fn set_state(&self, state: ConnectState) {
        *self.state.lock().await = state;
    }
}

/// Handle to one registered node.
///
/// Cheap to clone; all clones observe the same connection. Dropping the
/// handles does not stop the background task, [`disconnect`] does.
///
/// [`disconnect`]: NodeConnection::disconnect
#[derive(Clone)]
pub struct NodeConnection {
    shared: Arc<NodeShared>,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("profile", &self.shared.profile)
            .finish_non_exhaustive()
    }
}

impl NodeConnection {
    /// Starts the connect loop for `profile` and returns the handle plus
    /// the signal stream the loop feeds.
    pub fn open(
        profile: NodeProfile,
        driver: Arc<dyn Driver>,
        options: ConnectionOptions,
    ) -> (Self, UnboundedReceiver<NodeSignal>) {
        let shared = Arc::new(NodeShared {
            profile,
            driver,
            options,
            state: Mutex::new(ConnectState::Closed),
            stats: Mutex::new(NodeStats::default()),
            suppress: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let (signals, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run(Arc::clone(&shared), signals));
        (Self { shared }, receiver)
    }

    /// Display name of this node.
    pub fn name(&self) -> &str {
        &self.shared.profile.name
    }

    /// The dialect driver behind this node.
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.shared.driver
    }

    /// The REST surface of this node.
    pub fn rest(&self) -> crate::rest::Rest {
        crate::rest::Rest::new(Arc::clone(&self.shared.driver))
    }

    pub async fn state(&self) -> ConnectState {
        *self.shared.state.lock().await
    }

    /// Whether the push channel is currently live.
    pub async fn is_online(&self) -> bool {
        self.state().await == ConnectState::Connected
    }

    /// Last known load statistics.
    pub async fn stats(&self) -> NodeStats {
        *self.shared.stats.lock().await
    }

    /// Player count for load balancing: the live REST count when the node
    /// answers, the last stats snapshot when it does not.
    pub async fn player_count(&self) -> u64 {
        match self.rest().get_players().await {
            Ok(players) => players.len() as u64,
            Err(err) => {
                tracing::debug!(
                    node = %self.name(),
                    error = %err,
                    "player count fetch failed, using stats snapshot"
                );
                self.stats().await.players
            }
        }
    }

    /// Permanently closes this node.
    ///
    /// The socket is torn down, no reconnect follows, and the signal
    /// stream ends with a single [`ClientEvent::NodeClosed`].
    pub async fn disconnect(&self) {
        self.shared.suppress.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        if let Err(err) = self.shared.driver.ws_close().await {
            tracing::debug!(
                node = %self.name(),
                error = %err,
                "close request failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

fn emit(signals: &UnboundedSender<NodeSignal>, event: ClientEvent) {
    let _ = signals.send(NodeSignal::Event(event));
}

/// Connect loop: one iteration per socket session, ending either in a
/// retry or in the terminal close.
async fn run(shared: Arc<NodeShared>, signals: UnboundedSender<NodeSignal>) {
    let name = shared.profile.name.clone();
    let mut retries: u32 = 0;

    loop {
        shared.set_state(ConnectState::Connecting).await;
        tracing::debug!(
            node = %name,
            driver = shared.driver.id(),
            "connecting to node"
        );

        let mut events = match shared.driver.connect().await {
            Ok(events) => events,
            Err(err) => {
                // connect() only fails before the dial starts, which means
                // malformed coordinates. Retrying cannot fix that.
                tracing::error!(node = %name, error = %err, "node connect failed");
                emit(
                    &signals,
                    ClientEvent::NodeError {
                        node: name.clone(),
                        message: err.to_string(),
                    },
                );
                finish(&shared, &signals).await;
                return;
            }
        };

        let (code, reason) = pump(&shared, &signals, &mut events, &mut retries).await;

        shared.set_state(ConnectState::Disconnected).await;
        tracing::warn!(node = %name, code, reason = %reason, "node disconnected");
        emit(
            &signals,
            ClientEvent::NodeDisconnect {
                node: name.clone(),
                code,
                reason,
            },
        );

        if shared.suppress.load(Ordering::SeqCst)
            || retries >= shared.options.retry_count
        {
            finish(&shared, &signals).await;
            return;
        }

        let delay = Duration::from_millis(shared.options.retry_delay_ms);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.wake.notified() => {}
        }
        if shared.suppress.load(Ordering::SeqCst) {
            finish(&shared, &signals).await;
            return;
        }

        retries += 1;
        tracing::info!(
            node = %name,
            attempt = retries,
            max = shared.options.retry_count,
            "reconnecting to node"
        );
        emit(&signals, ClientEvent::NodeReconnect { node: name.clone() });
    }
}

/// Terminal transition: state goes to `Closed` and exactly one
/// `NodeClosed` is emitted, no matter how many times the socket dropped
/// on the way here.
async fn finish(shared: &NodeShared, signals: &UnboundedSender<NodeSignal>) {
    shared.set_state(ConnectState::Closed).await;
    shared.suppress.store(false, Ordering::SeqCst);
    tracing::info!(node = %shared.profile.name, "node closed");
    emit(
        signals,
        ClientEvent::NodeClosed {
            node: shared.profile.name.clone(),
        },
    );
}

/// Drives one socket session; returns the close code and reason.
async fn pump(
    shared: &NodeShared,
    signals: &UnboundedSender<NodeSignal>,
    events: &mut UnboundedReceiver<TransportEvent>,
    retries: &mut u32,
) -> (u16, String) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Open => {
                *retries = 0;
                shared.set_state(ConnectState::Connected).await;
                tracing::info!(node = %shared.profile.name, "node connected");
                emit(
                    signals,
                    ClientEvent::NodeConnect {
                        node: shared.profile.name.clone(),
                    },
                );
            }
            TransportEvent::Message { text, .. } => {
                handle_message(shared, signals, &text).await;
            }
            TransportEvent::Pong => {
                tracing::trace!(node = %shared.profile.name, "pong received");
            }
            TransportEvent::Error { message } => {
                tracing::warn!(
                    node = %shared.profile.name,
                    message = %message,
                    "websocket error"
                );
                emit(
                    signals,
                    ClientEvent::NodeError {
                        node: shared.profile.name.clone(),
                        message,
                    },
                );
            }
            TransportEvent::Close { code, reason } => return (code, reason),
        }
    }
    // The transport guarantees a terminal close event; a bare channel drop
    // means the reader task was torn down some other way.
    (1006, String::from("socket closed suddenly"))
}

async fn handle_message(
    shared: &NodeShared,
    signals: &UnboundedSender<NodeSignal>,
    raw: &str,
) {
    let Some(message) = shared.driver.translate_inbound(raw) else {
        return;
    };
    match message {
        NodeMessage::Ready {
            resumed,
            session_id,
        } => {
            tracing::info!(node = %shared.profile.name, resumed, "node ready");
            shared.driver.set_session_id(Some(session_id)).await;
            if shared.options.resume {
                if let Err(err) = shared
                    .driver
                    .update_session(true, shared.options.resume_timeout_secs)
                    .await
                {
                    tracing::warn!(
                        node = %shared.profile.name,
                        error = %err,
                        "failed to enable session resuming"
                    );
                }
            }
            emit(
                signals,
                ClientEvent::Debug {
                    message: format!(
                        "node {} is ready (resumed: {resumed})",
                        shared.profile.name
                    ),
                },
            );
        }
        NodeMessage::PlayerUpdate { guild_id, state } => {
            let _ = signals.send(NodeSignal::Update { guild_id, state });
        }
        NodeMessage::Stats(patch) => {
            shared.stats.lock().await.merge(&patch);
        }
        NodeMessage::Event(event) => {
            let _ = signals.send(NodeSignal::Player(event));
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
