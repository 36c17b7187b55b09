//! Dialect drivers for Hydrolink.
//!
//! A [`Driver`] is the translation boundary between the canonical schema in
//! `hydrolink-protocol` and one backend's actual wire format. Four dialects
//! are supported:
//!
//! - `lavalink/v4/koinu`: Lavalink v4, player updates over REST
//! - `lavalink/v3/koto`: Lavalink v3, player updates as websocket ops
//! - `nodelink/v2/nari`: Nodelink v2, a v4 dialect with its own load
//!   result taxonomy
//! - `frequenc/v1/miku`: FrequenC v1, a snake_case dialect with its own
//!   track blob layout
//!
//! Everything above the drivers (nodes, players, the search facade) speaks
//! canonical types only; everything below (`hydrolink-transport`) moves
//! bytes without caring what they mean.

mod error;
mod frequenc;
mod lavalink3;
mod lavalink4;
mod nodelink2;
pub mod requester;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use hydrolink_protocol::{NodeMessage, ProtocolError, Track, UpdatePlayer};
use hydrolink_transport::{TransportEvent, WireSocket};

pub use crate::error::DriverError;
pub use crate::frequenc::FrequencDriver;
pub use crate::lavalink3::Lavalink3Driver;
pub use crate::lavalink4::Lavalink4Driver;
pub use crate::nodelink2::Nodelink2Driver;
pub use crate::requester::{RestClient, RestRequest};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection coordinates for one backend node.
#[derive(Debug, Clone)]
pub struct NodeProfile {
    /// Display name, used in logs and events.
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Value of the `Authorization` header.
    pub auth: String,
    /// Use `wss`/`https` instead of `ws`/`http`.
    pub secure: bool,
    /// Drive the websocket through the library implementation instead of
    /// the handcrafted frame codec.
    pub legacy_ws: bool,
}

impl NodeProfile {
    /// Websocket URL for `path` (which must start with `/`).
    pub fn ws_url(&self, path: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{path}", self.host, self.port)
    }

    /// HTTP base URL with the dialect prefix `base` appended.
    pub fn http_url(&self, base: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}{base}", self.host, self.port)
    }
}

/// Who we are, stamped on every websocket handshake and REST request.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// The bot's user id.
    pub user_id: String,
    pub shard_count: u32,
    /// `User-Agent` for both websocket and REST traffic.
    pub user_agent: String,
    /// Identity string in `name/version (url)` form.
    pub client_name: String,
    /// Ask backends to keep the session alive across reconnects.
    pub resume: bool,
}

impl ClientIdentity {
    /// Connect headers shared by the Lavalink-family dialects.
    ///
    /// The session id is only attached when resuming is enabled, so a
    /// plain reconnect starts a fresh session.
    pub(crate) fn connect_headers(
        &self,
        auth: &str,
        session: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Authorization".to_string(), auth.to_string()),
            ("user-id".to_string(), self.user_id.clone()),
            ("client-name".to_string(), self.client_name.clone()),
            ("user-agent".to_string(), self.user_agent.clone()),
            ("num-shards".to_string(), self.shard_count.to_string()),
        ];
        if self.resume {
            if let Some(session) = session {
                headers.push(("session-id".to_string(), session.to_string()));
            }
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Driver trait
// ---------------------------------------------------------------------------

/// How one canonical player update reaches the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPlan {
    /// A single REST call (the REST-oriented dialects).
    Rest(RestRequest),
    /// An ordered burst of websocket messages (Lavalink v3).
    Socket(Vec<Value>),
}

/// One wire dialect, object-safe so nodes can hold an `Arc<dyn Driver>`.
///
/// A driver owns the node's websocket handle and REST client and performs
/// all translation between the canonical schema and the dialect's wire
/// format, in both directions.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable dialect id, e.g. `lavalink/v4/koinu`.
    fn id(&self) -> &'static str;

    /// The session id issued by the backend's `ready` message, if any.
    async fn session_id(&self) -> Option<String>;

    /// Records (or clears) the backend session id.
    async fn set_session_id(&self, session_id: Option<String>);

    /// Opens the websocket push channel.
    ///
    /// Returns the event stream for the new connection; the driver keeps
    /// the write handle for [`send_raw`](Driver::send_raw) and
    /// [`ws_close`](Driver::ws_close). Failures after the dial starts
    /// arrive as events on the stream, not as an `Err` here.
    async fn connect(
        &self,
    ) -> Result<UnboundedReceiver<TransportEvent>, DriverError>;

    /// Sends one raw text message on the push channel.
    async fn send_raw(&self, text: &str) -> Result<(), DriverError>;

    /// Closes the push channel from our side.
    async fn ws_close(&self) -> Result<(), DriverError>;

    /// Rewrites one inbound push message into the canonical schema.
    ///
    /// Returns `None` (with a diagnostic) for traffic that does not
    /// parse; the socket loop survives unknown messages.
    fn translate_inbound(&self, raw: &str) -> Option<NodeMessage>;

    /// Converts a canonical player update into this dialect's wire plan.
    async fn translate_outbound(
        &self,
        update: &UpdatePlayer,
    ) -> Result<OutboundPlan, DriverError>;

    /// Executes one REST call, normalizing the response to the canonical
    /// shape. `Ok(None)` means the backend had nothing to say.
    async fn request(
        &self,
        request: RestRequest,
    ) -> Result<Option<Value>, DriverError>;

    /// Configures backend-side session persistence for the current
    /// session. Dialects without resume support log and do nothing.
    async fn update_session(
        &self,
        resume: bool,
        timeout_secs: u64,
    ) -> Result<(), DriverError>;

    /// Decodes a track blob locally, without asking the backend.
    fn decode_track(&self, encoded: &str) -> Result<Track, ProtocolError>;

    /// Applies a canonical player update by executing the dialect's plan.
    async fn update_player(
        &self,
        update: &UpdatePlayer,
    ) -> Result<Option<Value>, DriverError> {
        match self.translate_outbound(update).await? {
            OutboundPlan::Rest(request) => self.request(request).await,
            OutboundPlan::Socket(messages) => {
                for message in messages {
                    self.send_raw(&message.to_string()).await?;
                }
                Ok(None)
            }
        }
    }

    /// Fetches lyrics for an encoded track. Only Nodelink supports this;
    /// everywhere else it is a diagnostic no-op.
    async fn get_lyrics(
        &self,
        encoded: &str,
        language: Option<&str>,
    ) -> Result<Option<Value>, DriverError> {
        let _ = (encoded, language);
        tracing::debug!(
            driver = self.id(),
            "lyrics are not supported by this dialect"
        );
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Driver selection
// ---------------------------------------------------------------------------

/// The four supported wire dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Lavalink4,
    Lavalink3,
    Nodelink2,
    FrequenC,
}

impl DriverKind {
    /// Resolves a driver id string.
    ///
    /// Unknown ids fall back to Lavalink v4 with a warning instead of
    /// failing node registration, so a typo degrades to the most common
    /// dialect rather than a dead node.
    pub fn from_id(id: &str) -> Self {
        match id {
            lavalink4::ID => DriverKind::Lavalink4,
            lavalink3::ID => DriverKind::Lavalink3,
            nodelink2::ID => DriverKind::Nodelink2,
            frequenc::ID => DriverKind::FrequenC,
            other => {
                tracing::warn!(
                    driver = other,
                    fallback = lavalink4::ID,
                    "unknown driver id, assuming lavalink v4"
                );
                DriverKind::Lavalink4
            }
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            DriverKind::Lavalink4 => lavalink4::ID,
            DriverKind::Lavalink3 => lavalink3::ID,
            DriverKind::Nodelink2 => nodelink2::ID,
            DriverKind::FrequenC => frequenc::ID,
        }
    }

    /// Builds a driver for `profile` speaking this dialect.
    pub fn build(
        self,
        profile: NodeProfile,
        identity: ClientIdentity,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        Ok(match self {
            DriverKind::Lavalink4 => {
                Arc::new(Lavalink4Driver::new(profile, identity)?)
            }
            DriverKind::Lavalink3 => {
                Arc::new(Lavalink3Driver::new(profile, identity)?)
            }
            DriverKind::Nodelink2 => {
                Arc::new(Nodelink2Driver::new(profile, identity)?)
            }
            DriverKind::FrequenC => {
                Arc::new(FrequencDriver::new(profile, identity)?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Shared driver state
// ---------------------------------------------------------------------------

/// Connection state every dialect driver keeps: the write handle for the
/// push channel and the session id the backend issued in `ready`.
pub(crate) struct DriverCore {
    session: Mutex<Option<String>>,
    socket: Mutex<Option<WireSocket>>,
}

impl DriverCore {
    pub(crate) fn new() -> Self {
        Self {
            session: Mutex::new(None),
            socket: Mutex::new(None),
        }
    }

    pub(crate) async fn session(&self) -> Option<String> {
        self.session.lock().await.clone()
    }

    pub(crate) async fn set_session(&self, session_id: Option<String>) {
        *self.session.lock().await = session_id;
    }

    /// Dials `url` and parks the write handle; transport events stream to
    /// the returned receiver.
    pub(crate) async fn open(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        legacy: bool,
    ) -> Result<UnboundedReceiver<TransportEvent>, DriverError> {
        let (socket, events) = WireSocket::connect(url, headers, legacy)?;
        *self.socket.lock().await = Some(socket);
        Ok(events)
    }

    /// Sends a text message on the push channel. A missing socket drops
    /// the message with a diagnostic rather than erroring, so callers can
    /// fire and forget across reconnects.
    pub(crate) async fn send(
        &self,
        node: &str,
        text: &str,
    ) -> Result<(), DriverError> {
        let socket = self.socket.lock().await.clone();
        match socket {
            Some(socket) => Ok(socket.send(text).await?),
            None => {
                tracing::debug!(node, "dropping websocket message, no socket");
                Ok(())
            }
        }
    }

    /// Closes the push channel. The backend sees a normal close; our own
    /// node layer reports it as a self-initiated 1006.
    pub(crate) async fn close(&self, node: &str) -> Result<(), DriverError> {
        let socket = self.socket.lock().await.clone();
        match socket {
            Some(socket) => Ok(socket.close(1006, "Self closed").await?),
            None => {
                tracing::debug!(node, "websocket already gone, nothing to close");
                Ok(())
            }
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
