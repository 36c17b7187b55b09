//! Messages a backend pushes over its websocket, in canonical form.
//!
//! Drivers parse dialect JSON into [`NodeMessage`]; anything that does not
//! parse is dropped with a diagnostic rather than crashing the socket loop.
//! The four operations here are the complete inbound surface: a session
//! handshake, periodic statistics, per-guild position reports, and the
//! per-guild player events.

use serde::{Deserialize, Serialize};

use crate::types::{LoadException, Track};

/// A single message received from a backend node.
///
/// On the wire this is discriminated by an `op` key:
///
/// ```text
/// { "op": "ready", "resumed": false, "sessionId": "..." }
/// { "op": "playerUpdate", "guildId": "...", "state": { ... } }
/// { "op": "stats", "players": 1, ... }
/// { "op": "event", "type": "TrackStartEvent", "guildId": "...", ... }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NodeMessage {
    /// First message after the socket opens. Carries the REST session id
    /// used for every player call from then on.
    Ready {
        #[serde(default)]
        resumed: bool,
        session_id: String,
    },

    /// Periodic position report for one guild's player.
    PlayerUpdate {
        guild_id: String,
        #[serde(default)]
        state: PlayerState,
    },

    /// Periodic load statistics, merged into the node's stats snapshot.
    Stats(StatsPatch),

    /// A per-guild player event, routed to the owning player.
    Event(PlayerEvent),
}

/// Position snapshot inside a `playerUpdate` message.
#[derive(
    Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerState {
    /// Unix timestamp (ms) at which the backend sampled the state.
    pub time: u64,
    /// Playback position in milliseconds.
    pub position: u64,
    /// Whether the backend is connected to the voice gateway.
    pub connected: bool,
    /// Voice gateway ping in milliseconds, `-1` when unknown.
    pub ping: i64,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// One `stats` message. Every field is optional because dialects omit
/// different sections; a field that is present replaces that section of
/// the node's snapshot wholesale, a missing field leaves it alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsPatch {
    pub players: Option<u64>,
    pub playing_players: Option<u64>,
    pub uptime: Option<u64>,
    pub memory: Option<MemoryStats>,
    pub cpu: Option<CpuStats>,
    pub frame_stats: Option<FrameStats>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuStats {
    pub cores: u64,
    pub system_load: f64,
    pub lavalink_load: f64,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

// ---------------------------------------------------------------------------
// Player events
// ---------------------------------------------------------------------------

/// Why a track stopped playing.
///
/// Deserialized through `From<String>` so an unrecognized reason maps to
/// [`TrackEndReason::Unknown`] instead of failing the whole event. The
/// event router treats `Unknown` like a natural finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
    Unknown,
}

impl From<String> for TrackEndReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "finished" => TrackEndReason::Finished,
            "loadFailed" => TrackEndReason::LoadFailed,
            "stopped" => TrackEndReason::Stopped,
            "replaced" => TrackEndReason::Replaced,
            "cleanup" => TrackEndReason::Cleanup,
            _ => TrackEndReason::Unknown,
        }
    }
}

impl TrackEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackEndReason::Finished => "finished",
            TrackEndReason::LoadFailed => "loadFailed",
            TrackEndReason::Stopped => "stopped",
            TrackEndReason::Replaced => "replaced",
            TrackEndReason::Cleanup => "cleanup",
            TrackEndReason::Unknown => "unknown",
        }
    }
}

/// A per-guild event inside an `op: event` message.
///
/// The `track` payload is optional across the board: Lavalink v4 sends a
/// full track object, while v3 sends a bare base64 string that the driver
/// decodes on a best-effort basis. The event router keys its decisions off
/// the player's own queue, so a missing track payload is survivable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PlayerEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        guild_id: String,
        #[serde(default)]
        track: Option<Track>,
    },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        guild_id: String,
        #[serde(default)]
        track: Option<Track>,
        reason: TrackEndReason,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        guild_id: String,
        #[serde(default)]
        track: Option<Track>,
        #[serde(default)]
        exception: LoadException,
    },

    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        guild_id: String,
        #[serde(default)]
        track: Option<Track>,
        #[serde(default)]
        threshold_ms: u64,
    },

    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        guild_id: String,
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        by_remote: bool,
    },
}

impl PlayerEvent {
    /// The guild this event belongs to.
    pub fn guild_id(&self) -> &str {
        match self {
            PlayerEvent::TrackStart { guild_id, .. }
            | PlayerEvent::TrackEnd { guild_id, .. }
            | PlayerEvent::TrackException { guild_id, .. }
            | PlayerEvent::TrackStuck { guild_id, .. }
            | PlayerEvent::WebSocketClosed { guild_id, .. } => guild_id,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
