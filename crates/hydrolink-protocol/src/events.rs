//! Typed events emitted to library consumers.
//!
//! These are the outward-facing counterpart of [`crate::messages`]: raw
//! dialect traffic goes in, `ClientEvent`s come out of the manager's event
//! bus. The variants cover node lifecycle, per-guild playback, and a debug
//! channel that mirrors what the library logs internally.

use crate::messages::PlayerState;
use crate::types::{LoadException, Track};

/// An event delivered on the client event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    // -- Node lifecycle --
    /// A node finished its websocket handshake and is usable.
    NodeConnect { node: String },

    /// A node's websocket dropped. A reconnect may follow.
    NodeDisconnect {
        node: String,
        code: u16,
        reason: String,
    },

    /// A reconnect attempt is starting for a node.
    NodeReconnect { node: String },

    /// A node reported a socket or request error. Not necessarily fatal.
    NodeError { node: String, message: String },

    /// A node gave up reconnecting (or was told to disconnect) and is
    /// permanently closed.
    NodeClosed { node: String },

    // -- Playback --
    /// A track started playing in a guild.
    TrackStart { guild_id: String, track: Track },

    /// A track stopped playing. Emitted with the track that ended when
    /// the queue advances or playback is replaced.
    TrackEnd {
        guild_id: String,
        track: Option<Track>,
    },

    /// The backend failed to play a track.
    TrackException {
        guild_id: String,
        track: Option<Track>,
        exception: LoadException,
    },

    /// The backend stopped receiving audio frames for a track.
    TrackStuck {
        guild_id: String,
        track: Option<Track>,
        threshold_ms: u64,
    },

    /// The backend's own voice websocket for a guild closed.
    PlayerWebsocketClosed {
        guild_id: String,
        code: u16,
        reason: String,
        by_remote: bool,
    },

    /// Periodic position report for a guild's player.
    PlayerUpdate {
        guild_id: String,
        state: PlayerState,
    },

    /// Playback finished and no queued track is left to advance to.
    QueueEmpty { guild_id: String },

    // -- Player lifecycle --
    /// A player was created for a guild.
    PlayerCreate { guild_id: String },

    /// A player was destroyed and removed from the registry.
    PlayerDestroy { guild_id: String },

    // -- Diagnostics --
    /// Internal diagnostics, mirroring the library's debug logging.
    Debug { message: String },
}
