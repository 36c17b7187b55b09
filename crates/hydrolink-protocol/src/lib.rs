//! Canonical wire schema for Hydrolink.
//!
//! This crate defines the one "language" the rest of Hydrolink speaks:
//!
//! - **Types** ([`Track`], [`LoadResult`], [`UpdatePlayer`], ...) — the
//!   canonical REST shapes, modeled on the Lavalink v4 schema.
//! - **Messages** ([`NodeMessage`], [`PlayerEvent`]) — the canonical
//!   push-channel shapes a backend sends over its WebSocket.
//! - **Events** ([`ClientEvent`]) — what Hydrolink itself emits to the
//!   host application.
//! - **Codec** ([`decode_track`]) — the binary track blob format.
//! - **Casing** ([`camel_to_snake`], [`snake_to_camel`]) — key rewrites
//!   for dialects that do not speak camelCase.
//!
//! Dialect differences stop at the driver boundary: drivers translate
//! their backend's JSON into these shapes, and everything above them
//! (nodes, players, the manager) never sees dialect-specific payloads.

mod casing;
mod codec;
mod error;
mod events;
mod messages;
mod types;

pub use casing::{camel_to_snake, snake_to_camel};
pub use codec::{BlobLayout, decode_track, encode_track};
pub use error::ProtocolError;
pub use events::ClientEvent;
pub use messages::{
    CpuStats, FrameStats, MemoryStats, NodeMessage, PlayerEvent, PlayerState,
    StatsPatch, TrackEndReason,
};
pub use types::{
    LoadException, LoadResult, Playlist, PlaylistInfo, PlayerUpdateData, Track,
    TrackInfo, UpdatePlayer, UpdateTrack, VoiceUpdate,
};
