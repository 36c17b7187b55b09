//! Canonical data model for Hydrolink's wire format.
//!
//! Every audio backend dialect (Lavalink v4, Lavalink v3, Nodelink v2,
//! FrequenC v1) is translated into the shapes in this module at the driver
//! boundary. Everything above the drivers — node bookkeeping, players, the
//! search facade — speaks only these types and never sees dialect JSON.
//!
//! The canonical shape follows the Lavalink v4 REST schema: camelCase keys,
//! `length`/`position` for track timings, and a `loadType`-discriminated
//! load result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// A single playable track.
///
/// `encoded` is the backend's opaque base64 blob for this track. It is the
/// only thing a backend needs to play the track again, so it must survive
/// every translation round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque base64 track blob, exactly as the backend produced it.
    pub encoded: String,

    /// Decoded metadata describing the track.
    pub info: TrackInfo,

    /// Free-form plugin metadata. Backends without plugins send `{}`;
    /// dialects that predate the field send nothing, which we keep as
    /// `null` and omit when re-serializing.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub plugin_info: Value,
}

/// Metadata for a [`Track`].
///
/// Field names on the wire follow the Lavalink v4 schema. Two of them are
/// renamed on the Rust side because the wire names are misleading:
/// `length` is a duration in milliseconds and `position` is a starting
/// offset in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub title: String,
    pub author: String,

    /// Track duration in milliseconds. Serialized as `length`.
    #[serde(rename = "length")]
    pub duration_ms: u64,

    /// Source-specific identifier (video id, track slug, ...).
    pub identifier: String,

    pub is_seekable: bool,
    pub is_stream: bool,

    #[serde(default)]
    pub uri: Option<String>,

    #[serde(default)]
    pub artwork_url: Option<String>,

    #[serde(default)]
    pub isrc: Option<String>,

    /// Which source plugin produced the track (`youtube`, `soundcloud`, ...).
    pub source_name: String,

    /// Starting offset in milliseconds. Serialized as `position`.
    #[serde(rename = "position", default)]
    pub position_ms: u64,
}

// ---------------------------------------------------------------------------
// Load results
// ---------------------------------------------------------------------------

/// A named playlist plus the tracks inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub info: PlaylistInfo,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub plugin_info: Value,

    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    pub name: String,

    /// Index of the selected track, `-1` when nothing is selected.
    #[serde(default = "default_selected_track")]
    pub selected_track: i64,
}

fn default_selected_track() -> i64 {
    -1
}

/// The error payload of a failed load, also reused by track-exception
/// events. Every field is optional on some dialect, so all of them default.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadException {
    pub message: Option<String>,
    pub severity: String,
    pub cause: Option<String>,
}

/// The canonical outcome of a track load or search.
///
/// On the wire this is a `loadType` discriminant plus a `data` payload
/// whose shape depends on the discriminant:
///
/// ```text
/// { "loadType": "track",    "data": { ...Track } }
/// { "loadType": "playlist", "data": { ...Playlist } }
/// { "loadType": "search",   "data": [ ...Track ] }
/// { "loadType": "empty",    "data": {} }
/// { "loadType": "error",    "data": { ...LoadException } }
/// ```
///
/// Deserialization goes through [`LoadResult::from_value`] rather than a
/// derived impl: backends are sloppy about the `data` key for `empty`
/// results (some send `{}`, some `null`, some omit it), and the derive
/// would reject all of those.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "loadType", content = "data", rename_all = "camelCase")]
pub enum LoadResult {
    Track(Track),
    Playlist(Playlist),
    Search(Vec<Track>),
    Empty,
    Error(LoadException),
}

impl LoadResult {
    /// Interprets an already-parsed JSON value as a load result.
    ///
    /// The discriminant must be one of the five canonical `loadType`
    /// strings; anything else is an [`ProtocolError::InvalidMessage`].
    /// For `empty` the payload is ignored entirely, and for `error` a
    /// missing or malformed payload degrades to a default exception
    /// instead of failing the whole result.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let load_type = value
            .get("loadType")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(
                    "load result has no loadType field".into(),
                )
            })?;
        let data = value.get("data").cloned().unwrap_or(Value::Null);

        match load_type {
            "track" => serde_json::from_value(data)
                .map(LoadResult::Track)
                .map_err(ProtocolError::Decode),
            "playlist" => serde_json::from_value(data)
                .map(LoadResult::Playlist)
                .map_err(ProtocolError::Decode),
            "search" => serde_json::from_value(data)
                .map(LoadResult::Search)
                .map_err(ProtocolError::Decode),
            "empty" => Ok(LoadResult::Empty),
            "error" => Ok(LoadResult::Error(
                serde_json::from_value(data).unwrap_or_default(),
            )),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown loadType `{other}`"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for LoadResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        LoadResult::from_value(&value).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Player update commands
// ---------------------------------------------------------------------------

/// A canonical "update this guild's player" command.
///
/// `guild_id` and `no_replace` travel in the request path and query
/// string; only [`PlayerUpdateData`] becomes the request body. Drivers
/// translate one of these into zero or more dialect wire messages.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlayer {
    pub guild_id: String,

    /// When true, the backend keeps the currently playing track instead
    /// of replacing it.
    pub no_replace: bool,

    pub data: PlayerUpdateData,
}

impl UpdatePlayer {
    pub fn new(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            no_replace: false,
            data: PlayerUpdateData::default(),
        }
    }
}

/// Body of a player update. Every field is optional; absent fields leave
/// the corresponding player property untouched on the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerUpdateData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdateTrack>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    /// Opaque filter chain, passed through to the backend untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceUpdate>,
}

/// The `track` portion of a player update.
///
/// `encoded` is deliberately *not* skipped when `None`: an explicit
/// `"encoded": null` is the wire instruction to stop the current track,
/// which is different from not mentioning the track at all.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrack {
    pub encoded: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,
}

/// Discord voice credentials forwarded to the backend so it can join the
/// voice server on our behalf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUpdate {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

// =========================================================================
// Tests
// =========================================================================
