//! Lavalink v3, the message-oriented legacy dialect.
//!
//! v3 predates the v4 REST player API: player commands are individual
//! websocket opcodes (`play`, `pause`, `seek`, ...), load results use
//! SCREAMING_SNAKE discriminants with per-track `track`/`info` pairs, and
//! push events carry the track as a bare base64 blob. This driver fans
//! canonical player updates out into opcode bursts and rebuilds v3
//! responses into the canonical shape on the way in.

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use hydrolink_protocol::{
    BlobLayout, NodeMessage, ProtocolError, Track, UpdatePlayer,
};
use hydrolink_transport::TransportEvent;

use crate::error::DriverError;
use crate::requester::{RestClient, RestRequest};
use crate::{ClientIdentity, Driver, DriverCore, NodeProfile, OutboundPlan};

pub(crate) const ID: &str = "lavalink/v3/koto";

/// Resume key sent with `configureResuming` on backends too old to issue
/// REST sessions.
const LEGACY_RESUME_KEY: &str = "hydrolink/lavalink/v3/koto/legacy";

pub struct Lavalink3Driver {
    profile: NodeProfile,
    identity: ClientIdentity,
    rest: RestClient,
    core: DriverCore,
}

impl Lavalink3Driver {
    pub fn new(
        profile: NodeProfile,
        identity: ClientIdentity,
    ) -> Result<Self, DriverError> {
        // No base prefix: `/v3` is attached per request, and only once a
        // session exists (3.4-era backends serve everything at the root).
        let rest = RestClient::new(&profile, &identity, "")?;
        Ok(Self {
            profile,
            identity,
            rest,
            core: DriverCore::new(),
        })
    }
}

#[async_trait]
impl Driver for Lavalink3Driver {
    fn id(&self) -> &'static str {
        ID
    }

    async fn session_id(&self) -> Option<String> {
        self.core.session().await
    }

    async fn set_session_id(&self, session_id: Option<String>) {
        self.core.set_session(session_id).await;
    }

    async fn connect(
        &self,
    ) -> Result<UnboundedReceiver<TransportEvent>, DriverError> {
        let session = self.core.session().await;
        let headers = self
            .identity
            .connect_headers(&self.profile.auth, session.as_deref());
        self.core
            .open(&self.profile.ws_url("/"), headers, self.profile.legacy_ws)
            .await
    }

    async fn send_raw(&self, text: &str) -> Result<(), DriverError> {
        self.core.send(&self.profile.name, text).await
    }

    async fn ws_close(&self) -> Result<(), DriverError> {
        self.core.close(&self.profile.name).await
    }

    fn translate_inbound(&self, raw: &str) -> Option<NodeMessage> {
        let mut value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(
                    node = %self.profile.name,
                    error = %err,
                    "dropping unparseable node message"
                );
                return None;
            }
        };

        rewrite_end_reason(&mut value);

        // v3 events carry the track as a bare blob; decode it so the
        // canonical event has a real track object. Best effort: a blob we
        // cannot read becomes a missing track, not a dropped event.
        if value.get("op").and_then(Value::as_str) == Some("event") {
            if let Some(encoded) = value.get("track").and_then(Value::as_str)
            {
                let track = hydrolink_protocol::decode_track(
                    encoded,
                    BlobLayout::Versioned,
                )
                .ok()
                .and_then(|track| serde_json::to_value(track).ok())
                .unwrap_or(Value::Null);
                value["track"] = track;
            }
        }

        match serde_json::from_value(value) {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::debug!(
                    node = %self.profile.name,
                    error = %err,
                    "dropping node message with unknown shape"
                );
                None
            }
        }
    }

    async fn translate_outbound(
        &self,
        update: &UpdatePlayer,
    ) -> Result<OutboundPlan, DriverError> {
        Ok(OutboundPlan::Socket(websocket_plan(update)))
    }

    async fn request(
        &self,
        request: RestRequest,
    ) -> Result<Option<Value>, DriverError> {
        // Player traffic rides the websocket in v3. These paths exist only
        // so the shared REST surface stays uniform across dialects.
        if request.path.contains("/sessions//") {
            return Ok(None);
        }
        if is_player_path(&request.path) || request.method == Method::DELETE {
            return Ok(None);
        }

        if request.path.contains("/decodetrack") {
            if let Some(encoded) = request.param("encodedTrack") {
                match self.decode_track(encoded) {
                    Ok(track) => {
                        return Ok(serde_json::to_value(track).ok());
                    }
                    Err(err) => {
                        tracing::debug!(
                            node = %self.profile.name,
                            error = %err,
                            "local track decode failed, asking the backend"
                        );
                    }
                }
            }
        }

        let mut request = request;
        if self.core.session().await.is_some() {
            request.path = format!("/v3{}", request.path);
        }
        let response = self.rest.execute(request).await?;
        Ok(response.map(convert_load_result))
    }

    async fn update_session(
        &self,
        resume: bool,
        timeout_secs: u64,
    ) -> Result<(), DriverError> {
        match self.core.session().await {
            Some(session) if !session.is_empty() => {
                let request = RestRequest::patch(
                    format!("/sessions/{session}"),
                    json!({ "resumingKey": session, "timeout": timeout_secs }),
                );
                self.request(request).await?;
            }
            _ => {
                // No REST session on this backend: use the websocket
                // resume opcode instead.
                let message = json!({
                    "op": "configureResuming",
                    "key": LEGACY_RESUME_KEY,
                    "timeout": 60,
                });
                self.send_raw(&message.to_string()).await?;
            }
        }
        tracing::debug!(
            node = %self.profile.name,
            resume,
            timeout_secs,
            "session configuration updated"
        );
        Ok(())
    }

    fn decode_track(&self, encoded: &str) -> Result<Track, ProtocolError> {
        hydrolink_protocol::decode_track(encoded, BlobLayout::Versioned)
    }
}

// ---------------------------------------------------------------------------
// Outbound fan-out
// ---------------------------------------------------------------------------

/// Fans one canonical player update out into v3 websocket opcodes.
///
/// Order matters: voice state first, then the track action. A `play`
/// suppresses everything after it, because the play opcode already carries
/// position, volume and pause state inline.
fn websocket_plan(update: &UpdatePlayer) -> Vec<Value> {
    let data = &update.data;
    let mut messages = Vec::new();

    if let Some(voice) = &data.voice {
        messages.push(json!({
            "op": "voiceUpdate",
            "guildId": update.guild_id,
            "sessionId": voice.session_id,
            "event": voice,
        }));
    }

    let mut play_sent = false;
    if let Some(track) = &data.track {
        match &track.encoded {
            Some(encoded) if track.length != Some(0) => {
                play_sent = true;
                let mut message = op_message("play", &update.guild_id);
                message.insert("track".into(), json!(encoded));
                insert_some(&mut message, "startTime", data.position);
                insert_some(&mut message, "endTime", track.length);
                insert_some(&mut message, "volume", data.volume);
                message.insert("noReplace".into(), json!(update.no_replace));
                insert_some(&mut message, "pause", data.paused);
                messages.push(Value::Object(message));
            }
            // An encoded track with an explicit zero length is a no-op.
            Some(_) => {}
            None => {
                if track.length == Some(0) {
                    messages.push(Value::Object(op_message(
                        "destroy",
                        &update.guild_id,
                    )));
                }
                messages.push(Value::Object(op_message(
                    "stop",
                    &update.guild_id,
                )));
            }
        }
    }

    if play_sent {
        return messages;
    }

    if let Some(paused) = data.paused {
        let mut message = op_message("pause", &update.guild_id);
        message.insert("pause".into(), json!(paused));
        messages.push(Value::Object(message));
    }
    if let Some(position) = data.position.filter(|position| *position != 0) {
        let mut message = op_message("seek", &update.guild_id);
        message.insert("position".into(), json!(position));
        messages.push(Value::Object(message));
    }
    if let Some(volume) = data.volume.filter(|volume| *volume != 0) {
        let mut message = op_message("volume", &update.guild_id);
        message.insert("volume".into(), json!(volume));
        messages.push(Value::Object(message));
    }
    if let Some(Value::Object(filters)) = &data.filters {
        let mut message = op_message("filters", &update.guild_id);
        for (key, value) in filters {
            message.insert(key.clone(), value.clone());
        }
        messages.push(Value::Object(message));
    }

    messages
}

fn op_message(op: &str, guild_id: &str) -> Map<String, Value> {
    let mut message = Map::new();
    message.insert("op".to_string(), json!(op));
    message.insert("guildId".to_string(), json!(guild_id));
    message
}

/// Inserts `key` only when the value is present; v3 opcodes treat a null
/// field very differently from an absent one.
fn insert_some<T: Serialize>(
    message: &mut Map<String, Value>,
    key: &str,
    value: Option<T>,
) {
    if let Some(value) = value {
        if let Ok(value) = serde_json::to_value(value) {
            message.insert(key.to_string(), value);
        }
    }
}

fn is_player_path(path: &str) -> bool {
    path.contains("/sessions/") && path.contains("/players/")
}

// ---------------------------------------------------------------------------
// Inbound conversion
// ---------------------------------------------------------------------------

/// v3 spells track end reasons in SCREAMING_SNAKE, the canonical schema
/// in camelCase. `LOAD_FAILED` is the only two-word reason.
fn rewrite_end_reason(value: &mut Value) {
    let Some(reason) = value.get("reason").and_then(Value::as_str) else {
        return;
    };
    let rewritten = if reason == "LOAD_FAILED" {
        "loadFailed".to_string()
    } else {
        reason.to_lowercase()
    };
    value["reason"] = Value::String(rewritten);
}

/// Rebuilds a v3 `loadType` response into the canonical v4 shape.
///
/// Values without a `loadType` (info, route planner, player state) pass
/// through untouched, as do already-canonical discriminants.
fn convert_load_result(value: Value) -> Value {
    let Some(load_type) = value.get("loadType").and_then(Value::as_str)
    else {
        return value;
    };
    let tracks = value.get("tracks").and_then(Value::as_array);

    match load_type {
        "TRACK_LOADED" => match tracks.and_then(|tracks| tracks.first()) {
            Some(track) => {
                json!({ "loadType": "track", "data": build_v4_track(track) })
            }
            None => json!({ "loadType": "empty" }),
        },
        "PLAYLIST_LOADED" => {
            let tracks: Vec<Value> = tracks
                .map(|tracks| tracks.iter().map(build_v4_track).collect())
                .unwrap_or_default();
            let info = value
                .get("playlistInfo")
                .cloned()
                .unwrap_or_else(|| json!({ "name": "" }));
            json!({
                "loadType": "playlist",
                "data": { "info": info, "tracks": tracks },
            })
        }
        "SEARCH_RESULT" => {
            let tracks: Vec<Value> = tracks
                .map(|tracks| tracks.iter().map(build_v4_track).collect())
                .unwrap_or_default();
            json!({ "loadType": "search", "data": tracks })
        }
        "NO_MATCHES" => json!({ "loadType": "empty" }),
        "LOAD_FAILED" => {
            let exception =
                value.get("exception").cloned().unwrap_or(Value::Null);
            json!({ "loadType": "error", "data": exception })
        }
        _ => value,
    }
}

/// Rebuilds one v3 `track`/`info` pair as a canonical track object.
///
/// Fields v3 never had are written as explicit nulls so every dialect
/// produces the same set of keys.
fn build_v4_track(v3: &Value) -> Value {
    let info = &v3["info"];
    json!({
        "encoded": v3["track"].clone(),
        "info": {
            "title": info["title"].clone(),
            "author": info["author"].clone(),
            "length": info["length"].clone(),
            "identifier": info["identifier"].clone(),
            "isSeekable": info["isSeekable"].clone(),
            "isStream": info["isStream"].clone(),
            "uri": info["uri"].clone(),
            "artworkUrl": Value::Null,
            "isrc": Value::Null,
            "sourceName": info["sourceName"].clone(),
            "position": info["position"].clone(),
        },
    })
}

// =========================================================================
// Tests
// =========================================================================
