//! Voice credential pairing.
//!
//! Joining voice is a three-way dance: we ask the gateway to join a
//! channel (op 4), Discord answers with a voice *state* update (session
//! id) and a voice *server* update (token and endpoint), in either
//! order, and only the combination of both can be forwarded to the
//! backend node. [`PendingVoice`] accumulates the halves per guild.

use serde_json::{Value, json};

use hydrolink_protocol::VoiceUpdate;

/// Accumulated voice credentials for one guild.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingVoice {
    pub(crate) session_id: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) endpoint: Option<String>,
}

impl PendingVoice {
    /// The full credential set, once every part has arrived.
    pub(crate) fn complete(&self) -> Option<VoiceUpdate> {
        Some(VoiceUpdate {
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
            session_id: self.session_id.clone()?,
        })
    }
}

/// Gateway frame asking Discord to move the bot into a voice channel.
pub(crate) fn join_packet(
    guild_id: &str,
    channel_id: &str,
    self_deaf: bool,
    self_mute: bool,
) -> Value {
    json!({
        "op": 4,
        "d": {
            "guild_id": guild_id,
            "channel_id": channel_id,
            "self_deaf": self_deaf,
            "self_mute": self_mute,
        }
    })
}

/// Gateway frame asking Discord to drop the bot out of voice.
pub(crate) fn leave_packet(guild_id: &str) -> Value {
    json!({
        "op": 4,
        "d": {
            "guild_id": guild_id,
            "channel_id": Value::Null,
            "self_deaf": false,
            "self_mute": false,
        }
    })
}
