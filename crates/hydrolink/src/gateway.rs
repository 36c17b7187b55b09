//! The boundary to the caller's Discord gateway client.
//!
//! Hydrolink never speaks the gateway protocol itself. It needs exactly
//! three things from whatever library the host runs: who the bot is,
//! how many shards there are, and a way to hand a raw payload to a
//! shard's send queue. Everything else (intents, reconnects, event
//! decoding) stays on the host's side of this trait.
//!
//! The reverse direction is plain method calls: when the host receives
//! a voice state update for the bot's own user or a voice server
//! update, it forwards the relevant fields to
//! [`Manager::voice_state_update`](crate::Manager::voice_state_update)
//! and
//! [`Manager::voice_server_update`](crate::Manager::voice_server_update).

use async_trait::async_trait;
use serde_json::Value;

/// Adapter over the host's gateway client.
///
/// Implementations are expected to be cheap to call; `send_packet` is
/// fire-and-forget from the library's point of view, so an adapter that
/// cannot send should log and drop rather than block.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// The bot's own user id.
    fn user_id(&self) -> String;

    /// Total shard count the bot runs with.
    fn shard_count(&self) -> u32;

    /// Queues one raw payload on the given shard.
    ///
    /// Used only for voice state packets (join and leave a voice
    /// channel); the payload is the complete gateway frame including
    /// the opcode.
    async fn send_packet(&self, shard_id: u32, payload: Value);
}
