//! Player registry and the per-guild event router.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use hydrolink_protocol::{ClientEvent, PlayerEvent, PlayerState};

use crate::player::{EndDisposition, Player};

/// All live players, keyed by guild id. Cheap to clone; clones share
/// the same map.
#[derive(Clone, Default)]
pub struct PlayerRegistry {
    players: Arc<Mutex<HashMap<String, Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, player: Player) {
        self.players
            .lock()
            .await
            .insert(player.guild_id().to_string(), player);
    }

    pub async fn remove(&self, guild_id: &str) -> Option<Player> {
        self.players.lock().await.remove(guild_id)
    }

    pub async fn get(&self, guild_id: &str) -> Option<Player> {
        self.players.lock().await.get(guild_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.players.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.players.lock().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Player> {
        self.players.lock().await.values().cloned().collect()
    }
}

/// Routes backend player events to the owning player and turns them into
/// client events.
///
/// Routing mutates player state first (queue advancement, halt marks,
/// position) and only then reports; the events a call returns are ready
/// to publish in order.
#[derive(Clone)]
pub struct EventRouter {
    players: PlayerRegistry,
}

impl EventRouter {
    pub fn new(players: PlayerRegistry) -> Self {
        Self { players }
    }

    /// Handles one per-guild event from a node.
    pub async fn route(&self, event: PlayerEvent) -> Vec<ClientEvent> {
        let guild_id = event.guild_id().to_string();
        let Some(player) = self.players.get(&guild_id).await else {
            tracing::debug!(%guild_id, "event for unknown player, dropping");
            return Vec::new();
        };

        match event {
            PlayerEvent::TrackStart { track, .. } => {
                // v3-era dialects may not carry the track; fall back to
                // what the player believes it loaded.
                let loaded = player.mark_started().await;
                match track.or(loaded) {
                    Some(track) => {
                        vec![ClientEvent::TrackStart { guild_id, track }]
                    }
                    None => {
                        tracing::debug!(
                            %guild_id,
                            "track start without a known track"
                        );
                        Vec::new()
                    }
                }
            }

            PlayerEvent::TrackEnd { reason, .. } => {
                match player.finish_current(reason).await {
                    EndDisposition::Discard => Vec::new(),
                    EndDisposition::Settle(events) => events,
                    EndDisposition::Continue(events) => {
                        if let Err(error) = player.play(None).await {
                            tracing::warn!(
                                %guild_id,
                                %error,
                                "failed to advance the queue"
                            );
                        }
                        events
                    }
                }
            }

            PlayerEvent::TrackException {
                track, exception, ..
            } => {
                player.halt().await;
                vec![ClientEvent::TrackException {
                    guild_id,
                    track,
                    exception,
                }]
            }

            PlayerEvent::TrackStuck {
                track,
                threshold_ms,
                ..
            } => {
                player.halt().await;
                vec![ClientEvent::TrackStuck {
                    guild_id,
                    track,
                    threshold_ms,
                }]
            }

            PlayerEvent::WebSocketClosed {
                code,
                reason,
                by_remote,
                ..
            } => {
                player.halt().await;
                vec![ClientEvent::PlayerWebsocketClosed {
                    guild_id,
                    code,
                    reason,
                    by_remote,
                }]
            }
        }
    }

    /// Handles one position report from a node.
    pub async fn position_update(
        &self,
        guild_id: &str,
        state: PlayerState,
    ) -> Vec<ClientEvent> {
        let Some(player) = self.players.get(guild_id).await else {
            return Vec::new();
        };
        player.set_position(state.position).await;
        vec![ClientEvent::PlayerUpdate {
            guild_id: guild_id.to_string(),
            state,
        }]
    }
}
