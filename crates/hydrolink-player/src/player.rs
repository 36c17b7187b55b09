//! One guild's player: playback commands and the track-end rules.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use hydrolink_node::NodeConnection;
use hydrolink_protocol::{
    ClientEvent, Track, TrackEndReason, UpdatePlayer, UpdateTrack,
    VoiceUpdate,
};

use crate::error::PlayerError;
use crate::queue::{LoopMode, TrackQueue};

/// Lifecycle of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerLifecycle {
    /// Live and accepting commands.
    Connected,
    /// Voice dropped; playback is paused but the player survives.
    Disconnected,
    /// Torn down. Nothing is accepted any more, not even a re-destroy.
    Destroyed,
}

/// Point-in-time copy of a player's externally visible state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub playing: bool,
    pub paused: bool,
    pub position_ms: u64,
    pub volume: u16,
    pub loop_mode: LoopMode,
    pub lifecycle: PlayerLifecycle,
    pub queue: TrackQueue,
}

/// Mutable playback state, everything behind one lock.
#[derive(Debug)]
pub(crate) struct PlayerInner {
    pub(crate) queue: TrackQueue,
    pub(crate) playing: bool,
    pub(crate) paused: bool,
    pub(crate) position_ms: u64,
    pub(crate) volume: u16,
    pub(crate) loop_mode: LoopMode,
    pub(crate) lifecycle: PlayerLifecycle,
    /// One-shot flag set by caller-initiated stops; the next track-end
    /// consumes it instead of reporting an empty queue.
    pub(crate) suppress_empty: bool,
}

impl PlayerInner {
    fn new(volume: u16) -> Self {
        Self {
            queue: TrackQueue::new(),
            playing: false,
            paused: false,
            position_ms: 0,
            volume,
            loop_mode: LoopMode::None,
            lifecycle: PlayerLifecycle::Connected,
            suppress_empty: false,
        }
    }
}

struct PlayerShared {
    guild_id: String,
    voice_channel_id: Option<String>,
    /// Gateway shard that owns this guild, for voice packet routing.
    shard_id: u32,
    node: NodeConnection,
    state: Mutex<PlayerInner>,
}

/// Handle to one guild's player.
///
/// Cheap to clone; every clone observes the same state. Commands go out
/// as canonical player updates through the owning node's driver.
#[derive(Clone)]
pub struct Player {
    shared: Arc<PlayerShared>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.shared.guild_id)
            .field("voice_channel_id", &self.shared.voice_channel_id)
            .field("shard_id", &self.shared.shard_id)
            .finish_non_exhaustive()
    }
}

impl Player {
    pub fn new(
        guild_id: impl Into<String>,
        voice_channel_id: Option<String>,
        shard_id: u32,
        node: NodeConnection,
        volume: u16,
    ) -> Self {
        Self {
            shared: Arc::new(PlayerShared {
                guild_id: guild_id.into(),
                voice_channel_id,
                shard_id,
                node,
                state: Mutex::new(PlayerInner::new(volume)),
            }),
        }
    }

    pub fn guild_id(&self) -> &str {
        &self.shared.guild_id
    }

    pub fn voice_channel_id(&self) -> Option<&str> {
        self.shared.voice_channel_id.as_deref()
    }

    pub fn shard_id(&self) -> u32 {
        self.shared.shard_id
    }

    /// The node this player lives on.
    pub fn node(&self) -> &NodeConnection {
        &self.shared.node
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let state = self.shared.state.lock().await;
        PlayerSnapshot {
            playing: state.playing,
            paused: state.paused,
            position_ms: state.position_ms,
            volume: state.volume,
            loop_mode: state.loop_mode,
            lifecycle: state.lifecycle,
            queue: state.queue.clone(),
        }
    }

    /// Locks the state, rejecting the command when the player is
    /// destroyed.
    async fn lock_live(
        &self,
    ) -> Result<MutexGuard<'_, PlayerInner>, PlayerError> {
        let state = self.shared.state.lock().await;
        if state.lifecycle == PlayerLifecycle::Destroyed {
            return Err(PlayerError::Destroyed(self.guild_id().to_string()));
        }
        Ok(state)
    }

    async fn send(&self, update: UpdatePlayer) -> Result<(), PlayerError> {
        self.shared.node.rest().update_player(&update).await?;
        Ok(())
    }

    async fn send_stop(&self) -> Result<(), PlayerError> {
        let mut update = UpdatePlayer::new(self.guild_id());
        // An explicit null track tells the backend to stop playback.
        update.data.track = Some(UpdateTrack {
            encoded: None,
            length: None,
            user_data: None,
        });
        self.send(update).await
    }

    // -- Commands ---

    /// Appends a track to the pending queue without touching playback.
    pub async fn enqueue(&self, track: Track) -> Result<(), PlayerError> {
        self.lock_live().await?.queue.push(track);
        Ok(())
    }

    /// Starts playback.
    ///
    /// With a track given, the currently loaded one (if any) moves back
    /// to the front of the queue. Without one, the current track keeps
    /// playing or the next queued track is loaded.
    pub async fn play(&self, track: Option<Track>) -> Result<(), PlayerError> {
        let encoded = {
            let mut state = self.lock_live().await?;
            if track.is_none() && state.queue.total_size() == 0 {
                return Err(PlayerError::NothingToPlay);
            }
            if let Some(track) = track {
                if let Some(current) = state.queue.current.take() {
                    state.queue.push_front(current);
                }
                state.queue.current = Some(track);
            } else if state.queue.current.is_none() {
                state.queue.current = state.queue.pop_front();
            }
            let Some(current) = &state.queue.current else {
                return Err(PlayerError::NothingToPlay);
            };
            let encoded = current.encoded.clone();
            state.playing = true;
            state.paused = false;
            encoded
        };

        tracing::debug!(guild_id = %self.guild_id(), "starting playback");
        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.track = Some(UpdateTrack {
            encoded: Some(encoded),
            length: None,
            user_data: None,
        });
        self.send(update).await
    }

    /// Pauses playback. Already paused is a no-op without wire traffic.
    pub async fn pause(&self) -> Result<(), PlayerError> {
        {
            let state = self.lock_live().await?;
            if state.paused {
                return Ok(());
            }
        }
        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.paused = Some(true);
        self.send(update).await?;
        self.shared.state.lock().await.paused = true;
        Ok(())
    }

    /// Resumes playback. Not paused is a no-op without wire traffic.
    pub async fn resume(&self) -> Result<(), PlayerError> {
        {
            let state = self.lock_live().await?;
            if !state.paused {
                return Ok(());
            }
        }
        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.paused = Some(false);
        self.send(update).await?;
        self.shared.state.lock().await.paused = false;
        Ok(())
    }

    /// Stops the current track. The backend answers with a track-end
    /// event and the router advances the queue from there.
    pub async fn skip(&self) -> Result<(), PlayerError> {
        self.lock_live().await?;
        self.send_stop().await
    }

    /// Stops the current track without an empty-queue report: the
    /// resulting track-end consumes the notification.
    pub async fn stop_track(&self) -> Result<(), PlayerError> {
        self.lock_live().await?.suppress_empty = true;
        self.send_stop().await
    }

    /// Seeks within the current track. The position is clamped to the
    /// track length; streams and other non-seekable tracks are rejected.
    pub async fn seek(&self, position_ms: u64) -> Result<(), PlayerError> {
        let clamped = {
            let state = self.lock_live().await?;
            let Some(current) = &state.queue.current else {
                return Err(PlayerError::NoCurrentTrack);
            };
            if !current.info.is_seekable {
                return Err(PlayerError::NotSeekable);
            }
            position_ms.min(current.info.duration_ms)
        };

        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.position = Some(clamped);
        self.send(update).await?;

        let mut state = self.shared.state.lock().await;
        state.position_ms = clamped;
        if let Some(current) = &mut state.queue.current {
            current.info.position_ms = clamped;
        }
        Ok(())
    }

    /// Sets the playback volume (`0..=1000`, where 100 is unchanged).
    pub async fn set_volume(&self, volume: u16) -> Result<(), PlayerError> {
        if volume > 1000 {
            return Err(PlayerError::VolumeOutOfRange(volume));
        }
        self.lock_live().await?;
        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.volume = Some(volume);
        self.send(update).await?;
        self.shared.state.lock().await.volume = volume;
        Ok(())
    }

    pub async fn set_loop(&self, mode: LoopMode) -> Result<(), PlayerError> {
        self.lock_live().await?.loop_mode = mode;
        Ok(())
    }

    /// Replays the most recent history entry, if there is one. The
    /// interrupted current track moves back to the front of the queue.
    pub async fn previous(&self) -> Result<(), PlayerError> {
        let track = self.lock_live().await?.queue.pop_history();
        match track {
            Some(track) => self.play(Some(track)).await,
            None => Ok(()),
        }
    }

    /// Forwards Discord voice credentials so the backend can join the
    /// guild's voice server.
    pub async fn update_voice(
        &self,
        voice: VoiceUpdate,
    ) -> Result<(), PlayerError> {
        self.lock_live().await?;
        let mut update = UpdatePlayer::new(self.guild_id());
        update.data.voice = Some(voice);
        self.send(update).await
    }

    /// Pauses playback and marks the player disconnected from voice.
    pub async fn disconnect(&self) -> Result<(), PlayerError> {
        self.pause().await?;
        self.lock_live().await?.lifecycle = PlayerLifecycle::Disconnected;
        Ok(())
    }

    /// Tears the player down on the backend.
    ///
    /// The destroyed mark is set before the backend call so the
    /// teardown's own track-end event is already discarded when it
    /// arrives.
    pub async fn destroy(&self) -> Result<(), PlayerError> {
        {
            let mut state = self.lock_live().await?;
            state.suppress_empty = true;
            state.lifecycle = PlayerLifecycle::Destroyed;
            state.playing = false;
        }
        tracing::debug!(guild_id = %self.guild_id(), "destroying player");
        self.shared
            .node
            .rest()
            .destroy_player(self.guild_id())
            .await?;
        Ok(())
    }

    // -- Event router hooks ---

    /// A track started on the backend: mark playing and hand back the
    /// track to announce.
    pub(crate) async fn mark_started(&self) -> Option<Track> {
        let mut state = self.shared.state.lock().await;
        state.playing = true;
        state.paused = false;
        state.queue.current.clone()
    }

    /// Playback halted abnormally (exception, stuck, voice loss).
    pub(crate) async fn halt(&self) {
        let mut state = self.shared.state.lock().await;
        state.playing = false;
        state.paused = true;
    }

    pub(crate) async fn set_position(&self, position_ms: u64) {
        self.shared.state.lock().await.position_ms = position_ms;
    }

    pub(crate) async fn finish_current(
        &self,
        reason: TrackEndReason,
    ) -> EndDisposition {
        let mut state = self.shared.state.lock().await;
        settle_track_end(&mut state, self.guild_id(), reason)
    }
}

// ---------------------------------------------------------------------------
// Track-end rules
// ---------------------------------------------------------------------------

/// What the router should do after a track-end settles.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EndDisposition {
    /// Destroyed player: nothing but a diagnostic.
    Discard,
    /// Publish these events; playback does not continue by itself.
    Settle(Vec<ClientEvent>),
    /// Publish these events, then start the next queued track.
    Continue(Vec<ClientEvent>),
}

/// Applies one track-end to the queue and decides what follows.
///
/// The order of checks encodes backend quirks:
/// - destroyed players discard the event outright (teardown produces a
///   stray `stopped` end, and reprocessing it would double-emit)
/// - `replaced` reports the end but must not advance, the replacement
///   is already playing
/// - `loadFailed`/`cleanup` skip the loop-mode re-insertion so a broken
///   track cannot loop forever
pub(crate) fn settle_track_end(
    state: &mut PlayerInner,
    guild_id: &str,
    reason: TrackEndReason,
) -> EndDisposition {
    if state.lifecycle == PlayerLifecycle::Destroyed {
        tracing::debug!(
            %guild_id,
            "track end for a destroyed player, discarding"
        );
        return EndDisposition::Discard;
    }

    state.playing = false;
    state.paused = true;
    let suppressed = std::mem::take(&mut state.suppress_empty);

    if reason == TrackEndReason::Replaced {
        return EndDisposition::Settle(vec![ClientEvent::TrackEnd {
            guild_id: guild_id.to_string(),
            track: state.queue.current.clone(),
        }]);
    }

    if matches!(
        reason,
        TrackEndReason::LoadFailed | TrackEndReason::Cleanup
    ) {
        if let Some(track) = state.queue.current.take() {
            state.queue.remember(track);
        }
        if !state.queue.is_empty() {
            // Advance silently; the next track announces itself.
            return EndDisposition::Continue(Vec::new());
        }
        if suppressed {
            return EndDisposition::Settle(Vec::new());
        }
        return EndDisposition::Settle(vec![ClientEvent::QueueEmpty {
            guild_id: guild_id.to_string(),
        }]);
    }

    // Natural finishes, stops and unknown reasons all share this path.
    if let Some(current) = state.queue.current.clone() {
        match state.loop_mode {
            LoopMode::Song => state.queue.push_front(current),
            LoopMode::Queue => state.queue.push(current),
            LoopMode::None => {}
        }
    }
    let ended = state.queue.current.take();
    if let Some(track) = ended.clone() {
        state.queue.remember(track);
    }

    if !state.queue.is_empty() {
        return EndDisposition::Continue(vec![ClientEvent::TrackEnd {
            guild_id: guild_id.to_string(),
            track: ended,
        }]);
    }
    if suppressed {
        return EndDisposition::Settle(Vec::new());
    }
    EndDisposition::Settle(vec![ClientEvent::QueueEmpty {
        guild_id: guild_id.to_string(),
    }])
}

// =========================================================================
// Tests
// =========================================================================
