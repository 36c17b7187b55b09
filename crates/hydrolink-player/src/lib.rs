//! Per-guild players for Hydrolink.
//!
//! A [`Player`] is the playback surface for one guild: a queue with
//! loop modes and history, the command set (play, pause, seek, skip,
//! volume, voice) and a destroyed-state guard. Commands translate into
//! canonical player updates on the owning node; what the node pushes
//! back flows through the [`EventRouter`], which advances queues and
//! produces the client events consumers see.
//!
//! The track-end rules live in one place (`settle_track_end`) so the
//! queue-advance behavior is identical for every backend dialect.

mod error;
mod events;
mod player;
mod queue;

pub use crate::error::PlayerError;
pub use crate::events::{EventRouter, PlayerRegistry};
pub use crate::player::{Player, PlayerLifecycle, PlayerSnapshot};
pub use crate::queue::{LoopMode, TrackQueue};
