//! # Hydrolink
//!
//! Client for audio-processing backend nodes speaking several wire
//! dialects.
//!
//! Hydrolink connects to one or more backend nodes (Lavalink v4 or v3,
//! NodeLink v2, FrequenC), keeps those connections alive, and exposes a
//! per-guild [`Player`] surface on top of them. The host application
//! implements a single [`Gateway`] trait for its Discord library and
//! forwards two voice packets; everything else (dialect translation,
//! reconnects, queue advancement, load balancing) happens inside.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hydrolink::prelude::*;
//!
//! // Implement Gateway for your Discord library, then:
//! // let manager = Manager::new(gateway, options).await?;
//! // let player = manager
//! //     .create_player(CreatePlayerOptions::new(guild_id))
//! //     .await?;
//! // let found = manager.search("never gonna give you up", None).await?;
//! // player.play(found.tracks.into_iter().next()).await?;
//! ```

mod config;
mod error;
mod events;
mod gateway;
mod manager;
mod search;
mod voice;

pub use crate::config::{ManagerOptions, NodeDescriptor, SearchFallback};
pub use crate::error::HydrolinkError;
pub use crate::events::EventBus;
pub use crate::gateway::Gateway;
pub use crate::manager::{CreatePlayerOptions, Manager, SearchOptions};
pub use crate::search::{SearchKind, SearchResponse};

// The pieces underneath, re-exported so hosts depend on one crate.
pub use hydrolink_driver::{
    ClientIdentity, Driver, DriverError, DriverKind, NodeProfile,
};
pub use hydrolink_node::{
    ConnectState, NodeConnection, NodeError, NodeRegistry, NodeStats, Rest,
};
pub use hydrolink_player::{
    LoopMode, Player, PlayerError, PlayerLifecycle, PlayerSnapshot, TrackQueue,
};
pub use hydrolink_protocol::{
    ClientEvent, LoadException, LoadResult, Playlist, PlayerState,
    ProtocolError, Track, TrackEndReason, TrackInfo, VoiceUpdate,
};

pub mod prelude {
    pub use crate::config::{ManagerOptions, NodeDescriptor};
    pub use crate::error::HydrolinkError;
    pub use crate::gateway::Gateway;
    pub use crate::manager::{CreatePlayerOptions, Manager, SearchOptions};
    pub use crate::search::{SearchKind, SearchResponse};
    pub use hydrolink_player::{LoopMode, Player};
    pub use hydrolink_protocol::{ClientEvent, LoadResult, Track};
}
