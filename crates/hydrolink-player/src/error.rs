//! Error type for the player layer.

use hydrolink_node::NodeError;

/// Errors raised by player commands.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// A command arrived after the player was destroyed. Destroyed
    /// players accept nothing, not even a second destroy.
    #[error("player for guild `{0}` is already destroyed")]
    Destroyed(String),

    /// `play` was called with no track given and nothing queued.
    #[error("no track is available to play")]
    NothingToPlay,

    /// `seek` was called while nothing is loaded.
    #[error("player has no current track")]
    NoCurrentTrack,

    /// `seek` on a stream or other non-seekable track.
    #[error("the current track is not seekable")]
    NotSeekable,

    /// `set_volume` outside the backend's accepted range.
    #[error("volume must be at most 1000, got {0}")]
    VolumeOutOfRange(u16),

    #[error(transparent)]
    Node(#[from] NodeError),
}
