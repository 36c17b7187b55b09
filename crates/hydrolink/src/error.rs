//! Unified error type for the Hydrolink facade.

use hydrolink_driver::DriverError;
use hydrolink_node::NodeError;
use hydrolink_player::PlayerError;
use hydrolink_protocol::ProtocolError;
use hydrolink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hydrolink` facade, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HydrolinkError {
    /// A websocket-level error (handshake, frame codec, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A schema-level error (decode, casing, track blob).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A dialect-translation or HTTP error from a driver.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A node lifecycle or registry error.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// A per-guild player error.
    #[error(transparent)]
    Player(#[from] PlayerError),

    /// `create_player` for a guild that already has one.
    #[error("a player already exists for guild `{0}`")]
    PlayerAlreadyExists(String),

    /// A player command for a guild without a player.
    #[error("no player exists for guild `{0}`")]
    PlayerNotFound(String),
}
