//! Error type for the node layer.

use hydrolink_driver::DriverError;
use hydrolink_protocol::ProtocolError;

/// Errors raised by node registry and REST operations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Load balancing was asked for a node while none is connected.
    #[error("no nodes are online")]
    NoNodesOnline,

    /// The named node is not in the registry.
    #[error("node `{0}` is not registered")]
    UnknownNode(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
