//! Error type for the driver layer.

use hydrolink_protocol::ProtocolError;
use hydrolink_transport::TransportError;

/// Errors raised while talking to a backend node through a driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A session-scoped REST call was made before the backend issued a
    /// session id. The session id arrives in the `ready` message, so this
    /// means the node has not finished connecting yet.
    #[error("session id not ready; wait for the node to finish connecting")]
    SessionNotReady,

    /// A player update could not be serialized into its wire form.
    #[error("invalid player update payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
