//! Error types for the transport layer.

/// Errors surfaced by [`crate::WireSocket`] methods.
///
/// Connection-lifetime failures (dial errors, handshake rejection, socket
/// errors mid-stream) are not returned from methods — they arrive as
/// `Error`/`Close` events on the socket's event channel, because the
/// connection outlives the call that opened it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint string is not a usable `ws://` / `wss://` URL.
    #[error("invalid websocket url: {0}")]
    InvalidUrl(String),

    /// The HTTP upgrade exchange failed or could not be parsed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// The socket is gone; no more frames can be written.
    #[error("connection closed")]
    ConnectionClosed,

    /// Writing a frame to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}
