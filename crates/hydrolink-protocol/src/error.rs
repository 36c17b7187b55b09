//! Error types for the protocol layer.
//!
//! Each crate in Hydrolink defines its own error enum. This keeps errors
//! specific and meaningful — when you see a `ProtocolError`, you know the
//! problem is in the data itself (JSON that does not match the canonical
//! schema, or a corrupt track blob), not in networking or player state.

/// Errors that can occur while decoding wire payloads or track blobs.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON parsed, but it does not fit the canonical shape.
    ///
    /// The inner `serde_json::Error` is the original error from serde_json.
    /// We wrap it so callers deal with `ProtocolError` uniformly regardless
    /// of which message family failed to decode.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The message is invalid at the protocol level.
    ///
    /// This is for logical errors that pass deserialization but violate
    /// schema rules — e.g. a load result with an unknown `loadType`
    /// discriminant, or a result payload of the wrong JSON type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A track blob is not valid base64.
    #[error("track blob is not valid base64: {0}")]
    TrackBase64(#[from] base64::DecodeError),

    /// A track blob ended before all required fields were read.
    ///
    /// Carries the byte offset at which the reader ran out of input.
    #[error("track blob truncated at offset {0}")]
    TrackTruncated(usize),

    /// A length-prefixed string inside a track blob is not UTF-8.
    #[error("track blob contains invalid utf-8: {0}")]
    TrackUtf8(#[from] std::string::FromUtf8Error),
}
