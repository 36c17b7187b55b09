//! Handcrafted WebSocket client transport for Hydrolink.
//!
//! Audio backends push player events over a WebSocket. This crate dials
//! that socket without a protocol library: it performs the HTTP upgrade
//! handshake itself ([`mod@handshake`]) and speaks the frame grammar
//! byte-by-byte ([`frame`]). A per-node "legacy" switch swaps the frame
//! engine for `tokio-tungstenite` while keeping the identical event
//! contract, for environments where the platform socket is preferred.
//!
//! The public surface is [`WireSocket`]: call [`WireSocket::connect`],
//! consume [`TransportEvent`]s from the returned channel, and write with
//! [`WireSocket::send`] / [`WireSocket::close`]. Connection failures are
//! events, not panics or method errors — the layer above owns retry
//! policy and needs one uniform close signal to drive it.

pub mod frame;
pub mod handshake;

mod error;
mod socket;

pub use error::TransportError;
pub use socket::{TransportEvent, WireSocket};
