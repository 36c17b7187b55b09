//! Node lifecycle for Hydrolink.
//!
//! A *node* is one audio-processing backend: a websocket push channel
//! plus a REST endpoint, speaking whichever dialect its driver
//! implements. This crate owns everything about a node except the
//! dialect itself:
//!
//! - [`NodeConnection`]: the connect/retry state machine and the
//!   [`NodeSignal`] stream it produces
//! - [`NodeRegistry`]: name lookup and least-used load balancing
//! - [`Rest`]: the canonical REST operation catalogue
//! - [`NodeStats`]: the rolling statistics snapshot fed by `stats`
//!   messages

mod connection;
mod error;
mod registry;
mod rest;
mod stats;

pub use crate::connection::{
    ConnectState, ConnectionOptions, NodeConnection, NodeSignal,
};
pub use crate::error::NodeError;
pub use crate::registry::NodeRegistry;
pub use crate::rest::Rest;
pub use crate::stats::NodeStats;
