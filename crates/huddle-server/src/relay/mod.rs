//! Group relay core.
//!
//! - [`registry`]: group id to channel map
//! - [`channel`]: members, mailbox and fan-out for one group
//! - [`connection`]: per-peer read loop and identity state machine
//! - [`peer`]: write half of a peer transport

pub mod channel;
pub mod connection;
pub mod peer;
pub mod registry;

pub use channel::GroupChannel;
pub use connection::{ConnectionHandle, run_connection};
pub use peer::{FrameSink, Outbound, PeerConnection};
pub use registry::GroupRegistry;
