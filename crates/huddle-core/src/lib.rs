//! # huddle-core
//!
//! Shared building blocks for the huddle group relay.
//!
//! - [`ids`]: `GroupId`, `ClientIdentity` and `ConnectionId` newtypes
//! - [`frame`]: inbound frame classification and the binary ping layout
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod frame;
pub mod ids;
pub mod logging;

pub use frame::{BinaryFrame, FrameError, InboundFrame, TextEnvelope};
pub use ids::{ClientIdentity, ConnectionId, GroupId};
