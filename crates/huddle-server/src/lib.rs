//! # huddle-server
//!
//! Axum HTTP + `WebSocket` group relay.
//!
//! - `/group/{id}` upgrades peers into a named group
//! - [`relay::registry::GroupRegistry`] lazily creates one channel per group
//!   and drops it when the last peer leaves
//! - [`relay::channel::GroupChannel`] buffers frames in a bounded mailbox and
//!   fans them out from a single delivery task
//! - Health, Prometheus metrics and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use config::{RelayOptions, ServerConfig};
pub use errors::RelayError;
pub use server::RelayServer;
