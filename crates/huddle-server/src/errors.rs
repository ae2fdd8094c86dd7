//! Relay error types.
//!
//! None of these are fatal to the process: each one ends at most the
//! connection or group it was raised for.

use huddle_core::GroupId;
use thiserror::Error;

/// Errors raised by the relay core.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The group channel already shut down; resolve a fresh one from the
    /// registry and retry.
    #[error("group channel {group} is closed")]
    ChannelClosed {
        /// Group whose channel closed.
        group: GroupId,
    },

    /// Reading from or writing to a peer transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// The peer transport is gone.
    #[error("connection closed")]
    ConnectionClosed,
}
