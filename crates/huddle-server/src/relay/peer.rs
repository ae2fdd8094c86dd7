//! Write half of one peer's transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::SinkExt;
use futures::stream::SplitSink;
use huddle_core::ConnectionId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::RelayError;

/// A frame written to a peer.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// Direct reply, e.g. a PONG.
    Text(String),
    /// Group broadcast payload.
    Binary(Bytes),
    /// Close handshake.
    Close,
}

/// Anything a peer's frames can be written to.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send_frame(&mut self, frame: Outbound) -> Result<(), RelayError>;
}

#[async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_frame(&mut self, frame: Outbound) -> Result<(), RelayError> {
        let msg = match frame {
            Outbound::Text(text) => Message::Text(text.into()),
            Outbound::Binary(data) => Message::Binary(data),
            Outbound::Close => Message::Close(None),
        };
        self.send(msg).await.map_err(RelayError::Transport)
    }
}

/// One live peer as seen by its group.
///
/// Owned by the connection task; the group channel holds an `Arc` for
/// fan-out only. Writes serialize on an async mutex so a direct reply never
/// interleaves with a broadcast.
pub struct PeerConnection {
    id: ConnectionId,
    sink: Mutex<Box<dyn FrameSink>>,
    closer: CancellationToken,
    connected_at: Instant,
}

impl PeerConnection {
    /// Wrap a sink. Cancelling `closer` asks the connection task to hang up.
    pub fn new(sink: Box<dyn FrameSink>, closer: CancellationToken) -> Self {
        Self {
            id: ConnectionId::new(),
            sink: Mutex::new(sink),
            closer,
            connected_at: Instant::now(),
        }
    }

    /// Process-unique connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Write one frame to the peer.
    pub async fn send(&self, frame: Outbound) -> Result<(), RelayError> {
        self.sink.lock().await.send_frame(frame).await
    }

    /// Ask the owning connection task to close the transport.
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// Whether a close was requested (by supersession or shutdown).
    pub fn is_closing(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Token the connection task watches for close requests.
    pub fn closer(&self) -> &CancellationToken {
        &self.closer
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}
