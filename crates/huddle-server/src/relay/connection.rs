//! Per-connection read loop and identity state machine.
//!
//! A connection starts unidentified unless the upgrade carried a `client`
//! query parameter. The first `sender` field of a text frame, or the first
//! binary frame of at least 16 bytes, identifies it; after that the identity
//! never changes. On exit an identified connection detaches from its group
//! and an unidentified one releases the group if nobody else joined.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use huddle_core::frame::pong_reply;
use huddle_core::{BinaryFrame, ClientIdentity, GroupId, InboundFrame, TextEnvelope};
use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::channel::GroupChannel;
use super::peer::{Outbound, PeerConnection};
use super::registry::GroupRegistry;
use crate::metrics::{
    RELAY_FRAMES_RECEIVED_TOTAL, RELAY_INVALID_FRAMES_TOTAL, RELAY_PONGS_SENT_TOTAL,
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum IdentityState {
    Unidentified,
    Identified(ClientIdentity),
    Closed,
}

/// One peer's membership in one group.
pub struct ConnectionHandle {
    group: GroupId,
    registry: Arc<GroupRegistry>,
    channel: Arc<GroupChannel>,
    peer: Arc<PeerConnection>,
    state: IdentityState,
}

impl ConnectionHandle {
    /// Resolve the group's channel and attach right away when `client` is
    /// known.
    pub fn open(
        registry: Arc<GroupRegistry>,
        group: GroupId,
        client: Option<ClientIdentity>,
        peer: Arc<PeerConnection>,
    ) -> Self {
        let channel = registry.get_or_create(&group);
        let mut handle = Self {
            group,
            registry,
            channel,
            peer,
            state: IdentityState::Unidentified,
        };
        if let Some(identity) = client {
            handle.identify(identity);
        }
        handle
    }

    /// Identity, once known.
    pub fn identity(&self) -> Option<&ClientIdentity> {
        match &self.state {
            IdentityState::Identified(identity) => Some(identity),
            IdentityState::Unidentified | IdentityState::Closed => None,
        }
    }

    /// Group this connection belongs to.
    pub fn group(&self) -> &GroupId {
        &self.group
    }

    /// Channel frames are currently posted to.
    pub fn channel(&self) -> &Arc<GroupChannel> {
        &self.channel
    }

    fn identify(&mut self, identity: ClientIdentity) {
        if self.state != IdentityState::Unidentified {
            return;
        }
        // The channel may close between lookup and attach; retry on a fresh one.
        while let Err(e) = self.channel.attach(&identity, &self.peer) {
            debug!(group = %self.group, error = %e, "re-resolving channel");
            self.channel = self.registry.get_or_create(&self.group);
        }
        self.state = IdentityState::Identified(identity);
    }

    fn post(&mut self, frame: Bytes) {
        if self.channel.is_closed() {
            self.channel = self.registry.get_or_create(&self.group);
        }
        self.channel.post(frame);
    }

    /// Apply one inbound frame.
    pub async fn handle_frame(&mut self, frame: InboundFrame) {
        if self.state == IdentityState::Closed {
            return;
        }
        counter!(RELAY_FRAMES_RECEIVED_TOTAL, "kind" => frame.kind()).increment(1);
        match frame {
            InboundFrame::Text(text) => self.handle_text(text),
            InboundFrame::Binary(data) => self.handle_binary(&data).await,
        }
    }

    fn handle_text(&mut self, text: String) {
        let envelope = match TextEnvelope::parse(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!(RELAY_INVALID_FRAMES_TOTAL).increment(1);
                debug!(group = %self.group, conn_id = %self.peer.id(), error = %e, "ignoring text frame");
                return;
            }
        };

        if self.state == IdentityState::Unidentified {
            if let Some(identity) = envelope.sender_identity() {
                self.identify(identity);
            }
        }
        if let (Some(identity), Some(receiver)) = (self.identity(), envelope.receiver.as_deref()) {
            debug!(
                group = %self.group,
                client = %identity,
                receiver,
                kind = envelope.kind.as_deref().unwrap_or_default(),
                "relaying message"
            );
        }

        self.post(Bytes::from(text));
    }

    async fn handle_binary(&mut self, data: &Bytes) {
        let frame = BinaryFrame::decode(data);
        if let Some(identity) = frame.identity {
            if self.state == IdentityState::Unidentified {
                self.identify(identity);
            }
        }

        if let Some(timestamp) = frame.ping {
            self.reply_pong(timestamp).await;
        }

        self.post(frame.relay);
    }

    async fn reply_pong(&self, timestamp: f64) {
        let reply = match pong_reply(timestamp) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(conn_id = %self.peer.id(), error = %e, "failed to encode pong");
                return;
            }
        };
        match self.peer.send(Outbound::Text(reply)).await {
            Ok(()) => counter!(RELAY_PONGS_SENT_TOTAL).increment(1),
            Err(e) => debug!(conn_id = %self.peer.id(), error = %e, "failed to send pong"),
        }
    }

    /// Read frames until the peer leaves, the stream fails or a close is
    /// requested through the peer's token.
    pub async fn drive<S, E>(&mut self, mut stream: S)
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let closer = self.peer.closer().clone();
        loop {
            let msg = tokio::select! {
                () = closer.cancelled() => {
                    debug!(conn_id = %self.peer.id(), "close requested");
                    let _ = self.peer.send(Outbound::Close).await;
                    break;
                }
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    self.handle_frame(InboundFrame::Text(text.as_str().to_owned()))
                        .await;
                }
                Some(Ok(Message::Binary(data))) => {
                    self.handle_frame(InboundFrame::Binary(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(conn_id = %self.peer.id(), "peer sent close frame");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %self.peer.id(), error = %e, "read failed");
                    break;
                }
                None => break,
            }
        }
    }

    /// Leave the group. Idempotent.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, IdentityState::Closed) {
            IdentityState::Identified(identity) => {
                let _ = self.channel.detach(&identity, &self.peer);
            }
            IdentityState::Unidentified => {
                let _ = self.channel.release_if_idle();
            }
            IdentityState::Closed => {}
        }
    }
}

/// Serve one upgraded socket until it closes or the server shuts down.
#[instrument(skip_all, fields(group = %group))]
pub async fn run_connection(
    socket: WebSocket,
    registry: Arc<GroupRegistry>,
    group: GroupId,
    client: Option<ClientIdentity>,
    shutdown: CancellationToken,
) {
    let (sink, stream) = socket.split();
    let peer = Arc::new(PeerConnection::new(
        Box::new(sink),
        shutdown.child_token(),
    ));

    let started = Instant::now();
    info!(conn_id = %peer.id(), client = client.as_ref().map_or("", ClientIdentity::as_str), "peer connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let mut handle = ConnectionHandle::open(registry, group, client, Arc::clone(&peer));
    handle.drive(stream).await;
    handle.close();

    info!(conn_id = %peer.id(), "peer disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
