//! Per-group member map, bounded mailbox and fan-out.
//!
//! Each channel owns one delivery task. Readers post into the mailbox
//! without blocking; the delivery task drains it and writes every frame to
//! a snapshot of the members taken at dequeue time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use huddle_core::{ClientIdentity, GroupId};
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::peer::{Outbound, PeerConnection};
use super::registry::GroupRegistry;
use crate::config::RelayOptions;
use crate::errors::RelayError;
use crate::metrics::{
    RELAY_DELIVERY_FAILURES_TOTAL, RELAY_FRAMES_POSTED_TOTAL, RELAY_MAILBOX_DROPS_TOTAL,
    RELAY_SUPERSEDED_TOTAL,
};

struct Members {
    peers: HashMap<ClientIdentity, Arc<PeerConnection>>,
    closed: bool,
}

/// One live group.
pub struct GroupChannel {
    id: GroupId,
    members: RwLock<Members>,
    mailbox: mpsc::Sender<Bytes>,
    stop: CancellationToken,
    registry: Weak<GroupRegistry>,
    close_superseded: bool,
    dropped: AtomicU64,
}

impl GroupChannel {
    /// Build a channel and the delivery task that serves it.
    ///
    /// The caller spawns the task. `registry` is where the channel removes
    /// itself once its last member leaves.
    pub fn new(
        id: GroupId,
        options: &RelayOptions,
        registry: Weak<GroupRegistry>,
    ) -> (Arc<Self>, DeliveryTask) {
        let (tx, rx) = mpsc::channel(options.mailbox_capacity.max(1));
        let stop = CancellationToken::new();
        let channel = Arc::new(Self {
            id: id.clone(),
            members: RwLock::new(Members {
                peers: HashMap::new(),
                closed: false,
            }),
            mailbox: tx,
            stop: stop.clone(),
            registry,
            close_superseded: options.close_superseded,
            dropped: AtomicU64::new(0),
        });
        let task = DeliveryTask {
            group: id,
            channel: Arc::downgrade(&channel),
            mailbox: rx,
            stop,
        };
        (channel, task)
    }

    /// Group this channel serves.
    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Map `identity` to `peer`, replacing any previous mapping.
    ///
    /// Returns the superseded connection, if another one held the identity.
    /// Fails with [`RelayError::ChannelClosed`] once the channel has shut
    /// down; resolve a fresh channel from the registry and retry.
    pub fn attach(
        &self,
        identity: &ClientIdentity,
        peer: &Arc<PeerConnection>,
    ) -> Result<Option<Arc<PeerConnection>>, RelayError> {
        let (previous, members) = {
            let mut members = self.members.write();
            if members.closed {
                return Err(RelayError::ChannelClosed {
                    group: self.id.clone(),
                });
            }
            let previous = members.peers.insert(identity.clone(), Arc::clone(peer));
            (previous, members.peers.len())
        };

        let superseded = previous.filter(|prev| prev.id() != peer.id());
        match &superseded {
            Some(prev) => {
                counter!(RELAY_SUPERSEDED_TOTAL).increment(1);
                info!(
                    group = %self.id,
                    client = %identity,
                    conn_id = %peer.id(),
                    superseded = %prev.id(),
                    members,
                    "identity taken over by new connection"
                );
                if self.close_superseded {
                    prev.close();
                }
            }
            None => {
                info!(group = %self.id, client = %identity, conn_id = %peer.id(), members, "client joined");
            }
        }
        Ok(superseded)
    }

    /// Remove `identity` if it still maps to `peer`.
    ///
    /// A superseded connection leaving never evicts its replacement. Closes
    /// the channel when no members remain. Returns whether an entry was
    /// removed.
    pub fn detach(&self, identity: &ClientIdentity, peer: &PeerConnection) -> bool {
        let mut members = self.members.write();
        let owned = members
            .peers
            .get(identity)
            .is_some_and(|current| current.id() == peer.id());
        if owned {
            let _ = members.peers.remove(identity);
            info!(
                group = %self.id,
                client = %identity,
                conn_id = %peer.id(),
                members = members.peers.len(),
                "client left"
            );
        }
        let _ = self.close_if_empty(&mut members);
        owned
    }

    /// Close the channel if nobody is attached.
    ///
    /// Used when a connection that never identified goes away.
    pub fn release_if_idle(&self) -> bool {
        let mut members = self.members.write();
        self.close_if_empty(&mut members)
    }

    // Runs under the member write lock so a racing attach either lands
    // first or sees `closed`.
    fn close_if_empty(&self, members: &mut Members) -> bool {
        if members.closed || !members.peers.is_empty() {
            return false;
        }
        members.closed = true;
        self.stop.cancel();
        if let Some(registry) = self.registry.upgrade() {
            let _ = registry.remove(&self.id, self);
        }
        info!(group = %self.id, "channel closed (no clients)");
        true
    }

    /// Whether the channel has shut down.
    pub fn is_closed(&self) -> bool {
        self.members.read().closed
    }

    /// Attached identities.
    pub fn member_count(&self) -> usize {
        self.members.read().peers.len()
    }

    /// Frames dropped because the mailbox was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a frame for fan-out without waiting.
    ///
    /// A full mailbox drops the newest frame.
    pub fn post(&self, frame: Bytes) {
        match self.mailbox.try_send(frame) {
            Ok(()) => counter!(RELAY_FRAMES_POSTED_TOTAL).increment(1),
            Err(TrySendError::Full(frame)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(RELAY_MAILBOX_DROPS_TOTAL).increment(1);
                warn!(group = %self.id, bytes = frame.len(), "mailbox full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(group = %self.id, "channel closed, dropping frame");
            }
        }
    }

    async fn deliver(&self, frame: Bytes) {
        let targets: Vec<(ClientIdentity, Arc<PeerConnection>)> = self
            .members
            .read()
            .peers
            .iter()
            .map(|(identity, peer)| (identity.clone(), Arc::clone(peer)))
            .collect();

        for (identity, peer) in targets {
            if let Err(e) = peer.send(Outbound::Binary(frame.clone())).await {
                counter!(RELAY_DELIVERY_FAILURES_TOTAL).increment(1);
                warn!(
                    group = %self.id,
                    client = %identity,
                    conn_id = %peer.id(),
                    error = %e,
                    "failed to deliver frame"
                );
            }
        }
    }
}

impl std::fmt::Debug for GroupChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupChannel")
            .field("id", &self.id)
            .field("members", &self.member_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Drains one channel's mailbox.
pub struct DeliveryTask {
    group: GroupId,
    channel: Weak<GroupChannel>,
    mailbox: mpsc::Receiver<Bytes>,
    stop: CancellationToken,
}

impl DeliveryTask {
    /// Deliver frames in FIFO order until the channel closes or is dropped.
    pub async fn run(mut self) {
        debug!(group = %self.group, "delivery task started");
        loop {
            let frame = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                frame = self.mailbox.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let Some(channel) = self.channel.upgrade() else {
                break;
            };
            channel.deliver(frame).await;
        }
        debug!(group = %self.group, "delivery task stopped");
    }
}
