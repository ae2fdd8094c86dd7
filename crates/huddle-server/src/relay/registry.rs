//! Process-wide map from group id to live channel.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use huddle_core::GroupId;
use metrics::gauge;
use parking_lot::RwLock;
use tracing::info;

use super::channel::GroupChannel;
use crate::config::RelayOptions;
use crate::metrics::RELAY_GROUPS_ACTIVE;

/// Lazily creates one [`GroupChannel`] per group and forgets it once the
/// channel closes.
///
/// Lock order: a channel's member lock may be held while taking the
/// registry lock, never the reverse.
pub struct GroupRegistry {
    groups: RwLock<HashMap<GroupId, Arc<GroupChannel>>>,
    options: RelayOptions,
    this: Weak<Self>,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new(options: RelayOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            groups: RwLock::new(HashMap::new()),
            options,
            this: this.clone(),
        })
    }

    /// Relay tuning applied to new channels.
    pub fn options(&self) -> RelayOptions {
        self.options
    }

    /// Return the live channel for `group`, creating it on first use.
    ///
    /// Creation spawns the channel's delivery task, exactly once per
    /// channel. Must be called inside a tokio runtime.
    pub fn get_or_create(&self, group: &GroupId) -> Arc<GroupChannel> {
        if let Some(channel) = self.groups.read().get(group).cloned() {
            return channel;
        }

        let mut groups = self.groups.write();
        if let Some(channel) = groups.get(group) {
            return Arc::clone(channel);
        }

        let (channel, delivery) = GroupChannel::new(group.clone(), &self.options, self.this.clone());
        let _ = tokio::spawn(delivery.run());
        let _ = groups.insert(group.clone(), Arc::clone(&channel));
        #[allow(clippy::cast_precision_loss)]
        gauge!(RELAY_GROUPS_ACTIVE).set(groups.len() as f64);
        info!(group = %group, groups = groups.len(), "channel created");
        channel
    }

    /// Look up a live channel without creating one.
    pub fn get(&self, group: &GroupId) -> Option<Arc<GroupChannel>> {
        self.groups.read().get(group).cloned()
    }

    /// Remove `group` only if it still maps to `channel`.
    pub fn remove(&self, group: &GroupId, channel: &GroupChannel) -> bool {
        let mut groups = self.groups.write();
        let matches = groups
            .get(group)
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), channel));
        if matches {
            let _ = groups.remove(group);
            #[allow(clippy::cast_precision_loss)]
            gauge!(RELAY_GROUPS_ACTIVE).set(groups.len() as f64);
        }
        matches
    }

    /// Live groups.
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    /// Attached identities across all groups.
    pub fn connection_count(&self) -> usize {
        // Snapshot first: member locks must not be taken under the registry lock.
        let channels: Vec<Arc<GroupChannel>> = self.groups.read().values().cloned().collect();
        channels.iter().map(|c| c.member_count()).sum()
    }
}

impl std::fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.group_count())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
