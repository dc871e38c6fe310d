//! Directed, reliable, order-preserving links between nodes.

use crate::topology::Topology;
use distsys_env::{ChannelId, NodeId};
use serde::{Deserialize, Serialize};

/// A directed edge `from -> to`.
///
/// Channels hold only ids. Delivery resolves the destination mailbox
/// through the system's [`Topology`], so neither endpoint is borrowed.
/// A bidirectional link is two `Channel`s with independent ids and
/// independent FIFO ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    id: ChannelId,
    from: NodeId,
    to: NodeId,
}

impl Channel {
    /// Channels are created only by `DistributedSystem::add_channel`.
    pub(crate) fn new(id: ChannelId, from: NodeId, to: NodeId) -> Self {
        Self { id, from, to }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Pushes `(from, payload)` into the destination mailbox.
    ///
    /// No flow control and no failure mode.
    pub fn send(&self, topology: &Topology, payload: impl Into<String>) {
        match topology.mailbox(self.to) {
            Some(mailbox) => mailbox.push(self.from, payload),
            None => tracing::warn!(channel = %self.id, to = %self.to, "destination not registered"),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({} -> {})", self.id, self.from, self.to)
    }
}
