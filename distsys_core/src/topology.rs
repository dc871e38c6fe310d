//! Frozen node directory shared by every running node task.

use crate::mailbox::Mailbox;
use crate::node::NodeShared;
use distsys_env::NodeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Id-indexed view of every node's runtime state.
///
/// Built once by `DistributedSystem::run()` and shared read-only, so all
/// cross-node lookups go through the orchestrator's arena by id.
#[derive(Debug, Default)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Arc<NodeShared>>,
}

impl Topology {
    pub(crate) fn from_nodes(nodes: impl IntoIterator<Item = (NodeId, Arc<NodeShared>)>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    /// Returns the mailbox of `node`, if it exists.
    pub fn mailbox(&self, node: NodeId) -> Option<&Mailbox> {
        self.nodes.get(&node).map(|shared| shared.mailbox())
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
