//! Per-system id allocation.

use distsys_env::{ChannelId, NodeId};
use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out dense, monotonically increasing node and channel ids.
///
/// Each `DistributedSystem` owns its own allocator, so independent
/// simulations in one process never share an id space.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_node: AtomicU32,
    next_channel: AtomicU32,
}

impl IdAllocator {
    /// Creates an allocator starting at zero for both id kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next node id.
    pub fn next_node(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates the next channel id.
    pub fn next_channel(&self) -> ChannelId {
        ChannelId(self.next_channel.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_independent_allocators_share_nothing() {
        let a = IdAllocator::new();
        let b = IdAllocator::new();

        assert_eq!(a.next_node(), NodeId(0));
        assert_eq!(a.next_node(), NodeId(1));
        assert_eq!(b.next_node(), NodeId(0));

        // Node and channel counters are separate
        assert_eq!(a.next_channel(), ChannelId(0));
    }

    proptest! {
        #[test]
        fn prop_ids_strictly_increase(count in 1usize..200) {
            let ids = IdAllocator::new();
            let nodes: Vec<NodeId> = (0..count).map(|_| ids.next_node()).collect();

            for pair in nodes.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            prop_assert_eq!(nodes.last().copied(), Some(NodeId(count as u32 - 1)));
        }
    }
}
