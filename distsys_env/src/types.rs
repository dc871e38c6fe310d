//! Common types for the distsys environment abstraction.

use serde::{Deserialize, Serialize};

/// Unique identifier for a simulated node.
///
/// Ids are allocated densely by the owning `DistributedSystem`, starting
/// at zero, and are never reused within one system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Returns the raw id value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Unique identifier for a directed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Returns the raw id value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A single mailbox entry: who sent it and what they sent.
///
/// The payload is opaque to the runtime. Protocol meaning (control
/// markers vs. application data) is a convention of the behavior code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// The sending node
    pub from: NodeId,

    /// Uninterpreted payload
    pub payload: String,
}

impl Message {
    /// Creates a new message.
    pub fn new(from: NodeId, payload: impl Into<String>) -> Self {
        Self {
            from,
            payload: payload.into(),
        }
    }

    /// Returns true if the payload equals `text`.
    pub fn is(&self, text: &str) -> bool {
        self.payload == text
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Msg(from={}, msg={})", self.from.0, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_order_by_value() {
        assert!(NodeId(1) < NodeId(2));
        assert!(ChannelId(0) < ChannelId(7));
        assert_eq!(NodeId(3).as_u32(), 3);
    }

    #[test]
    fn test_message_display_matches_report_format() {
        let msg = Message::new(NodeId(1), "m2");
        assert_eq!(msg.to_string(), "Msg(from=1, msg=m2)");
        assert!(msg.is("m2"));
        assert!(!msg.is("m1"));
    }
}
