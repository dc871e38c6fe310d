//! Error types for the distsys runtime.

use crate::system::SystemState;
use distsys_env::NodeId;
use thiserror::Error;

/// Errors surfaced to the orchestrator caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Channel {from} -> {to} already exists")]
    DuplicateChannel { from: NodeId, to: NodeId },

    /// Wiring was attempted after the system left `Idle`.
    #[error("Invalid topology mutation: {op} while {state}")]
    InvalidTopologyMutation { op: &'static str, state: SystemState },

    /// A lifecycle call was made from a state that does not allow it.
    #[error("Invalid transition: {op} while {state}")]
    InvalidTransition { op: &'static str, state: SystemState },
}

/// Fatal protocol errors raised by node behaviors.
///
/// Returning one of these from a behavior terminates that node's task only;
/// the orchestrator reports it as [`crate::TaskOutcome::Violated`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// A second control marker arrived on an already closed channel.
    #[error("{node}: duplicate marker on channel from {from}")]
    DuplicateMarker { node: NodeId, from: NodeId },

    /// A marker arrived from a peer with no incoming channel to this node.
    #[error("{node}: marker from {from} without an incoming channel")]
    UnknownChannel { node: NodeId, from: NodeId },

    /// The node's state machine reached a branch that cannot occur.
    #[error("{node}: unreachable state {state}")]
    UnreachableState { node: NodeId, state: String },

    /// Local state was recorded twice.
    #[error("{node}: local state already recorded")]
    AlreadyRecorded { node: NodeId },
}

impl ProtocolViolation {
    /// Creates an unreachable-state violation.
    pub fn unreachable(node: NodeId, state: impl std::fmt::Display) -> Self {
        Self::UnreachableState {
            node,
            state: state.to_string(),
        }
    }

    /// Returns the node that raised the violation.
    pub fn node(&self) -> NodeId {
        match self {
            Self::DuplicateMarker { node, .. }
            | Self::UnknownChannel { node, .. }
            | Self::UnreachableState { node, .. }
            | Self::AlreadyRecorded { node } => *node,
        }
    }
}
