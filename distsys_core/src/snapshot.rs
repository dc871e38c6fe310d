//! Chandy-Lamport snapshot bookkeeping.
//!
//! [`SnapshotRecorder`] is the per-node recording state machine: when the
//! local state was recorded, which incoming channels are closed, and which
//! in-flight messages belong to the cut. It knows nothing about timing or
//! roles; [`crate::chandy_lamport::SnapshotProcess`] drives it.

use crate::error::ProtocolViolation;
use crate::node::NodeHandle;

use distsys_env::{Message, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Control marker payload flooded along every outgoing channel.
pub const MARKER: &str = "ctrl_snapshot";

/// Node colors. Which subset a node uses depends on its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Grey,
    DarkGrey,
    Black,
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Color::White => "white",
            Color::Grey => "grey",
            Color::DarkGrey => "dark grey",
            Color::Black => "black",
        };
        write!(f, "{}", name)
    }
}

/// Per-node recording state.
#[derive(Debug, Clone)]
pub struct SnapshotRecorder {
    /// Owning node
    node: NodeId,

    /// Color recorded as the local snapshot state
    recorded: Option<Color>,

    /// Incoming channels (by source) still being recorded
    open: BTreeSet<NodeId>,

    /// Incoming channels (by source) whose marker has arrived
    closed: BTreeSet<NodeId>,

    /// Messages recorded as in transit, in arrival order
    in_transit: Vec<Message>,

    /// Application messages consumed before the recording point
    received_before: Vec<Message>,
}

impl SnapshotRecorder {
    /// Creates a recorder for `node` with the given incoming channel sources.
    pub fn new(node: NodeId, incoming: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            node,
            recorded: None,
            open: incoming.into_iter().collect(),
            closed: BTreeSet::new(),
            in_transit: Vec::new(),
            received_before: Vec::new(),
        }
    }

    /// Creates a recorder for the node behind `handle`.
    pub fn for_node(handle: &NodeHandle) -> Self {
        Self::new(handle.id(), handle.in_channels().map(|ch| ch.from()))
    }

    /// Records the local state.
    pub fn record_local(&mut self, state: Color) -> Result<(), ProtocolViolation> {
        if self.recorded.is_some() {
            return Err(ProtocolViolation::AlreadyRecorded { node: self.node });
        }
        self.recorded = Some(state);
        Ok(())
    }

    pub fn has_recorded(&self) -> bool {
        self.recorded.is_some()
    }

    pub fn recorded_state(&self) -> Option<Color> {
        self.recorded
    }

    /// True if the node has no incoming channels at all.
    pub fn is_isolated(&self) -> bool {
        self.open.is_empty() && self.closed.is_empty()
    }

    /// Handles a marker arriving on the channel from `from`.
    ///
    /// Closes that channel. If the local state was not recorded yet, records
    /// `current` and returns `true`: the caller must flood the marker now.
    pub fn on_marker(&mut self, from: NodeId, current: Color) -> Result<bool, ProtocolViolation> {
        if self.closed.contains(&from) {
            return Err(ProtocolViolation::DuplicateMarker { node: self.node, from });
        }
        if !self.open.remove(&from) {
            return Err(ProtocolViolation::UnknownChannel { node: self.node, from });
        }
        self.closed.insert(from);

        if self.recorded.is_none() {
            self.recorded = Some(current);
            return Ok(true);
        }
        Ok(false)
    }

    /// Handles an application message. Returns `true` if it was recorded as in transit.
    pub fn on_message(&mut self, msg: Message) -> bool {
        if self.recorded.is_none() {
            self.received_before.push(msg);
            return false;
        }
        if self.open.contains(&msg.from) {
            self.in_transit.push(msg);
            return true;
        }
        false
    }

    /// Local state recorded and every incoming channel closed.
    pub fn is_complete(&self) -> bool {
        self.recorded.is_some() && self.open.is_empty()
    }

    /// Finalizes the local snapshot.
    pub fn finish(self) -> LocalSnapshot {
        let complete = self.is_complete();
        LocalSnapshot {
            node: self.node,
            state: self.recorded,
            in_transit: self.in_transit,
            received_before: self.received_before,
            complete,
        }
    }
}

/// One node's part of the global snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSnapshot {
    /// Node the snapshot belongs to
    pub node: NodeId,

    /// Recorded local state (`None` if the node stopped before recording)
    pub state: Option<Color>,

    /// Recorded channel states: messages in transit on incoming channels
    pub in_transit: Vec<Message>,

    /// Application messages consumed before the recording point
    pub received_before: Vec<Message>,

    /// True if every incoming channel was closed by a marker
    pub complete: bool,
}

impl std::fmt::Display for LocalSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: Snapshot finished.", self.node.as_u32())?;
        match self.state {
            Some(color) => writeln!(f, "    State({})", color)?,
            None => writeln!(f, "    State()")?,
        }
        if self.in_transit.is_empty() {
            writeln!(f, "    Msgs()")?;
        }
        for msg in &self.in_transit {
            writeln!(f, "    {}", msg)?;
        }
        Ok(())
    }
}

/// A globally consistent cut assembled from every node's local snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GlobalSnapshot {
    locals: BTreeMap<NodeId, LocalSnapshot>,
}

impl GlobalSnapshot {
    pub fn from_locals(locals: impl IntoIterator<Item = LocalSnapshot>) -> Self {
        Self {
            locals: locals.into_iter().map(|l| (l.node, l)).collect(),
        }
    }

    pub fn local(&self, node: NodeId) -> Option<&LocalSnapshot> {
        self.locals.get(&node)
    }

    pub fn state_of(&self, node: NodeId) -> Option<Color> {
        self.locals.get(&node).and_then(|l| l.state)
    }

    /// Messages recorded in transit towards `node`.
    pub fn in_transit_to(&self, node: NodeId) -> &[Message] {
        self.locals
            .get(&node)
            .map(|l| l.in_transit.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Every local snapshot recorded a state and closed all its channels.
    pub fn is_complete(&self) -> bool {
        self.locals.values().all(|l| l.complete && l.state.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalSnapshot> {
        self.locals.values()
    }
}

impl std::fmt::Display for GlobalSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for local in self.locals.values() {
            write!(f, "{}", local)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: NodeId = NodeId(0);
    const Q: NodeId = NodeId(1);
    const R: NodeId = NodeId(2);

    #[test]
    fn test_first_marker_records_and_requests_flood() {
        let mut rec = SnapshotRecorder::new(R, [P, Q]);

        assert_eq!(rec.on_marker(P, Color::White), Ok(true));
        assert_eq!(rec.recorded_state(), Some(Color::White));
        assert!(!rec.is_complete());

        // Later markers only close their channel
        assert_eq!(rec.on_marker(Q, Color::Black), Ok(false));
        assert_eq!(rec.recorded_state(), Some(Color::White));
        assert!(rec.is_complete());
    }

    #[test]
    fn test_in_transit_only_between_record_and_marker() {
        let mut rec = SnapshotRecorder::new(R, [P, Q]);

        assert!(!rec.on_message(Message::new(Q, "early")));
        rec.on_marker(P, Color::White).unwrap();

        // Channel from Q still open: recorded
        assert!(rec.on_message(Message::new(Q, "m2")));
        // Channel from P closed: not recorded
        assert!(!rec.on_message(Message::new(P, "late")));

        rec.on_marker(Q, Color::Black).unwrap();
        assert!(!rec.on_message(Message::new(Q, "after")));

        let snap = rec.finish();
        assert_eq!(snap.in_transit, vec![Message::new(Q, "m2")]);
        assert_eq!(snap.received_before, vec![Message::new(Q, "early")]);
        assert!(snap.complete);
    }

    #[test]
    fn test_duplicate_marker_is_violation() {
        let mut rec = SnapshotRecorder::new(Q, [P]);
        rec.on_marker(P, Color::DarkGrey).unwrap();

        assert_eq!(
            rec.on_marker(P, Color::Black),
            Err(ProtocolViolation::DuplicateMarker { node: Q, from: P })
        );
    }

    #[test]
    fn test_marker_without_channel_is_violation() {
        let mut rec = SnapshotRecorder::new(Q, [P]);
        assert_eq!(
            rec.on_marker(R, Color::Grey),
            Err(ProtocolViolation::UnknownChannel { node: Q, from: R })
        );
    }

    #[test]
    fn test_initiator_records_once() {
        let mut rec = SnapshotRecorder::new(P, [R]);
        rec.record_local(Color::Grey).unwrap();

        assert_eq!(rec.record_local(Color::Black), Err(ProtocolViolation::AlreadyRecorded { node: P }));
        assert_eq!(rec.on_marker(R, Color::Black), Ok(false));
        assert!(rec.is_complete());
    }

    #[test]
    fn test_isolated_node_completes_once_recorded() {
        let mut rec = SnapshotRecorder::new(P, Vec::new());
        assert!(rec.is_isolated());
        assert!(!rec.is_complete());

        rec.record_local(Color::Grey).unwrap();
        assert!(rec.is_complete());
    }

    #[test]
    fn test_unfinished_snapshot_is_incomplete() {
        let rec = SnapshotRecorder::new(Q, [P]);
        let snap = rec.finish();
        assert_eq!(snap.state, None);
        assert!(!snap.complete);

        let global = GlobalSnapshot::from_locals([snap]);
        assert!(!global.is_complete());
    }

    #[test]
    fn test_report_format() {
        let global = GlobalSnapshot::from_locals([
            LocalSnapshot {
                node: P,
                state: Some(Color::Grey),
                in_transit: vec![],
                received_before: vec![],
                complete: true,
            },
            LocalSnapshot {
                node: R,
                state: Some(Color::White),
                in_transit: vec![Message::new(Q, "m2")],
                received_before: vec![],
                complete: true,
            },
        ]);

        let text = global.to_string();
        assert_eq!(
            text,
            "0: Snapshot finished.\n    State(grey)\n    Msgs()\n\
             2: Snapshot finished.\n    State(white)\n    Msg(from=1, msg=m2)\n"
        );
        assert_eq!(global.state_of(R), Some(Color::White));
        assert_eq!(global.in_transit_to(R).len(), 1);
        assert!(global.in_transit_to(Q).is_empty());
        assert!(global.is_complete());
    }
}
