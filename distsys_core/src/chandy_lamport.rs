//! Chandy-Lamport snapshot process.
//!
//! Each node runs a [`SnapshotProcess`]: a small color state machine on top
//! of a [`SnapshotRecorder`]. Colors per role:
//!
//! ```text
//! Initiator:  Grey ──record + flood + send──► Black
//! Relay:      Grey ──delay + send──► DarkGrey ──first marker: record + flood──► Black
//! Passive:    White ──first marker: record + flood──► Black
//! ```
//!
//! The recorded state is the color at the recording point, so the initiator
//! records `Grey`, a relay `DarkGrey`, and a passive node `White`. A node
//! returns once it has seen exactly one marker on every incoming channel.

use crate::error::ProtocolViolation;
use crate::node::{Behavior, NodeHandle};
use crate::snapshot::{Color, LocalSnapshot, SnapshotRecorder, MARKER};

use async_trait::async_trait;
use distsys_env::{Message, NodeId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// What part a node plays in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Starts the snapshot on its own.
    Initiator,

    /// Sends its application messages after a delay, then waits for a marker.
    Relay,

    /// Only reacts to markers.
    Passive,
}

impl Role {
    pub fn initial_color(&self) -> Color {
        match self {
            Role::Initiator | Role::Relay => Color::Grey,
            Role::Passive => Color::White,
        }
    }
}

/// Poll cadence and the relay's deliberate delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotTiming {
    /// Pause between two mailbox polls
    pub tick: Duration,

    /// How long a relay waits before sending its application messages
    pub relay_delay: Duration,
}

impl Default for SnapshotTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(5),
            relay_delay: Duration::from_millis(25),
        }
    }
}

/// An application message in a node's script.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outgoing {
    /// To a single peer (a no-op without a channel to it)
    To(NodeId, String),

    /// To every outgoing neighbor
    Neighbors(String),
}

/// A node behavior taking part in a Chandy-Lamport snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotProcess {
    role: Role,
    color: Color,
    outgoing: Vec<Outgoing>,
    timing: SnapshotTiming,
}

impl SnapshotProcess {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            color: role.initial_color(),
            outgoing: Vec::new(),
            timing: SnapshotTiming::default(),
        }
    }

    pub fn initiator() -> Self {
        Self::new(Role::Initiator)
    }

    pub fn relay() -> Self {
        Self::new(Role::Relay)
    }

    pub fn passive() -> Self {
        Self::new(Role::Passive)
    }

    /// Queues an application message this node sends as part of its script.
    pub fn with_send(mut self, to: NodeId, payload: impl Into<String>) -> Self {
        self.outgoing.push(Outgoing::To(to, payload.into()));
        self
    }

    /// Queues an application message for every outgoing neighbor.
    pub fn with_broadcast(mut self, payload: impl Into<String>) -> Self {
        self.outgoing.push(Outgoing::Neighbors(payload.into()));
        self
    }

    pub fn with_timing(mut self, timing: SnapshotTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn color(&self) -> Color {
        self.color
    }

    fn send_script(&self, node: &NodeHandle) {
        for outgoing in &self.outgoing {
            match outgoing {
                Outgoing::To(to, payload) => {
                    debug!(node = %node.id(), %to, payload = %payload, "sending");
                    node.send(*to, payload.as_str());
                }
                Outgoing::Neighbors(payload) => {
                    let sent = node.broadcast(payload);
                    debug!(node = %node.id(), payload = %payload, channels = sent, "sending to neighbors");
                }
            }
        }
    }

    /// Records the current color, floods the marker and turns black.
    fn take_snapshot(&mut self, node: &NodeHandle, recorder: &mut SnapshotRecorder) -> Result<(), ProtocolViolation> {
        recorder.record_local(self.color)?;
        self.flood(node);
        Ok(())
    }

    fn flood(&mut self, node: &NodeHandle) {
        let sent = node.broadcast(MARKER);
        debug!(node = %node.id(), recorded = %self.color, channels = sent, "marker flooded");
        self.color = Color::Black;
    }

    fn handle(&mut self, node: &NodeHandle, recorder: &mut SnapshotRecorder, msg: Message) -> Result<(), ProtocolViolation> {
        if msg.is(MARKER) {
            debug!(node = %node.id(), from = %msg.from, "got marker");
            if recorder.on_marker(msg.from, self.color)? {
                self.flood(node);
            }
        } else {
            debug!(node = %node.id(), from = %msg.from, payload = %msg.payload, "got message");
            recorder.on_message(msg);
        }
        Ok(())
    }

    /// One state machine step. Polls at most one message.
    fn step_polling(&mut self, node: &NodeHandle, recorder: &mut SnapshotRecorder) -> Result<(), ProtocolViolation> {
        // Nobody can send us a marker: record spontaneously
        if recorder.is_isolated() && !recorder.has_recorded() {
            return self.take_snapshot(node, recorder);
        }
        match node.receive() {
            Some(msg) => self.handle(node, recorder, msg),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Behavior<LocalSnapshot> for SnapshotProcess {
    async fn run(self: Box<Self>, node: NodeHandle) -> Result<LocalSnapshot, ProtocolViolation> {
        let mut this = *self;
        let mut recorder = SnapshotRecorder::for_node(&node);

        if this.role == Role::Passive {
            this.send_script(&node);
        }

        while !node.is_stopped() {
            match (this.role, this.color) {
                (Role::Initiator, Color::Grey) => {
                    info!(node = %node.id(), "snapshot started");
                    this.take_snapshot(&node, &mut recorder)?;
                    this.send_script(&node);
                }
                (Role::Relay, Color::Grey) => {
                    node.wait_for(this.timing.relay_delay).await;
                    this.send_script(&node);
                    this.color = Color::DarkGrey;
                }
                (Role::Initiator, Color::Black)
                | (Role::Relay, Color::DarkGrey | Color::Black)
                | (Role::Passive, Color::White | Color::Black) => {
                    this.step_polling(&node, &mut recorder)?;
                }
                (role, color) => {
                    return Err(ProtocolViolation::unreachable(node.id(), format!("{:?}/{}", role, color)));
                }
            }

            if recorder.is_complete() {
                let snapshot = recorder.finish();
                info!(
                    node = %node.id(),
                    state = ?snapshot.state,
                    in_transit = snapshot.in_transit.len(),
                    "snapshot finished"
                );
                return Ok(snapshot);
            }

            node.wait_for(this.timing.tick).await;
        }

        debug!(node = %node.id(), "stopped before snapshot completed");
        Ok(recorder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{DistributedSystem, TaskOutcome};
    use crate::snapshot::GlobalSnapshot;

    fn fast() -> SnapshotTiming {
        SnapshotTiming {
            tick: Duration::from_millis(1),
            relay_delay: Duration::from_millis(20),
        }
    }

    fn collect(reports: Vec<crate::system::NodeReport<LocalSnapshot>>) -> GlobalSnapshot {
        GlobalSnapshot::from_locals(reports.into_iter().filter_map(|r| r.outcome.completed()))
    }

    #[test]
    fn test_initial_colors() {
        assert_eq!(SnapshotProcess::initiator().color(), Color::Grey);
        assert_eq!(SnapshotProcess::relay().color(), Color::Grey);
        assert_eq!(SnapshotProcess::passive().color(), Color::White);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lone_initiator_terminates_after_flood() {
        let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
        let p = sys.add_node(SnapshotProcess::initiator().with_timing(fast())).unwrap();
        sys.run().unwrap();

        let snapshot = collect(sys.await_all_done().await.unwrap());
        assert_eq!(snapshot.state_of(p), Some(Color::Grey));
        assert!(snapshot.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_isolated_passive_records_spontaneously() {
        let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
        let p = sys.add_node(SnapshotProcess::passive().with_timing(fast())).unwrap();
        let q = sys.add_node(SnapshotProcess::passive().with_timing(fast())).unwrap();
        sys.add_channel(p, q).unwrap();
        sys.run().unwrap();

        let snapshot = collect(sys.await_all_done().await.unwrap());
        assert_eq!(snapshot.state_of(p), Some(Color::White));
        assert_eq!(snapshot.state_of(q), Some(Color::White));
        assert!(snapshot.is_complete());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pair_records_in_flight_message() {
        // q sends before it ever sees a marker; p has already recorded
        let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
        let p = sys.add_node(SnapshotProcess::initiator().with_timing(fast())).unwrap();
        let q = sys
            .add_node(SnapshotProcess::relay().with_send(p, "hi").with_timing(fast()))
            .unwrap();
        sys.add_bi_channel(p, q).unwrap();
        sys.run().unwrap();

        let snapshot = collect(sys.await_all_done().await.unwrap());
        assert_eq!(snapshot.state_of(p), Some(Color::Grey));
        assert_eq!(snapshot.state_of(q), Some(Color::DarkGrey));
        assert_eq!(snapshot.in_transit_to(p), &[Message::new(q, "hi")]);
        assert!(snapshot.in_transit_to(q).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_interrupts_waiting_node() {
        // r has an incoming channel but nobody ever floods a marker into it
        let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
        let q = sys.add_node(SnapshotProcess::passive().with_timing(fast())).unwrap();
        let r = sys.add_node(SnapshotProcess::passive().with_timing(fast())).unwrap();
        sys.add_bi_channel(q, r).unwrap();
        sys.run().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        sys.stop().unwrap();
        let reports = sys.await_all_done().await.unwrap();

        for report in reports {
            match report.outcome {
                TaskOutcome::Completed(local) => {
                    assert_eq!(local.state, None);
                    assert!(!local.complete);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_duplicate_marker_aborts_node() {
        // A rogue node floods twice on the same channel; a silent node keeps
        // the victim's second channel open so it cannot finish first
        let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
        let rogue = sys
            .add_node(|node: NodeHandle| async move {
                node.broadcast(MARKER);
                node.broadcast(MARKER);
                Ok::<_, ProtocolViolation>(SnapshotRecorder::for_node(&node).finish())
            })
            .unwrap();
        let victim = sys.add_node(SnapshotProcess::passive().with_timing(fast())).unwrap();
        let silent = sys
            .add_node(|node: NodeHandle| async move {
                while !node.is_stopped() {
                    node.wait_for(Duration::from_millis(1)).await;
                }
                Ok::<_, ProtocolViolation>(SnapshotRecorder::for_node(&node).finish())
            })
            .unwrap();
        sys.add_channel(rogue, victim).unwrap();
        sys.add_channel(silent, victim).unwrap();
        sys.run().unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        sys.stop().unwrap();
        let reports = sys.await_all_done().await.unwrap();

        assert!(reports[0].outcome.is_completed());
        assert_eq!(
            reports[1].outcome.violation(),
            Some(&ProtocolViolation::DuplicateMarker { node: victim, from: rogue })
        );
        assert!(reports[2].outcome.is_completed());
    }
}
