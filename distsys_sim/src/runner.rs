//! Scenario runner - wires a system, drives it, and checks the outcome.

use crate::scenarios::ScenarioId;

use distsys_core::{
    Color, DistributedSystem, GlobalSnapshot, LocalSnapshot, Message, NodeHandle, NodeId,
    NodeReport, ProtocolViolation, SnapshotProcess, SnapshotTiming, SystemError, TaskOutcome,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

/// Why a single scenario run failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Node {node} failed: {reason}")]
    NodeFailed { node: NodeId, reason: String },

    #[error("Unexpected outcome: {0}")]
    Mismatch(String),
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Number of repetitions attempted
    pub runs: usize,

    /// Repetitions that matched the expected outcome
    pub passed_runs: usize,

    /// Whether every repetition passed
    pub passed: bool,

    /// First failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during the runs
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Nodes per run
    pub nodes: usize,

    /// Channels per run
    pub channels: usize,

    /// Messages recorded in transit, summed over all runs
    pub in_transit_recorded: usize,

    /// Wall-clock time for all runs (ms)
    pub elapsed_ms: u64,
}

/// What one successful run contributes to the metrics.
#[derive(Debug, Clone, Copy, Default)]
struct RunStats {
    nodes: usize,
    channels: usize,
    in_transit: usize,
}

/// Runs simulation scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    /// Repetitions per scenario
    runs: usize,

    /// Snapshot poll cadence and relay delay
    timing: SnapshotTiming,

    /// Number of nodes in the ring scenario
    ring_size: usize,

    /// How long the greeting scenario runs before `stop()`
    greeting_duration: Duration,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(runs: usize) -> Self {
        Self {
            runs,
            timing: SnapshotTiming::default(),
            ring_size: 5,
            greeting_duration: Duration::from_millis(50),
        }
    }

    /// Sets the mailbox poll interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.timing.tick = tick;
        self
    }

    /// Sets the relay's delay before sending.
    pub fn with_relay_delay(mut self, delay: Duration) -> Self {
        self.timing.relay_delay = delay;
        self
    }

    /// Sets the ring size (at least 3).
    pub fn with_ring_size(mut self, size: usize) -> Self {
        self.ring_size = size.max(3);
        self
    }

    /// Sets how long the greeting scenario runs.
    pub fn with_greeting_duration(mut self, duration: Duration) -> Self {
        self.greeting_duration = duration;
        self
    }

    /// Runs a scenario `runs` times and returns the aggregated result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} ({} runs)", scenario.name(), self.runs);

        let started = Instant::now();
        let mut metrics = ScenarioMetrics::default();
        let mut passed_runs = 0;
        let mut failure_reason = None;

        for run in 0..self.runs {
            let outcome = match scenario {
                ScenarioId::Snapshot => self.run_snapshot().await,
                ScenarioId::Greeting => self.run_greeting().await,
                ScenarioId::Ring => self.run_ring().await,
            };

            match outcome {
                Ok(stats) => {
                    passed_runs += 1;
                    metrics.nodes = stats.nodes;
                    metrics.channels = stats.channels;
                    metrics.in_transit_recorded += stats.in_transit;
                }
                Err(e) => {
                    error!("{} run {} failed: {}", scenario.name(), run, e);
                    if failure_reason.is_none() {
                        failure_reason = Some(format!("run {}: {}", run, e));
                    }
                }
            }
        }

        metrics.elapsed_ms = started.elapsed().as_millis() as u64;

        ScenarioResult {
            scenario,
            runs: self.runs,
            passed_runs,
            passed: passed_runs == self.runs,
            failure_reason,
            metrics,
        }
    }

    /// SIM-001: the three-node snapshot.
    ///
    /// `p` floods its marker at once, then sends `m1` to `q`. `q` waits
    /// `relay_delay` before sending `m2` to `r`, so `p`'s marker reaches `r`
    /// first and `r` records `m2` as in transit.
    ///
    /// **Assertion**: p = grey/no msgs, q = dark grey/no msgs, r = white/{m2 from q}.
    async fn run_snapshot(&self) -> Result<RunStats, RunError> {
        let (snapshot, [p, q, r], size) = snapshot_scenario(self.timing).await?;
        debug!("\n{}", snapshot);

        expect_local(&snapshot, p, Color::Grey, &[])?;
        expect_local(&snapshot, q, Color::DarkGrey, &[])?;
        expect_local(&snapshot, r, Color::White, &[Message::new(q, "m2")])?;

        Ok(RunStats {
            nodes: size.0,
            channels: size.1,
            in_transit: snapshot.iter().map(|l| l.in_transit.len()).sum(),
        })
    }

    /// SIM-002: greetings on `p -> q`, `p <-> r`, `q -> r`.
    ///
    /// **Assertion**: q got m1 from p, r got m2 from p, p got m3 from r,
    /// nothing else, and every node stopped cleanly.
    async fn run_greeting(&self) -> Result<RunStats, RunError> {
        let tick = self.timing.tick;
        let mut sys: DistributedSystem<Vec<Message>> = DistributedSystem::new();

        let p = sys.add_node(move |node: NodeHandle| greeter(node, vec!["m1", "m2"], tick))?;
        let q = sys.add_node(move |node: NodeHandle| greeter(node, vec![], tick))?;
        let r = sys.add_node(move |node: NodeHandle| greeter(node, vec!["m3"], tick))?;

        sys.add_channel(p, q)?;
        sys.add_bi_channel(p, r)?;
        sys.add_channel(q, r)?;

        let size = sys.size();
        sys.run()?;
        tokio::time::sleep(self.greeting_duration).await;
        sys.stop()?;

        let received = completed_outputs(sys.await_all_done().await?)?;
        let expected: BTreeMap<NodeId, Vec<Message>> = [
            (p, vec![Message::new(r, "m3")]),
            (q, vec![Message::new(p, "m1")]),
            (r, vec![Message::new(p, "m2")]),
        ]
        .into_iter()
        .collect();

        if received != expected {
            return Err(RunError::Mismatch(format!(
                "greetings received {:?}, expected {:?}",
                received, expected
            )));
        }

        Ok(RunStats {
            nodes: size.0,
            channels: size.1,
            in_transit: 0,
        })
    }

    /// SIM-003: snapshot over a bidirectional ring.
    ///
    /// Node 0 initiates; every other node is a zero-delay relay that sends
    /// `m<i>` to both neighbors before it can have seen a marker.
    ///
    /// **Assertion**: every relay message shows up exactly once at its
    /// receiver, either consumed before recording or recorded in transit;
    /// the initiator's post-marker messages show up in neither.
    async fn run_ring(&self) -> Result<RunStats, RunError> {
        let (snapshot, ids, size) = ring_scenario(self.ring_size, self.timing).await?;
        debug!("\n{}", snapshot);

        if !snapshot.is_complete() {
            return Err(RunError::Mismatch("ring snapshot incomplete".to_string()));
        }

        let n = ids.len();
        for (i, &sender) in ids.iter().enumerate() {
            let payload = format!("m{}", i);
            for receiver in [ids[(i + 1) % n], ids[(i + n - 1) % n]] {
                let Some(local) = snapshot.local(receiver) else {
                    return Err(RunError::Mismatch(format!("no snapshot for {}", receiver)));
                };
                let msg = Message::new(sender, payload.as_str());
                let seen = local.received_before.iter().filter(|m| **m == msg).count()
                    + local.in_transit.iter().filter(|m| **m == msg).count();
                let expected = if i == 0 { 0 } else { 1 };

                if seen != expected {
                    return Err(RunError::Mismatch(format!(
                        "{} counted {} times at {}, expected {}",
                        msg, seen, receiver, expected
                    )));
                }
            }
        }

        Ok(RunStats {
            nodes: size.0,
            channels: size.1,
            in_transit: snapshot.iter().map(|l| l.in_transit.len()).sum(),
        })
    }
}

/// Wires and runs the three-node snapshot, returning the cut and `[p, q, r]`.
///
/// Nodes are added in reverse so each script can name its target.
pub async fn snapshot_scenario(
    timing: SnapshotTiming,
) -> Result<(GlobalSnapshot, [NodeId; 3], (usize, usize)), RunError> {
    let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();

    let r = sys.add_node(SnapshotProcess::passive().with_timing(timing))?;
    let q = sys.add_node(SnapshotProcess::relay().with_send(r, "m2").with_timing(timing))?;
    let p = sys.add_node(SnapshotProcess::initiator().with_send(q, "m1").with_timing(timing))?;

    sys.add_channel(p, q)?;
    sys.add_channel(q, r)?;
    sys.add_bi_channel(p, r)?;

    let size = sys.size();
    sys.run()?;
    let reports = sys.await_all_done().await?;

    let snapshot = GlobalSnapshot::from_locals(completed_outputs(reports)?.into_values());
    Ok((snapshot, [p, q, r], size))
}

/// Wires and runs the ring snapshot, returning the cut and the ids in ring order.
pub async fn ring_scenario(
    size: usize,
    timing: SnapshotTiming,
) -> Result<(GlobalSnapshot, Vec<NodeId>, (usize, usize)), RunError> {
    let mut sys: DistributedSystem<LocalSnapshot> = DistributedSystem::new();
    let size = size.max(3);

    let mut ids = Vec::with_capacity(size);
    for i in 0..size {
        let process = if i == 0 {
            SnapshotProcess::initiator()
        } else {
            SnapshotProcess::relay()
        };
        let timing = SnapshotTiming {
            relay_delay: Duration::ZERO,
            ..timing
        };
        ids.push(sys.add_node(process.with_broadcast(format!("m{}", i)).with_timing(timing))?);
    }
    for i in 0..size {
        sys.add_bi_channel(ids[i], ids[(i + 1) % size])?;
    }

    let counts = sys.size();
    sys.run()?;
    let reports = sys.await_all_done().await?;

    let snapshot = GlobalSnapshot::from_locals(completed_outputs(reports)?.into_values());
    Ok((snapshot, ids, counts))
}

/// Greets out-neighbors in peer-id order, then logs whatever arrives until stopped.
async fn greeter(
    node: NodeHandle,
    greetings: Vec<&'static str>,
    tick: Duration,
) -> Result<Vec<Message>, ProtocolViolation> {
    info!(node = %node.id(), "Hello from {}", node.id());

    let peers: Vec<NodeId> = node.out_channels().map(|ch| ch.to()).collect();
    for (peer, greeting) in peers.into_iter().zip(greetings) {
        node.send(peer, greeting);
    }

    let mut received = Vec::new();
    while !node.is_stopped() {
        if let Some(msg) = node.receive() {
            info!(node = %node.id(), "{}", msg);
            received.push(msg);
        }
        node.wait_for(tick).await;
    }
    while let Some(msg) = node.receive() {
        received.push(msg);
    }
    Ok(received)
}

/// Unwraps completed outputs keyed by node, failing on the first bad outcome.
fn completed_outputs<Out>(reports: Vec<NodeReport<Out>>) -> Result<BTreeMap<NodeId, Out>, RunError> {
    reports
        .into_iter()
        .map(|report| match report.outcome {
            TaskOutcome::Completed(out) => Ok((report.node, out)),
            TaskOutcome::Violated(v) => Err(RunError::NodeFailed {
                node: report.node,
                reason: v.to_string(),
            }),
            TaskOutcome::Panicked(msg) => Err(RunError::NodeFailed {
                node: report.node,
                reason: format!("panicked: {}", msg),
            }),
        })
        .collect()
}

fn expect_local(
    snapshot: &GlobalSnapshot,
    node: NodeId,
    state: Color,
    in_transit: &[Message],
) -> Result<(), RunError> {
    let Some(local) = snapshot.local(node) else {
        return Err(RunError::Mismatch(format!("no snapshot for {}", node)));
    };
    if local.state != Some(state) || local.in_transit != in_transit || !local.complete {
        return Err(RunError::Mismatch(format!(
            "{}: state {:?} with {:?}, expected {} with {:?}",
            node, local.state, local.in_transit, state, in_transit
        )));
    }
    Ok(())
}
