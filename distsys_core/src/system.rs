//! DistributedSystem - the orchestrator that owns every node and channel.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──run()──► Running ──stop()──► Stopping
//!                    │                   │
//!                    └──await_all_done()─┴──► Drained
//! ```
//!
//! Wiring (`add_node`, `add_channel`) is only valid while `Idle`. There is
//! no transition back from `Drained`.

use crate::channel::Channel;
use crate::error::{ProtocolViolation, SystemError};
use crate::ids::IdAllocator;
use crate::node::{Behavior, Node, NodeHandle};
use crate::topology::Topology;

use distsys_env::{ChannelId, NodeId, RuntimeContext, TokioContext};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Coarse lifecycle state of the whole system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemState {
    Idle,
    Running,
    Stopping,
    Drained,
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SystemState::Idle => "idle",
            SystemState::Running => "running",
            SystemState::Stopping => "stopping",
            SystemState::Drained => "drained",
        };
        write!(f, "{}", name)
    }
}

/// How a node's task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<Out> {
    /// The behavior returned normally.
    Completed(Out),

    /// The behavior aborted with a protocol violation.
    Violated(ProtocolViolation),

    /// The behavior panicked, or its task vanished without reporting.
    Panicked(String),
}

impl<Out> TaskOutcome<Out> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    /// Returns the behavior's output if it completed.
    pub fn completed(self) -> Option<Out> {
        match self {
            TaskOutcome::Completed(out) => Some(out),
            _ => None,
        }
    }

    pub fn violation(&self) -> Option<&ProtocolViolation> {
        match self {
            TaskOutcome::Violated(v) => Some(v),
            _ => None,
        }
    }
}

/// Final report for one node, returned by `await_all_done()`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport<Out> {
    /// The node this report belongs to
    pub node: NodeId,

    /// How the node's behavior ended
    pub outcome: TaskOutcome<Out>,
}

/// The orchestrator.
///
/// Generic over the output type `Out` every behavior produces. Outputs
/// travel back to the caller through one oneshot channel per task, so node
/// tasks never share mutable state with the orchestrator.
pub struct DistributedSystem<Out = ()> {
    /// Runtime context used for spawning and sleeping
    context: Arc<dyn RuntimeContext>,

    /// Id allocator private to this system
    ids: IdAllocator,

    /// Nodes in creation order
    nodes: Vec<Node<Out>>,

    /// Channels in creation order
    channels: Vec<Channel>,

    /// Result receivers for spawned tasks, in creation order
    pending: Vec<(NodeId, oneshot::Receiver<TaskOutcome<Out>>)>,

    /// Lifecycle state
    state: SystemState,
}

impl<Out: Send + 'static> DistributedSystem<Out> {
    /// Creates an empty system backed by Tokio.
    pub fn new() -> Self {
        Self::with_context(TokioContext::shared())
    }

    /// Creates an empty system backed by the given context.
    pub fn with_context(context: Arc<dyn RuntimeContext>) -> Self {
        Self {
            context,
            ids: IdAllocator::new(),
            nodes: Vec::new(),
            channels: Vec::new(),
            pending: Vec::new(),
            state: SystemState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Adds a node running `behavior` and returns its id.
    pub fn add_node<B>(&mut self, behavior: B) -> Result<NodeId, SystemError>
    where
        B: Behavior<Out>,
    {
        self.ensure_idle("add_node")?;

        let id = self.ids.next_node();
        self.nodes.push(Node::new(id, Box::new(behavior)));
        debug!(node = %id, "node added");
        Ok(id)
    }

    /// Adds one directed channel `from -> to` and registers it on both endpoints.
    ///
    /// At most one channel exists per ordered pair.
    pub fn add_channel(&mut self, from: NodeId, to: NodeId) -> Result<ChannelId, SystemError> {
        self.ensure_idle("add_channel")?;

        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        if self.nodes[from_idx].has_out_channel(to) {
            return Err(SystemError::DuplicateChannel { from, to });
        }

        let channel = Channel::new(self.ids.next_channel(), from, to);
        self.nodes[from_idx].add_out_channel(channel);
        self.nodes[to_idx].add_in_channel(channel);
        self.channels.push(channel);

        debug!(%channel, "channel added");
        Ok(channel.id())
    }

    /// Adds `p -> q` and `q -> p` as two independent channels.
    pub fn add_bi_channel(&mut self, p: NodeId, q: NodeId) -> Result<(ChannelId, ChannelId), SystemError> {
        let forward = self.add_channel(p, q)?;
        let backward = self.add_channel(q, p)?;
        Ok((forward, backward))
    }

    /// Returns `(node count, channel count)`.
    pub fn size(&self) -> (usize, usize) {
        (self.nodes.len(), self.channels.len())
    }

    /// Node ids in creation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id()).collect()
    }

    /// Channels in creation order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Spawns one task per node, each running that node's behavior.
    pub fn run(&mut self) -> Result<(), SystemError> {
        if self.state != SystemState::Idle {
            return Err(SystemError::InvalidTransition {
                op: "run",
                state: self.state,
            });
        }

        let topology = Arc::new(Topology::from_nodes(
            self.nodes.iter().map(|n| (n.id(), Arc::clone(n.shared()))),
        ));

        for node in &mut self.nodes {
            let Some((behavior, handle)) = node.launch(Arc::clone(&topology), Arc::clone(&self.context)) else {
                continue;
            };

            let id = node.id();
            let shared = Arc::clone(node.shared());
            let (tx, rx) = oneshot::channel();

            shared.mark_spawned();
            self.context.spawn(
                &id.to_string(),
                Box::pin(async move {
                    let outcome = run_to_outcome(id, behavior, handle).await;
                    shared.mark_finished();
                    // The receiver is gone only if the system was dropped early
                    let _ = tx.send(outcome);
                }),
            );
            self.pending.push((id, rx));
        }

        info!(nodes = self.nodes.len(), channels = self.channels.len(), "system running");
        self.state = SystemState::Running;
        Ok(())
    }

    /// Sets the cooperative stop flag on every node.
    ///
    /// Does not cancel anything; behaviors must observe `is_stopped()`.
    /// Calling it again while stopping is a no-op.
    pub fn stop(&mut self) -> Result<(), SystemError> {
        match self.state {
            SystemState::Running | SystemState::Stopping => {
                for node in &self.nodes {
                    node.shared().stop();
                }
                self.state = SystemState::Stopping;
                info!("stop requested");
                Ok(())
            }
            state => Err(SystemError::InvalidTransition { op: "stop", state }),
        }
    }

    /// Sets the stop flag on a single node. Idempotent.
    pub fn stop_node(&self, id: NodeId) -> Result<(), SystemError> {
        let idx = self.index_of(id)?;
        self.nodes[idx].shared().stop();
        Ok(())
    }

    pub fn is_alive(&self, id: NodeId) -> Result<bool, SystemError> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].shared().is_alive())
    }

    pub fn is_stopped(&self, id: NodeId) -> Result<bool, SystemError> {
        let idx = self.index_of(id)?;
        Ok(self.nodes[idx].shared().is_stopped())
    }

    /// Waits until every spawned task has returned and reports each outcome.
    ///
    /// Reports are in node creation order. A behavior that never terminates
    /// stalls this call indefinitely.
    pub async fn await_all_done(&mut self) -> Result<Vec<NodeReport<Out>>, SystemError> {
        if !matches!(self.state, SystemState::Running | SystemState::Stopping) {
            return Err(SystemError::InvalidTransition {
                op: "await_all_done",
                state: self.state,
            });
        }

        let mut reports = Vec::with_capacity(self.pending.len());
        for (node, rx) in self.pending.drain(..) {
            let outcome = rx
                .await
                .unwrap_or_else(|_| TaskOutcome::Panicked("task dropped before reporting".to_string()));

            match &outcome {
                TaskOutcome::Completed(_) => debug!(%node, "node completed"),
                TaskOutcome::Violated(v) => warn!(%node, "protocol violation: {}", v),
                TaskOutcome::Panicked(msg) => warn!(%node, "node panicked: {}", msg),
            }
            reports.push(NodeReport { node, outcome });
        }

        self.state = SystemState::Drained;
        info!(nodes = reports.len(), "all nodes done");
        Ok(reports)
    }

    fn ensure_idle(&self, op: &'static str) -> Result<(), SystemError> {
        if self.state == SystemState::Idle {
            Ok(())
        } else {
            Err(SystemError::InvalidTopologyMutation { op, state: self.state })
        }
    }

    fn index_of(&self, id: NodeId) -> Result<usize, SystemError> {
        // Ids are dense and allocated in creation order
        let idx = id.as_u32() as usize;
        match self.nodes.get(idx) {
            Some(node) if node.id() == id => Ok(idx),
            _ => Err(SystemError::UnknownNode(id)),
        }
    }
}

impl<Out: Send + 'static> Default for DistributedSystem<Out> {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_to_outcome<Out: Send + 'static>(
    id: NodeId,
    behavior: Box<dyn Behavior<Out>>,
    handle: NodeHandle,
) -> TaskOutcome<Out> {
    debug!(node = %id, "behavior started");
    match AssertUnwindSafe(behavior.run(handle)).catch_unwind().await {
        Ok(Ok(out)) => TaskOutcome::Completed(out),
        Ok(Err(violation)) => TaskOutcome::Violated(violation),
        Err(panic) => TaskOutcome::Panicked(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
