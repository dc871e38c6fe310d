//! Node abstraction: a logical process with a behavior and a mailbox.
//!
//! A node exists in two forms:
//! - [`Node`]: the wiring record the orchestrator owns while the system is
//!   `Idle` (behavior, channel maps, shared runtime state).
//! - [`NodeHandle`]: the "self" handle a running behavior receives. It is
//!   the only way a behavior touches the runtime.

use crate::channel::Channel;
use crate::error::ProtocolViolation;
use crate::mailbox::Mailbox;
use crate::topology::Topology;

use async_trait::async_trait;
use distsys_env::{Message, NodeId, RuntimeContext};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The unit of work a node runs, exactly once, for its entire lifetime.
///
/// Returning `Err` is a fatal protocol violation for this node only.
/// Any `FnOnce(NodeHandle) -> impl Future<Output = Result<Out, ProtocolViolation>>`
/// closure is a behavior.
#[async_trait]
pub trait Behavior<Out>: Send + 'static {
    async fn run(self: Box<Self>, node: NodeHandle) -> Result<Out, ProtocolViolation>;
}

#[async_trait]
impl<F, Fut, Out> Behavior<Out> for F
where
    F: FnOnce(NodeHandle) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Out, ProtocolViolation>> + Send + 'static,
    Out: Send + 'static,
{
    async fn run(self: Box<Self>, node: NodeHandle) -> Result<Out, ProtocolViolation> {
        (*self)(node).await
    }
}

/// Runtime state shared between the orchestrator and a node's task.
#[derive(Debug, Default)]
pub struct NodeShared {
    mailbox: Mailbox,
    alive: AtomicBool,
    stopped: AtomicBool,
}

impl NodeShared {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Sets the cooperative stop flag. Idempotent.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn mark_spawned(&self) {
        self.alive.store(true, Ordering::Release);
    }

    /// Called when the behavior returns, however it returns.
    pub(crate) fn mark_finished(&self) {
        self.alive.store(false, Ordering::Release);
        self.stopped.store(true, Ordering::Release);
    }
}

/// Wiring record for one node, owned by the orchestrator.
pub(crate) struct Node<Out> {
    id: NodeId,
    behavior: Option<Box<dyn Behavior<Out>>>,
    out_channels: BTreeMap<NodeId, Channel>,
    in_channels: BTreeMap<NodeId, Channel>,
    shared: Arc<NodeShared>,
}

impl<Out: Send + 'static> Node<Out> {
    pub(crate) fn new(id: NodeId, behavior: Box<dyn Behavior<Out>>) -> Self {
        Self {
            id,
            behavior: Some(behavior),
            out_channels: BTreeMap::new(),
            in_channels: BTreeMap::new(),
            shared: Arc::new(NodeShared::new()),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn shared(&self) -> &Arc<NodeShared> {
        &self.shared
    }

    pub(crate) fn has_out_channel(&self, peer: NodeId) -> bool {
        self.out_channels.contains_key(&peer)
    }

    pub(crate) fn add_out_channel(&mut self, channel: Channel) {
        self.out_channels.insert(channel.to(), channel);
    }

    pub(crate) fn add_in_channel(&mut self, channel: Channel) {
        self.in_channels.insert(channel.from(), channel);
    }

    /// Hands out the behavior and a handle to run it with.
    ///
    /// Returns `None` if the behavior was already taken.
    pub(crate) fn launch(
        &mut self,
        topology: Arc<Topology>,
        context: Arc<dyn RuntimeContext>,
    ) -> Option<(Box<dyn Behavior<Out>>, NodeHandle)> {
        let behavior = self.behavior.take()?;
        let handle = NodeHandle {
            id: self.id,
            out_channels: Arc::new(self.out_channels.clone()),
            in_channels: Arc::new(self.in_channels.clone()),
            shared: Arc::clone(&self.shared),
            topology,
            context,
        };
        Some((behavior, handle))
    }
}

/// A running behavior's handle to its own node.
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    out_channels: Arc<BTreeMap<NodeId, Channel>>,
    in_channels: Arc<BTreeMap<NodeId, Channel>>,
    shared: Arc<NodeShared>,
    topology: Arc<Topology>,
    context: Arc<dyn RuntimeContext>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Sends `payload` to `peer` over the outgoing channel to it.
    ///
    /// Without such a channel the call is a no-op: an unreachable peer is
    /// a normal condition, not an error.
    pub fn send(&self, peer: NodeId, payload: impl Into<String>) {
        match self.out_channels.get(&peer) {
            Some(channel) => channel.send(&self.topology, payload),
            None => tracing::trace!(node = %self.id, %peer, "no route, message dropped"),
        }
    }

    /// Sends `payload` on every outgoing channel. Returns the number of channels used.
    pub fn broadcast(&self, payload: &str) -> usize {
        for channel in self.out_channels.values() {
            channel.send(&self.topology, payload);
        }
        self.out_channels.len()
    }

    /// Pops the oldest pending message. `None` means the mailbox is empty.
    pub fn receive(&self) -> Option<Message> {
        self.shared.mailbox().pop()
    }

    /// Point-in-time copy of the pending messages.
    pub fn peek_mailbox(&self) -> Vec<Message> {
        self.shared.mailbox().peek_all()
    }

    /// Point-in-time mailbox size.
    pub fn pending(&self) -> usize {
        self.shared.mailbox().size()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Requests this node to stop. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Suspends this node only.
    pub async fn wait_for(&self, duration: Duration) {
        self.context.sleep(duration).await;
    }

    /// Time since the system's context was created.
    pub fn now(&self) -> Duration {
        self.context.now()
    }

    /// Outgoing channels, ordered by destination id.
    pub fn out_channels(&self) -> impl Iterator<Item = &Channel> {
        self.out_channels.values()
    }

    /// Incoming channels, ordered by source id.
    pub fn in_channels(&self) -> impl Iterator<Item = &Channel> {
        self.in_channels.values()
    }

    pub fn out_channel(&self, peer: NodeId) -> Option<&Channel> {
        self.out_channels.get(&peer)
    }

    pub fn in_channel(&self, peer: NodeId) -> Option<&Channel> {
        self.in_channels.get(&peer)
    }

    pub fn in_degree(&self) -> usize {
        self.in_channels.len()
    }

    pub fn out_degree(&self) -> usize {
        self.out_channels.len()
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("out", &self.out_channels.keys().collect::<Vec<_>>())
            .field("in", &self.in_channels.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use distsys_env::{ChannelId, TokioContext};

    fn wired_pair() -> (NodeHandle, Arc<NodeShared>) {
        let p = Arc::new(NodeShared::new());
        let q = Arc::new(NodeShared::new());
        let topology = Arc::new(Topology::from_nodes([
            (NodeId(0), Arc::clone(&p)),
            (NodeId(1), Arc::clone(&q)),
        ]));

        let mut out = BTreeMap::new();
        out.insert(NodeId(1), Channel::new(ChannelId(0), NodeId(0), NodeId(1)));

        let handle = NodeHandle {
            id: NodeId(0),
            out_channels: Arc::new(out),
            in_channels: Arc::new(BTreeMap::new()),
            shared: p,
            topology,
            context: TokioContext::shared(),
        };
        (handle, q)
    }

    #[test]
    fn test_send_to_neighbor_delivers() {
        let (p, q) = wired_pair();
        p.send(NodeId(1), "hello");

        assert_eq!(q.mailbox().pop(), Some(Message::new(NodeId(0), "hello")));
    }

    #[test]
    fn test_send_to_non_neighbor_is_noop() {
        let (p, q) = wired_pair();
        p.send(NodeId(7), "lost");
        p.send(NodeId(0), "self");

        assert!(q.mailbox().is_empty());
        assert_eq!(p.pending(), 0);
    }

    #[test]
    fn test_broadcast_counts_channels() {
        let (p, q) = wired_pair();
        assert_eq!(p.broadcast("ctrl"), 1);
        assert_eq!(q.mailbox().size(), 1);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (p, _) = wired_pair();
        assert!(!p.is_stopped());

        p.stop();
        p.stop();

        assert!(p.is_stopped());
        assert!(!p.is_alive());
    }

    #[test]
    fn test_mark_finished_clears_alive_and_sets_stopped() {
        let shared = NodeShared::new();
        shared.mark_spawned();
        assert!(shared.is_alive());

        shared.mark_finished();
        assert!(!shared.is_alive());
        assert!(shared.is_stopped());
    }

    #[test]
    fn test_receive_empty_is_none() {
        let (p, _) = wired_pair();
        assert_eq!(p.receive(), None);
        assert!(p.peek_mailbox().is_empty());
    }
}
