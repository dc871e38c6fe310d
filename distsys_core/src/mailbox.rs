//! Thread-safe inbound message queue owned by a single node.
//!
//! Many writers (every node holding a channel into the owner) push
//! concurrently; only the owner pops. A single lock guards the queue and
//! is held for the duration of one push or pop, never across a
//! `send`/`receive` pair.

use distsys_env::{Message, NodeId};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Unbounded FIFO mailbox.
///
/// Order is FIFO per writer; entries from different writers interleave
/// in whatever order their pushes acquired the lock.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Message>>,
}

impl Mailbox {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message. Never blocks beyond the lock, never fails.
    pub fn push(&self, from: NodeId, payload: impl Into<String>) {
        self.queue.lock().push_back(Message::new(from, payload));
    }

    /// Removes and returns the oldest message, or `None` if empty.
    ///
    /// Empty is a normal condition; callers poll.
    pub fn pop(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    /// Returns a copy of every pending message, oldest first.
    pub fn peek_all(&self) -> Vec<Message> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Point-in-time number of pending messages.
    pub fn size(&self) -> usize {
        self.queue.lock().len()
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
