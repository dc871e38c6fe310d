//! distsys Core - Actor-Based Distributed System Simulator
//!
//! Independent logical processes ("nodes") run concurrently, one task
//! each, and exchange asynchronous point-to-point messages over directed
//! channels. On top of the runtime sits a Chandy-Lamport global snapshot
//! process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DistributedSystem                        │
//! │   owns: nodes (arena) · channels (arena) · result receivers │
//! │       │                                                     │
//! │  ┌────▼─────┐   Channel(p → q)   ┌──────────┐               │
//! │  │  Node p  │ ─────────────────► │  Node q  │               │
//! │  │ behavior │                    │ Mailbox  │ ◄── push      │
//! │  └──────────┘                    └──────────┘               │
//! │       ▲ one task per node, spawned via RuntimeContext       │
//! └───────┴─────────────────────────────────────────────────────┘
//! ```
//!
//! Nodes and channels refer to each other by id only; every lookup goes
//! through the orchestrator's arena (frozen into a [`Topology`] at `run()`).
//!
//! # Example
//!
//! ```ignore
//! use distsys_core::{DistributedSystem, SnapshotProcess};
//!
//! let mut sys = DistributedSystem::new();
//! let r = sys.add_node(SnapshotProcess::passive())?;
//! let q = sys.add_node(SnapshotProcess::relay().with_send(r, "m2"))?;
//! let p = sys.add_node(SnapshotProcess::initiator().with_send(q, "m1"))?;
//! sys.add_channel(p, q)?;
//! sys.add_channel(q, r)?;
//! sys.add_bi_channel(p, r)?;
//!
//! sys.run()?;
//! let reports = sys.await_all_done().await?;
//! ```

pub mod chandy_lamport;
pub mod channel;
pub mod error;
pub mod ids;
pub mod mailbox;
pub mod node;
pub mod snapshot;
pub mod system;
pub mod topology;

// Re-export key types for convenience
pub use chandy_lamport::{Role, SnapshotProcess, SnapshotTiming};
pub use channel::Channel;
pub use error::{ProtocolViolation, SystemError};
pub use ids::IdAllocator;
pub use mailbox::Mailbox;
pub use node::{Behavior, NodeHandle};
pub use snapshot::{Color, GlobalSnapshot, LocalSnapshot, SnapshotRecorder, MARKER};
pub use system::{DistributedSystem, NodeReport, SystemState, TaskOutcome};
pub use topology::Topology;

pub use distsys_env::{ChannelId, Message, NodeId};
