//! distsys Environment Abstraction Layer
//!
//! This crate provides the pieces of the simulator that touch the outside
//! world, so the runtime in `distsys_core` stays free of direct calls into a
//! particular executor:
//! - Identity (`NodeId`, `ChannelId`) and the `Message` envelope
//! - Time (`now()`, `sleep()`)
//! - Task spawning (`spawn()`)
//!
//! # Example
//!
//! ```ignore
//! use distsys_env::{RuntimeContext, TokioContext};
//! use std::time::Duration;
//!
//! let ctx = TokioContext::shared();
//! ctx.spawn("node-0", Box::pin(async move {
//!     loop {
//!         poll_mailbox();
//!         ctx.sleep(Duration::from_millis(5)).await;
//!     }
//! }));
//! ```

mod context;
mod types;
mod tokio_impl;

pub use context::{RuntimeContext, TaskFuture};
pub use types::{ChannelId, Message, NodeId};
pub use tokio_impl::TokioContext;
