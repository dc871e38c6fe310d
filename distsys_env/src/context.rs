//! Core environment context trait for simulated nodes.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A boxed, sendable unit of work handed to [`RuntimeContext::spawn`].
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The central interface for executor interaction.
///
/// This trait abstracts the host scheduler so the runtime in
/// `distsys_core` never calls into tokio directly. It is object safe;
/// the orchestrator and every node handle share one `Arc<dyn RuntimeContext>`.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
#[async_trait]
pub trait RuntimeContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends the calling task for the given duration.
    ///
    /// Only the caller is suspended; other tasks keep running.
    async fn sleep(&self, duration: Duration);

    /// Spawns a named background task.
    ///
    /// The task is detached. Callers that need a result must arrange
    /// their own return path (e.g. a oneshot channel captured by `future`).
    fn spawn(&self, name: &str, future: TaskFuture);
}
