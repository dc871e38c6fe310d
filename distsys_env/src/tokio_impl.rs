//! Production implementation of RuntimeContext using Tokio.

use crate::context::{RuntimeContext, TaskFuture};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Production context backed by the Tokio scheduler.
///
/// Spawned tasks run on whatever runtime is current when `spawn` is
/// called, so on a multi-thread runtime nodes execute in parallel.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn(&self, name: &str, future: TaskFuture) {
        let span = tracing::debug_span!("task", name = %name);
        tokio::spawn(future.instrument(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_tokio_context_spawn_runs_task() {
        let ctx = TokioContext::shared();
        let (tx, rx) = oneshot::channel();

        ctx.spawn("probe", Box::pin(async move {
            let _ = tx.send(7u32);
        }));

        assert_eq!(rx.await.ok(), Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sleep_only_suspends_caller() {
        let ctx = TokioContext::shared();
        let (tx, rx) = oneshot::channel();

        let sleeper = Arc::clone(&ctx);
        ctx.spawn("sleeper", Box::pin(async move {
            sleeper.sleep(Duration::from_millis(200)).await;
        }));
        ctx.spawn("worker", Box::pin(async move {
            let _ = tx.send(());
        }));

        let started = Instant::now();
        assert!(rx.await.is_ok());
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
