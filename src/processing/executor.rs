//! Task submission for relationship resolution
//!
//! The engine creates no threads. A pipeline either receives a
//! [`TaskExecutor`] and submits every resolution task to it, or runs each task
//! inline, in scheduling order, when none is configured. Both paths hand back
//! a [`Scheduled`] value that is joined later, so the pipeline code does not
//! care which one was taken.

use crate::core::error::{EngineError, EngineResult};
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::Instrument;

/// Something that can run a detached task
pub trait TaskExecutor: Send + Sync {
    /// Submit a task; it must eventually be polled to completion
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// Executor backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor on the runtime of the caller
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

impl TaskExecutor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        // detached: results travel back through the oneshot channel
        drop(self.handle.spawn(task));
    }
}

/// Result of a scheduled task, possibly still running
pub enum Scheduled<T> {
    Ready(EngineResult<T>),
    Spawned {
        task: String,
        receiver: oneshot::Receiver<EngineResult<T>>,
    },
}

impl<T> Scheduled<T> {
    /// Wait for the task result
    pub async fn join(self) -> EngineResult<T> {
        match self {
            Scheduled::Ready(result) => result,
            Scheduled::Spawned { task, receiver } => receiver
                .await
                .unwrap_or(Err(EngineError::TaskAborted { task })),
        }
    }
}

/// Run `future` on `executor`, or inline when there is none
///
/// Spawned tasks carry the current tracing span.
pub async fn schedule<T: Send + 'static>(
    executor: Option<&dyn TaskExecutor>,
    task: String,
    future: BoxFuture<'static, EngineResult<T>>,
) -> Scheduled<T> {
    match executor {
        None => Scheduled::Ready(future.await),
        Some(executor) => {
            tracing::trace!(task = %task, "submitting resolution task");
            let (sender, receiver) = oneshot::channel();
            let span = tracing::Span::current();
            executor.spawn(Box::pin(
                async move {
                    // receiver gone means the pipeline already failed
                    let _ = sender.send(future.await);
                }
                .instrument(span),
            ));
            Scheduled::Spawned { task, receiver }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    /// Executor that drops every task without running it
    struct DroppingExecutor;

    impl TaskExecutor for DroppingExecutor {
        fn spawn(&self, task: BoxFuture<'static, ()>) {
            drop(task);
        }
    }

    #[tokio::test]
    async fn test_inline_schedule_is_ready() {
        let scheduled = schedule(None, "t".into(), async { Ok(7) }.boxed()).await;
        assert!(matches!(scheduled, Scheduled::Ready(Ok(7))));
        assert_eq!(scheduled.join().await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_executor_runs_task() {
        let executor = TokioExecutor::current();
        let scheduled = schedule(Some(&executor), "t".into(), async { Ok("done") }.boxed()).await;
        assert!(matches!(scheduled, Scheduled::Spawned { .. }));
        assert_eq!(scheduled.join().await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_dropped_task_reports_abort() {
        let scheduled = schedule(
            Some(&DroppingExecutor),
            "tags#1".into(),
            async { Ok(()) }.boxed(),
        )
        .await;
        match scheduled.join().await {
            Err(EngineError::TaskAborted { task }) => assert_eq!(task, "tags#1"),
            other => panic!("expected TaskAborted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_errors_are_passed_through() {
        let executor = TokioExecutor::current();
        let scheduled: Scheduled<()> = schedule(
            Some(&executor),
            "t".into(),
            async { Err(EngineError::not_found("tags", "1")) }.boxed(),
        )
        .await;
        assert!(scheduled.join().await.unwrap_err().is_not_found());
    }
}
