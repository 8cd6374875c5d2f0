//! Background task lifecycle (§5, §9 redesign flag): the teacher spawns its
//! project/ECR/Kubernetes controller loops with a bare `tokio::spawn` and a
//! `match` that logs on error, with no handle kept around to cancel or join
//! them on shutdown. `Supervisor` generalizes that into a small registry:
//! each task gets its own `CancellationToken`, panics are caught so one
//! failing loop cannot take the process down, and `shutdown` cancels and
//! joins every task in LIFO order.

#![cfg(feature = "server")]

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

struct Task {
    name: &'static str,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct Supervisor {
    tasks: Vec<Task>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Spawns `make_future(cancel)`, restarting it once if it panics. A
    /// second panic leaves the task stopped rather than looping forever on a
    /// hard failure.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, make_future: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            for attempt in 0..2u32 {
                let outcome = AssertUnwindSafe(make_future(task_cancel.clone()))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(()) => return,
                    Err(_) if task_cancel.is_cancelled() => return,
                    Err(_) => error!(task = name, attempt, "background task panicked, restarting"),
                }
            }
            error!(task = name, "background task panicked twice, giving up");
        });
        self.tasks.push(Task { name, handle, cancel });
    }

    /// Cancels and joins every registered task, most-recently-spawned first.
    pub async fn shutdown(self) {
        for task in self.tasks.into_iter().rev() {
            task.cancel.cancel();
            match task.handle.await {
                Ok(()) => info!(task = task.name, "background task stopped"),
                Err(e) => error!(task = task.name, error = %e, "background task join failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_cancels_and_joins_running_task() {
        let mut sup = Supervisor::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticks_clone = ticks.clone();
        sup.spawn("counter", move |cancel| {
            let ticks = ticks_clone.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(std::time::Duration::from_millis(5)) => {
                            ticks.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sup.shutdown().await;
        assert!(ticks.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn panicking_task_restarts_then_gives_up() {
        let mut sup = Supervisor::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        sup.spawn("flaky", move |_cancel| {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sup.shutdown().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
