//! The scheduling primitive the adapter consumes from the host runtime.
//!
//! The host model is N single-threaded I/O loops plus one bounded worker
//! pool for blocking work. The adapter never spawns threads of its own; it
//! only schedules onto these two pools and onto repeating timer tasks owned
//! by the scheduler.

use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A unit of work handed to the scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// The two thread pools the host runtime exposes, plus timers.
pub trait Scheduler: Send + Sync {
    /// Runs a task on the runtime's I/O loop pool.
    fn run_on_loop(&self, task: Task);

    /// Runs a task on the bounded worker pool. The returned handle can be
    /// used to cancel the task; dropping it detaches the task.
    fn run_on_worker(&self, task: Task) -> WorkerHandle;

    /// Runs a task repeatedly, every `interval`, until the returned handle
    /// is cancelled or dropped by its owner.
    fn schedule_repeating(&self, interval: Duration, task: Box<dyn FnMut() + Send + 'static>) -> WorkerHandle;
}

/// A cancellation handle for a scheduled task.
pub struct WorkerHandle {
    inner: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(inner: JoinHandle<()>) -> Self {
        Self { inner }
    }

    /// Requests cancellation. Already-running blocking tasks run to
    /// completion; timer tasks stop at the next tick.
    pub fn cancel(&self) {
        self.inner.abort();
    }

    /// Waits for the task to finish. Returns `false` if it was cancelled.
    pub async fn join(self) -> bool {
        self.inner.await.is_ok()
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle").field("finished", &self.inner.is_finished()).finish()
    }
}

/// [`Scheduler`] implementation over a tokio runtime: the loop pool is the
/// runtime's executor, the worker pool is `spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn run_on_loop(&self, task: Task) {
        tokio::spawn(async move {
            task();
        });
    }

    fn run_on_worker(&self, task: Task) -> WorkerHandle {
        debug!("offloading task to the blocking pool");
        WorkerHandle::new(tokio::task::spawn_blocking(task))
    }

    fn schedule_repeating(&self, interval: Duration, mut task: Box<dyn FnMut() + Send + 'static>) -> WorkerHandle {
        debug!(?interval, "starting repeating task");
        WorkerHandle::new(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                task();
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_task_runs_off_the_loop() {
        let scheduler = TokioScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = scheduler.run_on_worker(Box::new(move || {
            // blocking work is fine here, we are on the worker pool
            std::thread::sleep(Duration::from_millis(10));
            let _ = tx.send(42);
        }));

        assert_eq!(rx.await.unwrap(), 42);
        assert!(handle.join().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn repeating_task_ticks_until_cancelled() {
        let scheduler = TokioScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let handle = scheduler.schedule_repeating(
            Duration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel();
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected at least two ticks, saw {seen}");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ticks.load(Ordering::SeqCst) <= seen + 1, "timer kept ticking after cancel");
    }
}
