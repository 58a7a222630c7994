//! A fixed set of workers draining a bounded FIFO queue.
//!
//! Submission never blocks: a full queue is reported straight back to the caller. Every task runs in its own spawned
//! task so that a panic is contained and logged without taking its worker down.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
    Mutex,
};

use futures_util::future::BoxFuture;
use log::*;
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch, Mutex as AsyncMutex},
    task::JoinHandle,
};

use super::errors::{PoolError, ReconciliationError};

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Cancelled once when the pool stops. Tasks check it at their suspension points.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            // The pool is gone without ever signalling, so nobody will cancel us
            std::future::pending::<()>().await;
        }
    }
}

/// A unit of work for the pool.
pub trait Task: Send + 'static {
    /// Used in log messages.
    fn describe(&self) -> String;

    fn execute(self: Box<Self>, shutdown: ShutdownSignal) -> BoxFuture<'static, Result<(), ReconciliationError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub queue_length: usize,
    pub started: bool,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}

type TaskSender = mpsc::Sender<Box<dyn Task>>;

enum PoolState {
    Idle,
    Running { sender: TaskSender, workers: Vec<JoinHandle<()>> },
    Stopped,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Clones share the same workers and queue.
#[derive(Clone)]
pub struct WorkerPool {
    worker_count: usize,
    queue_size: usize,
    state: Arc<Mutex<PoolState>>,
    shutdown: Arc<watch::Sender<bool>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(worker_count: usize, queue_size: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker_count: worker_count.max(1),
            queue_size: queue_size.max(1),
            state: Arc::new(Mutex::new(PoolState::Idle)),
            shutdown: Arc::new(shutdown),
            counters: Arc::new(Counters::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal { rx: self.shutdown.subscribe() }
    }

    pub fn start(&self) {
        let mut state = self.state();
        match *state {
            PoolState::Running { .. } => {
                warn!("👷️ Worker pool is already running");
                return;
            },
            PoolState::Stopped => {
                warn!("👷️ Worker pool has been stopped and cannot be restarted");
                return;
            },
            PoolState::Idle => {},
        }
        let (sender, receiver) = mpsc::channel::<Box<dyn Task>>(self.queue_size);
        let receiver = Arc::new(AsyncMutex::new(receiver));
        let workers = (0..self.worker_count)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                let shutdown = self.shutdown_signal();
                let counters = Arc::clone(&self.counters);
                tokio::spawn(run_worker(id, receiver, shutdown, counters))
            })
            .collect();
        *state = PoolState::Running { sender, workers };
        info!("👷️ Worker pool started with {} workers and a queue of {}", self.worker_count, self.queue_size);
    }

    /// Queues a task without waiting.
    pub fn submit(&self, task: Box<dyn Task>) -> Result<(), PoolError> {
        let state = self.state();
        let sender = match &*state {
            PoolState::Idle => return Err(PoolError::NotStarted),
            PoolState::Stopped => return Err(PoolError::Stopped),
            PoolState::Running { sender, .. } => sender,
        };
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                debug!("👷️ Queue full. Rejected {}", task.describe());
                Err(PoolError::QueueFull)
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Stopped),
        }
    }

    /// Closes the queue, signals shutdown and waits for every worker to drain the queue and exit.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state(), PoolState::Stopped);
        let workers = match previous {
            PoolState::Running { sender, workers } => {
                drop(sender);
                workers
            },
            _ => {
                debug!("👷️ Worker pool was not running");
                return;
            },
        };
        info!("👷️ Stopping worker pool");
        self.shutdown.send_replace(true);
        for (id, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("👷️ Worker {id} did not shut down cleanly. {e}");
            }
        }
        info!("👷️ Worker pool stopped");
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state();
        let (started, queue_length) = match &*state {
            PoolState::Running { sender, .. } => (true, sender.max_capacity() - sender.capacity()),
            _ => (false, 0),
        };
        PoolStats {
            worker_count: self.worker_count,
            queue_capacity: self.queue_size,
            queue_length,
            started,
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Box<dyn Task>>>>,
    shutdown: ShutdownSignal,
    counters: Arc<Counters>,
) {
    trace!("👷️ Worker {id} started");
    loop {
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };
        let description = task.describe();
        trace!("👷️ Worker {id} running {description}");
        match tokio::spawn(task.execute(shutdown.clone())).await {
            Ok(Ok(())) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
            },
            Ok(Err(ReconciliationError::Cancelled)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                debug!("👷️ Worker {id}: {description} was cancelled by shutdown");
            },
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("👷️ Worker {id}: {description} failed. {e}");
            },
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("👷️ Worker {id}: {description} panicked. {e}");
            },
        }
    }
    trace!("👷️ Worker {id} exited");
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures_util::FutureExt;
    use tokio::sync::Notify;

    use super::*;

    struct CountingTask {
        id: usize,
        done: Arc<AtomicU64>,
        gate: Option<Arc<Notify>>,
        panic: bool,
    }

    impl Task for CountingTask {
        fn describe(&self) -> String {
            format!("counting task {}", self.id)
        }

        fn execute(self: Box<Self>, shutdown: ShutdownSignal) -> BoxFuture<'static, Result<(), ReconciliationError>> {
            async move {
                if self.panic {
                    panic!("task {} blew up", self.id);
                }
                if let Some(gate) = &self.gate {
                    tokio::select! {
                        _ = gate.notified() => {},
                        _ = shutdown.cancelled() => return Err(ReconciliationError::Cancelled),
                    }
                }
                self.done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    fn task(id: usize, done: &Arc<AtomicU64>) -> Box<dyn Task> {
        Box::new(CountingTask { id, done: done.clone(), gate: None, panic: false })
    }

    #[tokio::test]
    async fn submit_before_start_and_after_stop() {
        let pool = WorkerPool::new(2, 4);
        let done = Arc::new(AtomicU64::new(0));
        assert!(matches!(pool.submit(task(0, &done)), Err(PoolError::NotStarted)));
        pool.start();
        pool.start();
        pool.stop().await;
        assert!(matches!(pool.submit(task(1, &done)), Err(PoolError::Stopped)));
        assert!(!pool.stats().started);
    }

    #[tokio::test]
    async fn rejects_past_capacity_and_drains_on_stop() {
        let _ = env_logger::try_init();
        let pool = WorkerPool::new(1, 2);
        pool.start();
        let done = Arc::new(AtomicU64::new(0));
        let gate = Arc::new(Notify::new());
        // Occupy the single worker
        pool.submit(Box::new(CountingTask { id: 0, done: done.clone(), gate: Some(gate.clone()), panic: false }))
            .unwrap();
        // Wait until the worker has dequeued the blocking task
        for _ in 0..100 {
            if pool.stats().queue_length == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.submit(task(1, &done)).unwrap();
        pool.submit(task(2, &done)).unwrap();
        assert!(matches!(pool.submit(task(3, &done)), Err(PoolError::QueueFull)));
        let stats = pool.stats();
        assert_eq!(stats.queue_length, 2);
        assert_eq!(stats.rejected, 1);

        pool.stop().await;
        // The blocked task observed shutdown; the queued ones still ran to completion
        assert_eq!(done.load(Ordering::SeqCst), 2);
        let stats = pool.stats();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_kill_its_worker() {
        let pool = WorkerPool::new(1, 10);
        pool.start();
        let done = Arc::new(AtomicU64::new(0));
        pool.submit(Box::new(CountingTask { id: 0, done: done.clone(), gate: None, panic: true })).unwrap();
        for i in 1..=3 {
            pool.submit(task(i, &done)).unwrap();
        }
        pool.stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 3);
    }
}
