//! # Reconciliation
//!
//! Payment confirmation works by polling. The [`ReconciliationScheduler`] fires a cycle on a fixed interval. Each
//! cycle takes a cross-process [`FileLock`] and fans the pending orders out to a [`WorkerPool`] as
//! [`ReconciliationTask`]s. Each task asks the ledger for recent bills and settles its order on a match. Ledger
//! failures are counted by a [`FailureTracker`], which pauses reconciliation when the ledger is persistently down.
mod breaker;
mod errors;
mod lock;
mod scheduler;
mod task;
mod worker_pool;

pub use breaker::{BreakerSnapshot, FailureTracker, DEFAULT_FAILURE_THRESHOLD};
pub use errors::{LockError, PoolError, ReconciliationError};
pub use lock::{FileLock, LockGuard, LockRecord};
pub use scheduler::{CycleReport, MonitorHealth, MonitorStatus, TrialOutcome, ReconciliationScheduler};
pub use task::{ReconcileContext, ReconciliationTask, TaskOutcome};
pub use worker_pool::{PoolStats, ShutdownSignal, Task, WorkerPool, DEFAULT_QUEUE_SIZE, DEFAULT_WORKER_COUNT};
