use std::path::PathBuf;

use thiserror::Error;

use crate::{db::traits::OrderStoreError, ledger::LedgerError};

#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("The worker pool has not been started")]
    NotStarted,
    #[error("The worker pool has been stopped")]
    Stopped,
    #[error("The task queue is full")]
    QueueFull,
}

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Lock file {0} is held by another process")]
    Held(PathBuf),
    #[error("Lock file I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("Ledger query failed. {0}")]
    Ledger(#[from] LedgerError),
    #[error("Order store error. {0}")]
    Store(#[from] OrderStoreError),
    #[error("The task was cancelled by shutdown")]
    Cancelled,
}
