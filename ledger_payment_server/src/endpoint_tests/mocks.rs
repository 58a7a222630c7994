use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use ledger_payment_engine::reconciliation::{FailureTracker, MonitorHealth, MonitorStatus, PoolStats};

use crate::monitor::MonitorControl;

/// A stand-in for the scheduler, backed by a real failure tracker.
#[derive(Clone, Default)]
pub struct MockMonitor {
    pub tracker: FailureTracker,
    pub resumes: Arc<AtomicUsize>,
}

impl MockMonitor {
    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl MonitorControl for MockMonitor {
    fn status(&self) -> MonitorStatus {
        let snap = self.tracker.snapshot();
        let status = if snap.paused {
            MonitorHealth::Paused
        } else if snap.consecutive_failures > 0 {
            MonitorHealth::Degraded
        } else {
            MonitorHealth::Healthy
        };
        MonitorStatus {
            status,
            running: true,
            consecutive_failures: snap.consecutive_failures,
            failure_threshold: snap.threshold,
            last_success_at: snap.last_success_at,
            last_error: snap.last_error,
            message: String::from("mock"),
            pool: PoolStats {
                worker_count: 5,
                queue_capacity: 100,
                queue_length: 0,
                started: true,
                completed: 0,
                failed: 0,
                rejected: 0,
            },
            last_cycle: None,
        }
    }

    fn resume(&self) -> MonitorStatus {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.tracker.resume();
        self.status()
    }
}
