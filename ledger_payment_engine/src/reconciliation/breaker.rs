use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::*;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Default)]
struct BreakerState {
    consecutive_failures: u32,
    paused: bool,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// A point-in-time copy of the failure tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub paused: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Counts consecutive ledger failures and pauses reconciliation once they reach the threshold. A single success
/// clears everything.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    threshold: u32,
    state: Arc<Mutex<BreakerState>>,
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1), state: Arc::new(Mutex::new(BreakerState::default())) }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BreakerState) -> T) -> T {
        // A poisoned lock only means another thread panicked mid-update. The counters are still usable.
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn record_success(&self) {
        let resumed = self.with_state(|s| {
            let was_paused = s.paused;
            s.consecutive_failures = 0;
            s.paused = false;
            s.last_error = None;
            s.last_success_at = Some(Utc::now());
            was_paused
        });
        if resumed {
            info!("🔌️ Ledger queries are succeeding again. Reconciliation resumed");
        }
    }

    /// Records a failure. Returns true if this failure tripped the breaker.
    pub fn record_failure(&self, error: &str) -> bool {
        let threshold = self.threshold;
        let (count, tripped) = self.with_state(|s| {
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_error = Some(error.to_string());
            let tripped = !s.paused && s.consecutive_failures >= threshold;
            if tripped {
                s.paused = true;
            }
            (s.consecutive_failures, tripped)
        });
        if tripped {
            error!("🔌️ {count} consecutive ledger failures. Reconciliation is paused. Last error: {error}");
        } else {
            warn!("🔌️ Ledger failure {count}/{threshold}: {error}");
        }
        tripped
    }

    pub fn is_paused(&self) -> bool {
        self.with_state(|s| s.paused)
    }

    /// Manual operator override.
    pub fn resume(&self) {
        self.with_state(|s| {
            s.consecutive_failures = 0;
            s.paused = false;
        });
        info!("🔌️ Reconciliation resumed manually");
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let threshold = self.threshold;
        self.with_state(|s| BreakerSnapshot {
            consecutive_failures: s.consecutive_failures,
            threshold,
            paused: s.paused,
            last_success_at: s.last_success_at,
            last_error: s.last_error.clone(),
        })
    }
}
