//! In-memory stand-ins for the gateway's external collaborators.
use std::sync::{Arc, Mutex};

use crate::{
    db_types::{BillRecord, Order},
    ledger::{LedgerClient, LedgerError},
    notifier::{MerchantNotifier, NotificationError, NotifyOutcome},
};

#[derive(Debug, Default)]
struct LedgerState {
    bills: Vec<BillRecord>,
    failing: bool,
    calls: usize,
}

/// A ledger whose contents and availability are controlled by the test.
#[derive(Debug, Clone, Default)]
pub struct FakeLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bill(&self, bill: BillRecord) {
        self.state.lock().unwrap().bills.push(bill);
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }
}

impl LedgerClient for FakeLedger {
    async fn query_recent_bills(&self, _hours_back: u32) -> Result<Vec<BillRecord>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if state.failing {
            return Err(LedgerError::Transport("ledger unavailable".to_string()));
        }
        Ok(state.bills.clone())
    }
}

/// Records every order it is asked to notify about.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Order>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Order> {
        self.sent.lock().unwrap().clone()
    }
}

impl MerchantNotifier for RecordingNotifier {
    async fn notify(&self, order: &Order) -> Result<NotifyOutcome, NotificationError> {
        self.sent.lock().unwrap().push(order.clone());
        Ok(NotifyOutcome::Acknowledged)
    }
}
