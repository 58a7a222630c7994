use ledger_payment_engine::{
    ledger::LedgerClient,
    notifier::MerchantNotifier,
    reconciliation::{MonitorStatus, ReconciliationScheduler},
    OrderStore,
};

/// What the operator routes need from the reconciliation engine.
pub trait MonitorControl: Clone + Send + Sync + 'static {
    fn status(&self) -> MonitorStatus;

    /// Clears a paused failure tracker and reports the status afterwards.
    fn resume(&self) -> MonitorStatus;
}

impl<B, L, N> MonitorControl for ReconciliationScheduler<B, L, N>
where
    B: OrderStore,
    L: LedgerClient,
    N: MerchantNotifier,
{
    fn status(&self) -> MonitorStatus {
        ReconciliationScheduler::status(self)
    }

    fn resume(&self) -> MonitorStatus {
        ReconciliationScheduler::resume(self);
        ReconciliationScheduler::status(self)
    }
}
