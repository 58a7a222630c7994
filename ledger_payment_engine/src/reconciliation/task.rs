use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::{future::BoxFuture, FutureExt};
use log::*;

use super::{
    breaker::FailureTracker,
    errors::ReconciliationError,
    worker_pool::{ShutdownSignal, Task},
};
use crate::{
    db::traits::OrderStore,
    db_types::{BillRecord, Order, StatusUpdate, TradeNo},
    events::{EventProducers, OrderPaidEvent},
    ledger::LedgerClient,
    matching::MatchPolicy,
    notifier::MerchantNotifier,
};

/// Everything a reconciliation task needs. Shared by every task of a scheduler.
pub struct ReconcileContext<B, L, N> {
    pub db: B,
    pub ledger: L,
    pub notifier: N,
    pub tracker: FailureTracker,
    pub policy: MatchPolicy,
    pub producers: EventProducers,
    /// Orders older than this are left alone.
    pub monitoring_window: Duration,
    pub ledger_lookback_hours: u32,
}

/// What happened to one order during a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The order is gone, no longer pending, or outside the monitoring window.
    Skipped,
    NoMatch,
    Paid(Order),
    /// A matching bill was found, but another task settled the order first.
    AlreadySettled,
    /// The ledger has been failing and reconciliation is paused, so the ledger was not queried.
    Paused,
}

/// Checks the ledger for a payment against a single pending order.
pub struct ReconciliationTask<B, L, N> {
    trade_no: TradeNo,
    ctx: Arc<ReconcileContext<B, L, N>>,
}

impl<B, L, N> ReconciliationTask<B, L, N>
where
    B: OrderStore,
    L: LedgerClient,
    N: MerchantNotifier,
{
    pub fn new(trade_no: TradeNo, ctx: Arc<ReconcileContext<B, L, N>>) -> Self {
        Self { trade_no, ctx }
    }

    pub async fn run(self, shutdown: ShutdownSignal) -> Result<TaskOutcome, ReconciliationError> {
        let ctx = &self.ctx;
        let order = match ctx.db.fetch_order_by_trade_no(&self.trade_no).await? {
            Some(o) if o.is_pending() => o,
            Some(_) | None => {
                trace!("🔄️ Order {} is no longer pending", self.trade_no);
                return Ok(TaskOutcome::Skipped);
            },
        };
        let window_start = Utc::now() - ctx.monitoring_window;
        if order.created_at < window_start {
            debug!("🔄️ Order {} is older than the monitoring window", order.trade_no);
            return Ok(TaskOutcome::Skipped);
        }
        if ctx.tracker.is_paused() {
            debug!("🔄️ Reconciliation is paused. Not querying the ledger for order {}", order.trade_no);
            return Ok(TaskOutcome::Paused);
        }

        let bills = tokio::select! {
            _ = shutdown.cancelled() => return Err(ReconciliationError::Cancelled),
            bills = ctx.ledger.query_recent_bills(ctx.ledger_lookback_hours) => bills,
        };
        let bills = match bills {
            Ok(bills) => {
                ctx.tracker.record_success();
                bills
            },
            Err(e) => {
                ctx.tracker.record_failure(&e.to_string());
                return Err(e.into());
            },
        };

        for bill in bills.iter().filter(|b| ctx.policy.matches(&order, b)) {
            if ctx.db.is_bill_claimed(&bill.counterparty_trade_id).await? {
                trace!("🔄️ Ledger entry {} has already paid another order", bill.counterparty_trade_id);
                continue;
            }
            if ctx.policy.is_business_qr() && !self.is_claimant(&order, bill, window_start).await? {
                continue;
            }
            if shutdown.is_shutdown() {
                return Err(ReconciliationError::Cancelled);
            }
            return self.settle(&order, bill).await;
        }
        trace!("🔄️ No ledger entry matches order {}", order.trade_no);
        Ok(TaskOutcome::NoMatch)
    }

    /// Whether `order` is the one that `bill` should settle when several pending orders share the amount.
    async fn is_claimant(
        &self,
        order: &Order,
        bill: &BillRecord,
        window_start: chrono::DateTime<Utc>,
    ) -> Result<bool, ReconciliationError> {
        let candidates = self.ctx.db.fetch_pending_orders_with_amount(bill.amount, window_start).await?;
        match self.ctx.policy.resolve_claimant(&candidates, bill) {
            Some(claimant) if claimant.trade_no != order.trade_no => {
                debug!(
                    "🔄️ Ledger entry {} is claimed by earlier order {}, not {}",
                    bill.counterparty_trade_id, claimant.trade_no, order.trade_no
                );
                Ok(false)
            },
            _ => Ok(true),
        }
    }

    async fn settle(&self, order: &Order, bill: &BillRecord) -> Result<TaskOutcome, ReconciliationError> {
        let ctx = &self.ctx;
        match ctx.db.mark_order_paid(&order.trade_no, Utc::now(), &bill.counterparty_trade_id).await? {
            StatusUpdate::Updated(paid) => {
                info!(
                    "🔄️ Order {} ({}) paid by ledger entry {} for {}",
                    paid.trade_no, paid.out_trade_no, bill.counterparty_trade_id, bill.amount
                );
                ctx.producers.publish_order_paid(OrderPaidEvent::new(paid.clone())).await;
                if let Err(e) = ctx.notifier.notify(&paid).await {
                    error!("📬️ Could not notify merchant about order {}. {e}", paid.trade_no);
                }
                Ok(TaskOutcome::Paid(paid))
            },
            StatusUpdate::Unchanged(o) => {
                debug!(
                    "🔄️ Order {} was already {} when ledger entry {} matched",
                    o.trade_no, o.status, bill.counterparty_trade_id
                );
                Ok(TaskOutcome::AlreadySettled)
            },
        }
    }
}

impl<B, L, N> Task for ReconciliationTask<B, L, N>
where
    B: OrderStore,
    L: LedgerClient,
    N: MerchantNotifier,
{
    fn describe(&self) -> String {
        format!("reconciliation of order {}", self.trade_no)
    }

    fn execute(self: Box<Self>, shutdown: ShutdownSignal) -> BoxFuture<'static, Result<(), ReconciliationError>> {
        async move { (*self).run(shutdown).await.map(|_| ()) }.boxed()
    }
}
