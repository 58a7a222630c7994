//! The reconciliation loop.
//!
//! Every `interval` the scheduler runs one cycle: take the cross-process lock, sweep expired orders, check that the
//! ledger is healthy, and hand one [`ReconciliationTask`] per live pending order to the worker pool.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

use super::{
    breaker::{BreakerSnapshot, FailureTracker},
    errors::PoolError,
    lock::FileLock,
    task::{ReconcileContext, ReconciliationTask},
    worker_pool::{PoolStats, WorkerPool},
};
use crate::{
    config::{MonitorConfig, PaymentConfig},
    db::traits::OrderStore,
    events::EventProducers,
    ledger::LedgerClient,
    matching::MatchPolicy,
    notifier::MerchantNotifier,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOutcome {
    Recovered,
    Failed,
}

/// A summary of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    /// The lock was held elsewhere, or could not be taken.
    pub skipped: bool,
    pub expired_deleted: u64,
    /// Set when the failure tracker was paused at the start of the cycle.
    pub trial: Option<TrialOutcome>,
    pub enumerated: usize,
    pub submitted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorHealth {
    Healthy,
    Degraded,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub status: MonitorHealth,
    pub running: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub message: String,
    pub pool: PoolStats,
    pub last_cycle: Option<CycleReport>,
}

struct SchedulerInner<B, L, N> {
    config: MonitorConfig,
    order_timeout: Duration,
    ctx: Arc<ReconcileContext<B, L, N>>,
    pool: WorkerPool,
    lock: FileLock,
    running: AtomicBool,
    stop_signal: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    last_cycle: Mutex<Option<CycleReport>>,
}

/// Drives reconciliation cycles. Clones share the same loop, pool and failure tracker.
pub struct ReconciliationScheduler<B, L, N> {
    inner: Arc<SchedulerInner<B, L, N>>,
}

impl<B, L, N> Clone for ReconciliationScheduler<B, L, N> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B, L, N> ReconciliationScheduler<B, L, N>
where
    B: OrderStore,
    L: LedgerClient,
    N: MerchantNotifier,
{
    pub fn new(
        db: B,
        ledger: L,
        notifier: N,
        producers: EventProducers,
        payment: &PaymentConfig,
        config: MonitorConfig,
    ) -> Self {
        let ctx = ReconcileContext {
            db,
            ledger,
            notifier,
            tracker: FailureTracker::new(config.failure_threshold),
            policy: MatchPolicy::new(payment.business_qr_mode, payment.match_tolerance),
            producers,
            monitoring_window: config.monitoring_window,
            ledger_lookback_hours: config.ledger_lookback_hours,
        };
        let (stop_signal, _) = watch::channel(false);
        let inner = SchedulerInner {
            pool: WorkerPool::new(config.worker_count, config.queue_size),
            lock: FileLock::new(&config.lock_path, config.lock_timeout),
            order_timeout: payment.order_timeout,
            config,
            ctx: Arc::new(ctx),
            running: AtomicBool::new(false),
            stop_signal,
            loop_handle: Mutex::new(None),
            last_cycle: Mutex::new(None),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn tracker(&self) -> &FailureTracker {
        &self.inner.ctx.tracker
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Starts the worker pool and the interval loop. Does nothing if monitoring is disabled or already running.
    pub fn start(&self) -> bool {
        if !self.inner.config.enabled {
            info!("🔄️ Payment monitoring is disabled. The reconciliation scheduler will not run");
            return false;
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("🔄️ Reconciliation scheduler is already running");
            return false;
        }
        self.inner.pool.start();
        self.inner.stop_signal.send_replace(false);
        let mut stop = self.inner.stop_signal.subscribe();
        let scheduler = self.clone();
        let period = self.inner.config.interval;
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("🔄️ Reconciliation scheduler started. Cycle interval: {period:?}");
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let report = scheduler.run_cycle().await;
                        trace!("🔄️ Cycle finished: {report:?}");
                    },
                    _ = stop.changed() => break,
                }
            }
            info!("🔄️ Reconciliation scheduler loop exited");
        });
        *self.inner.loop_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        true
    }

    /// Stops the loop and waits for queued reconciliation work to drain.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("🔄️ Reconciliation scheduler is not running");
            return;
        }
        self.inner.stop_signal.send_replace(true);
        let handle = self.inner.loop_handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("🔄️ Reconciliation loop did not exit cleanly. {e}");
            }
        }
        self.inner.pool.stop().await;
        info!("🔄️ Reconciliation scheduler stopped");
    }

    /// Runs one reconciliation cycle right now. The loop calls this on every tick; operators and tests can call it
    /// directly. The worker pool must be started for any work to be dispatched.
    pub async fn run_cycle(&self) -> CycleReport {
        let inner = &self.inner;
        let ctx = &inner.ctx;
        let now = Utc::now();
        let mut report = CycleReport { started_at: Some(now), ..Default::default() };

        let guard = match inner.lock.try_acquire() {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                debug!("🔄️ Another process holds the reconciliation lock. Skipping this cycle");
                report.skipped = true;
                return self.record(report);
            },
            Err(e) => {
                error!("🔄️ Could not take the reconciliation lock. {e}");
                report.skipped = true;
                return self.record(report);
            },
        };

        if inner.config.auto_cleanup {
            match ctx.db.delete_expired_orders(now - inner.order_timeout).await {
                Ok(count) => report.expired_deleted = count,
                Err(e) => warn!("🔄️ Could not clean up expired orders. {e}"),
            }
        }

        if ctx.tracker.is_paused() {
            match ctx.ledger.query_recent_bills(ctx.ledger_lookback_hours).await {
                Ok(_) => {
                    ctx.tracker.record_success();
                    report.trial = Some(TrialOutcome::Recovered);
                },
                Err(e) => {
                    ctx.tracker.record_failure(&e.to_string());
                    report.trial = Some(TrialOutcome::Failed);
                    debug!("🔄️ Reconciliation is paused and the ledger is still failing");
                    drop(guard);
                    return self.record(report);
                },
            }
        }

        let orders = match ctx.db.fetch_pending_orders_since(now - ctx.monitoring_window).await {
            Ok(orders) => orders,
            Err(e) => {
                error!("🔄️ Could not fetch pending orders. {e}");
                drop(guard);
                return self.record(report);
            },
        };
        report.enumerated = orders.len();
        for order in orders {
            let task = ReconciliationTask::new(order.trade_no, Arc::clone(ctx));
            match inner.pool.submit(Box::new(task)) {
                Ok(()) => report.submitted += 1,
                Err(PoolError::QueueFull) => report.rejected += 1,
                Err(e) => {
                    warn!("🔄️ Could not dispatch reconciliation work. {e}");
                    report.rejected += 1;
                },
            }
        }
        if report.rejected > 0 {
            warn!("🔄️ {} of {} reconciliation tasks were rejected", report.rejected, report.enumerated);
        } else if report.submitted > 0 {
            debug!("🔄️ Dispatched {} reconciliation tasks", report.submitted);
        }
        drop(guard);
        self.record(report)
    }

    fn record(&self, report: CycleReport) -> CycleReport {
        *self.inner.last_cycle.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
        report
    }

    /// Clears a paused failure tracker.
    pub fn resume(&self) {
        self.inner.ctx.tracker.resume();
    }

    pub fn status(&self) -> MonitorStatus {
        let snap = self.inner.ctx.tracker.snapshot();
        let running = self.is_running();
        let (status, message) = describe_health(running, &snap);
        MonitorStatus {
            status,
            running,
            consecutive_failures: snap.consecutive_failures,
            failure_threshold: snap.threshold,
            last_success_at: snap.last_success_at,
            last_error: snap.last_error,
            message,
            pool: self.inner.pool.stats(),
            last_cycle: self.inner.last_cycle.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }
}

fn describe_health(running: bool, snap: &BreakerSnapshot) -> (MonitorHealth, String) {
    if !running {
        (MonitorHealth::Stopped, "Payment monitoring is not running.".to_string())
    } else if snap.paused {
        let message = format!(
            "Reconciliation is paused after {} consecutive ledger failures. Check the ledger credentials and \
             connectivity. It resumes automatically once a query succeeds, or manually via resume.",
            snap.consecutive_failures
        );
        (MonitorHealth::Paused, message)
    } else if snap.consecutive_failures > 0 {
        let message =
            format!("{} of {} allowed consecutive ledger failures.", snap.consecutive_failures, snap.threshold);
        (MonitorHealth::Degraded, message)
    } else {
        (MonitorHealth::Healthy, "Payment monitoring is running normally.".to_string())
    }
}
