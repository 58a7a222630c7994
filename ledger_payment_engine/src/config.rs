//! Runtime settings for the engine. The server crate populates these from the environment; everything here has a
//! sensible default so that tests and embedders can start from `Default::default()`.
use std::{path::PathBuf, time::Duration as StdDuration};

use chrono::{Duration, FixedOffset, Offset, Utc};
use lpg_common::{Money, Secret};

/// The payment type the gateway accepts when nothing else is configured.
pub const DEFAULT_PAYMENT_TYPE: &str = "alipay";

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub merchant_id: String,
    pub merchant_key: Secret<String>,
    pub supported_types: Vec<String>,
    /// When enabled, payers scan a single static QR code and orders are told apart by amount alone.
    pub business_qr_mode: bool,
    /// Added to a contested payable amount until it is unique.
    pub amount_offset: Money,
    /// Maximum delay between order creation and the payer's transfer for an amount-only match.
    pub match_tolerance: Duration,
    /// Pending orders older than this no longer reserve their payable amount and are eligible for cleanup.
    pub order_timeout: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            merchant_id: "1001".to_string(),
            merchant_key: Secret::default(),
            supported_types: vec![DEFAULT_PAYMENT_TYPE.to_string()],
            business_qr_mode: false,
            amount_offset: Money::from_cents(1),
            match_tolerance: Duration::seconds(300),
            order_timeout: Duration::seconds(300),
        }
    }
}

impl PaymentConfig {
    pub fn supports_type(&self, payment_type: &str) -> bool {
        self.supported_types.iter().any(|t| t == payment_type)
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Time between reconciliation cycles.
    pub interval: StdDuration,
    /// How long a reconciliation lock stays valid before another process may seize it.
    pub lock_timeout: StdDuration,
    pub lock_path: PathBuf,
    /// Delete expired pending orders at the start of each cycle.
    pub auto_cleanup: bool,
    pub worker_count: usize,
    pub queue_size: usize,
    /// Consecutive ledger failures that pause reconciliation.
    pub failure_threshold: u32,
    /// Only pending orders created within this window are reconciled.
    pub monitoring_window: Duration,
    pub ledger_lookback_hours: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: StdDuration::from_secs(5),
            lock_timeout: StdDuration::from_secs(60),
            lock_path: PathBuf::from("data/reconciliation.lock"),
            auto_cleanup: true,
            worker_count: 5,
            queue_size: 100,
            failure_threshold: 5,
            monitoring_window: Duration::minutes(10),
            ledger_lookback_hours: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub timeout: StdDuration,
    /// Total delivery attempts per notification. 1 means a single attempt with no retry.
    pub max_attempts: u32,
    /// Delay before the first retry. Doubles after every failed attempt.
    pub retry_backoff: StdDuration,
    /// Callback hosts that are never contacted. Notifications to them are treated as acknowledged.
    pub sandbox_hosts: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout: StdDuration::from_secs(10),
            max_attempts: 1,
            retry_backoff: StdDuration::from_secs(2),
            sandbox_hosts: vec!["example.com".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// The bill query endpoint.
    pub url: String,
    pub app_id: String,
    pub secret: Secret<String>,
    /// The UTC offset of the timestamps the ledger reports.
    pub timezone: FixedOffset,
    pub timeout: StdDuration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000/bills".to_string(),
            app_id: String::default(),
            secret: Secret::default(),
            timezone: FixedOffset::east_opt(8 * 3600).unwrap_or(Utc.fix()),
            timeout: StdDuration::from_secs(15),
        }
    }
}
