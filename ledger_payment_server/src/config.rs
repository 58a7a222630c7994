use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration as StdDuration};

use chrono::{Duration, FixedOffset};
use ledger_payment_engine::config::{LedgerConfig, MonitorConfig, NotifyConfig, PaymentConfig};
use log::*;
use lpg_common::{parse_boolean_flag, Money, Secret};

const DEFAULT_LPG_HOST: &str = "127.0.0.1";
const DEFAULT_LPG_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/lpg_store.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    /// Required in the `lpg_admin_token` header on operator routes. When empty, those routes are refused.
    pub admin_token: Secret<String>,
    pub payment: PaymentConfig,
    pub monitor: MonitorConfig,
    pub notify: NotifyConfig,
    pub ledger: LedgerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LPG_HOST.to_string(),
            port: DEFAULT_LPG_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            admin_token: Secret::default(),
            payment: PaymentConfig::default(),
            monitor: MonitorConfig::default(),
            notify: NotifyConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("LPG_HOST").ok().unwrap_or_else(|| DEFAULT_LPG_HOST.into());
        let port = parse_or_default("LPG_PORT", env::var("LPG_PORT").ok(), DEFAULT_LPG_PORT);
        let database_url = env::var("LPG_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ LPG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_positive("LPG_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let admin_token = Secret::new(env::var("LPG_ADMIN_TOKEN").ok().unwrap_or_else(|| {
            warn!("🪛️ LPG_ADMIN_TOKEN is not set. The operator routes under /api will refuse every request.");
            String::default()
        }));
        Self {
            host,
            port,
            database_url,
            max_connections,
            admin_token,
            payment: payment_config_from_env(),
            monitor: monitor_config_from_env(),
            notify: notify_config_from_env(),
            ledger: ledger_config_from_env(),
        }
    }
}

fn payment_config_from_env() -> PaymentConfig {
    let defaults = PaymentConfig::default();
    let merchant_id = env::var("LPG_MERCHANT_ID").ok().unwrap_or_else(|| {
        warn!("🪛️ LPG_MERCHANT_ID is not set. Using the default merchant id, {}.", defaults.merchant_id);
        defaults.merchant_id.clone()
    });
    let merchant_key = env::var("LPG_MERCHANT_KEY").ok().unwrap_or_else(|| {
        error!("🪛️ LPG_MERCHANT_KEY is not set. No payment request signature will validate until it is.");
        String::default()
    });
    let supported_types = match env::var("LPG_PAYMENT_TYPES").ok().map(|s| parse_list(&s)) {
        Some(types) if !types.is_empty() => types,
        _ => defaults.supported_types.clone(),
    };
    let business_qr_mode = parse_boolean_flag(env::var("LPG_BUSINESS_QR_MODE").ok(), defaults.business_qr_mode);
    if business_qr_mode {
        info!("🪛️ Business-QR mode is enabled. Orders will be matched on amount alone.");
    }
    let amount_offset =
        parse_or_default("LPG_AMOUNT_OFFSET", env::var("LPG_AMOUNT_OFFSET").ok(), defaults.amount_offset);
    let amount_offset = if amount_offset > Money::from_cents(0) {
        amount_offset
    } else {
        warn!("🪛️ LPG_AMOUNT_OFFSET must be positive. Using the default, {}.", defaults.amount_offset);
        defaults.amount_offset
    };
    PaymentConfig {
        merchant_id,
        merchant_key: Secret::new(merchant_key),
        supported_types,
        business_qr_mode,
        amount_offset,
        match_tolerance: env_seconds("LPG_MATCH_TOLERANCE", defaults.match_tolerance),
        order_timeout: env_seconds("LPG_ORDER_TIMEOUT", defaults.order_timeout),
    }
}

fn monitor_config_from_env() -> MonitorConfig {
    let defaults = MonitorConfig::default();
    let monitoring_window = parse_or_default(
        "LPG_MONITORING_WINDOW",
        env::var("LPG_MONITORING_WINDOW").ok(),
        defaults.monitoring_window.num_minutes(),
    );
    MonitorConfig {
        enabled: parse_boolean_flag(env::var("LPG_MONITOR_ENABLED").ok(), defaults.enabled),
        interval: env_std_seconds("LPG_MONITOR_INTERVAL", defaults.interval),
        lock_timeout: env_std_seconds("LPG_LOCK_TIMEOUT", defaults.lock_timeout),
        lock_path: env::var("LPG_LOCK_PATH").map(PathBuf::from).unwrap_or(defaults.lock_path),
        auto_cleanup: parse_boolean_flag(env::var("LPG_AUTO_CLEANUP").ok(), defaults.auto_cleanup),
        worker_count: parse_positive("LPG_WORKER_COUNT", defaults.worker_count),
        queue_size: parse_positive("LPG_QUEUE_SIZE", defaults.queue_size),
        failure_threshold: parse_positive("LPG_FAILURE_THRESHOLD", defaults.failure_threshold),
        monitoring_window: Duration::minutes(monitoring_window),
        ledger_lookback_hours: parse_positive("LPG_LEDGER_LOOKBACK_HOURS", defaults.ledger_lookback_hours),
    }
}

fn notify_config_from_env() -> NotifyConfig {
    let defaults = NotifyConfig::default();
    let sandbox_hosts = env::var("LPG_NOTIFY_SANDBOX_HOSTS")
        .map(|s| parse_list(&s))
        .unwrap_or_else(|_| defaults.sandbox_hosts.clone());
    NotifyConfig {
        timeout: env_std_seconds("LPG_NOTIFY_TIMEOUT", defaults.timeout),
        max_attempts: parse_positive("LPG_NOTIFY_ATTEMPTS", defaults.max_attempts),
        retry_backoff: env_std_seconds("LPG_NOTIFY_BACKOFF", defaults.retry_backoff),
        sandbox_hosts,
    }
}

fn ledger_config_from_env() -> LedgerConfig {
    let defaults = LedgerConfig::default();
    let url = env::var("LPG_LEDGER_URL").ok().unwrap_or_else(|| {
        error!("🪛️ LPG_LEDGER_URL is not set. Using {}, which is almost certainly wrong.", defaults.url);
        defaults.url.clone()
    });
    let secret = env::var("LPG_LEDGER_SECRET").ok().unwrap_or_else(|| {
        warn!("🪛️ LPG_LEDGER_SECRET is not set. Ledger queries will be signed with an empty key.");
        String::default()
    });
    let offset_hours = parse_or_default("LPG_LEDGER_UTC_OFFSET", env::var("LPG_LEDGER_UTC_OFFSET").ok(), 8i32);
    let timezone = offset_hours.checked_mul(3600).and_then(FixedOffset::east_opt).unwrap_or_else(|| {
        warn!("🪛️ LPG_LEDGER_UTC_OFFSET of {offset_hours} hours is out of range. Using {}.", defaults.timezone);
        defaults.timezone
    });
    LedgerConfig {
        url,
        app_id: env::var("LPG_LEDGER_APP_ID").unwrap_or_default(),
        secret: Secret::new(secret),
        timezone,
        timeout: env_std_seconds("LPG_LEDGER_TIMEOUT", defaults.timeout),
    }
}

/// Parses `value` as a `T`, logging and falling back to `default` if it is missing or invalid.
pub fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name}: '{s}'. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

fn parse_positive<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + PartialOrd + Default + Copy,
    T::Err: Display,
{
    let value = parse_or_default(name, env::var(name).ok(), default);
    if value > T::default() {
        value
    } else {
        warn!("🪛️ {name} must be greater than zero.");
        parse_or_default(name, None, default)
    }
}

fn env_seconds(name: &str, default: Duration) -> Duration {
    Duration::seconds(parse_or_default(name, env::var(name).ok(), default.num_seconds()))
}

fn env_std_seconds(name: &str, default: StdDuration) -> StdDuration {
    StdDuration::from_secs(parse_or_default(name, env::var(name).ok(), default.as_secs()))
}

/// Splits a comma-separated list, dropping blank entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}
