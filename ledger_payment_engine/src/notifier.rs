//! Merchant callbacks.
//!
//! Once an order is settled the merchant is told about it with a signed GET request to the order's `notify_url`. The
//! merchant acknowledges by answering `success` or `ok`. Delivery is best effort: a failed notification is logged by
//! the caller and never affects the order itself.
use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use log::*;
use lpg_common::Secret;
use reqwest::{Client, Url};
use thiserror::Error;

use crate::{
    config::NotifyConfig,
    db_types::Order,
    helpers::{generate_sign, SIGN_TYPE},
};

pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("Could not initialize notifier: {0}")]
    Initialization(String),
    #[error("Invalid notify url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Notification request failed: {0}")]
    Transport(String),
    #[error("Merchant did not acknowledge the notification. Response: {0}")]
    NotAcknowledged(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Acknowledged,
    /// The order has no callback url.
    Skipped,
    /// The callback points at a sandbox host and was not sent.
    Sandbox,
}

pub trait MerchantNotifier: Clone + Send + Sync + 'static {
    fn notify(&self, order: &Order) -> impl Future<Output = Result<NotifyOutcome, NotificationError>> + Send;
}

/// The callback parameters for a settled order, signed with the merchant key.
pub fn build_notification_params(order: &Order, merchant_key: &str) -> HashMap<String, String> {
    let mut params = HashMap::with_capacity(9);
    params.insert("pid".to_string(), order.merchant_id.clone());
    params.insert("trade_no".to_string(), order.trade_no.as_str().to_string());
    params.insert("out_trade_no".to_string(), order.out_trade_no.clone());
    params.insert("type".to_string(), order.payment_type.clone());
    params.insert("name".to_string(), order.name.clone());
    params.insert("money".to_string(), order.requested_amount.to_string());
    params.insert("trade_status".to_string(), TRADE_SUCCESS.to_string());
    let sign = generate_sign(&params, merchant_key);
    params.insert("sign".to_string(), sign);
    params.insert("sign_type".to_string(), SIGN_TYPE.to_string());
    params
}

/// Whether a merchant's response body acknowledges the callback.
pub fn is_acknowledged(body: &str) -> bool {
    matches!(body.trim().to_lowercase().as_str(), "success" | "ok")
}

/// Shows only the ends of a signature, for logging.
pub fn mask_sign(sign: &str) -> String {
    let chars = sign.chars().collect::<Vec<_>>();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head = chars[..4].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{head}****{tail}")
}

#[derive(Clone)]
pub struct HttpNotifier {
    config: NotifyConfig,
    merchant_key: Secret<String>,
    client: Arc<Client>,
}

impl HttpNotifier {
    pub fn new(config: NotifyConfig, merchant_key: Secret<String>) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotificationError::Initialization(e.to_string()))?;
        Ok(Self { config, merchant_key, client: Arc::new(client) })
    }

    /// The full callback url for `order`. Parameters are appended to any query string the merchant already supplied.
    pub fn callback_url(&self, order: &Order) -> Result<Url, NotificationError> {
        let mut url = Url::parse(&order.notify_url)
            .map_err(|e| NotificationError::InvalidUrl { url: order.notify_url.clone(), reason: e.to_string() })?;
        let params = build_notification_params(order, self.merchant_key.reveal());
        let mut keys = params.keys().collect::<Vec<_>>();
        keys.sort();
        url.query_pairs_mut().extend_pairs(keys.into_iter().map(|k| (k, &params[k])));
        Ok(url)
    }

    pub fn is_sandbox(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| self.config.sandbox_hosts.iter().any(|s| host == s || host.ends_with(&format!(".{s}"))))
            .unwrap_or(false)
    }

    async fn deliver(&self, url: &Url) -> Result<(), NotificationError> {
        let response =
            self.client.get(url.clone()).send().await.map_err(|e| NotificationError::Transport(e.to_string()))?;
        let body = response.text().await.map_err(|e| NotificationError::Transport(e.to_string()))?;
        if is_acknowledged(&body) {
            Ok(())
        } else {
            let preview = body.chars().take(100).collect::<String>();
            Err(NotificationError::NotAcknowledged(preview))
        }
    }
}

impl MerchantNotifier for HttpNotifier {
    async fn notify(&self, order: &Order) -> Result<NotifyOutcome, NotificationError> {
        if order.notify_url.is_empty() {
            warn!("📬️ Order {} has no notify url. Skipping merchant notification", order.trade_no);
            return Ok(NotifyOutcome::Skipped);
        }
        let url = self.callback_url(order)?;
        if self.is_sandbox(&url) {
            warn!(
                "📬️ Notify url for order {} is a sandbox host ({}). Not sending.",
                order.trade_no, order.notify_url
            );
            return Ok(NotifyOutcome::Sandbox);
        }
        let sign = url.query_pairs().find(|(k, _)| k == "sign").map(|(_, v)| mask_sign(&v)).unwrap_or_default();
        info!(
            "📬️ Notifying merchant about order {} ({}) at {}. sign={sign}",
            order.trade_no, order.out_trade_no, order.notify_url
        );
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.retry_backoff;
        let mut attempt = 1;
        loop {
            match self.deliver(&url).await {
                Ok(()) => {
                    info!("📬️ Merchant acknowledged order {}", order.trade_no);
                    return Ok(NotifyOutcome::Acknowledged);
                },
                Err(e) if attempt < attempts => {
                    warn!(
                        "📬️ Notification attempt {attempt}/{attempts} for order {} failed. {e}. Retry in {backoff:?}",
                        order.trade_no
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(Duration::from_secs(300));
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
