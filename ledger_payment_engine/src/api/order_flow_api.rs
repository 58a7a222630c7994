use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use log::*;
use lpg_common::{Money, MAX_PAYMENT_AMOUNT, MIN_PAYMENT_AMOUNT};

use super::{OrderResult, PaymentCreated, PaymentIntakeError};
use crate::{
    allocator::AmountAllocator,
    config::PaymentConfig,
    db::traits::{OrderStore, OrderStoreError},
    db_types::{NewOrder, Order, OrderStatusType, TradeNo},
    events::{EventProducers, OrderClosedEvent, OrderCreatedEvent},
    helpers::{new_trade_no, validate_signature},
};

const REQUIRED_PARAMS: [&str; 7] = ["pid", "type", "out_trade_no", "notify_url", "return_url", "name", "sign"];
const MAX_OUT_TRADE_NO_LEN: usize = 64;
const MAX_URL_LEN: usize = 500;
const TRADE_NO_ATTEMPTS: usize = 3;

/// `OrderFlowApi` is the entry point for merchants. It validates and records payment requests, answers order queries
/// and closes orders on request. Settlement itself is done by the reconciliation engine.
pub struct OrderFlowApi<B> {
    db: B,
    allocator: AmountAllocator<B>,
    producers: EventProducers,
    config: PaymentConfig,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: OrderStore> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, config: PaymentConfig) -> Self {
        let allocator = AmountAllocator::new(db.clone(), &config);
        Self { db, allocator, producers, config }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Validates a signed payment request and records a new pending order.
    ///
    /// Resubmitting a request for an `out_trade_no` the merchant has used before returns the existing order unchanged.
    /// In Business-QR mode the payable amount may be nudged away from the requested amount so that it is unique among
    /// live pending orders. The returned [`PaymentCreated`] says whether that happened.
    pub async fn create_payment(&self, params: &HashMap<String, String>) -> Result<PaymentCreated, PaymentIntakeError> {
        let amount = self.validate_payment_params(params)?;
        let pid = param(params, "pid");
        let out_trade_no = param(params, "out_trade_no");

        if let Some(existing) = self.db.fetch_order_by_out_trade_no(out_trade_no, pid).await? {
            info!("🛒️ Order {out_trade_no} was resubmitted. Returning existing order {}", existing.trade_no);
            return Ok(PaymentCreated::from(&existing));
        }

        let mut attempt = 0;
        let order = loop {
            attempt += 1;
            let reservation = self.allocator.reserve(amount).await?;
            let new_order = NewOrder {
                trade_no: new_trade_no(),
                out_trade_no: out_trade_no.to_string(),
                merchant_id: pid.to_string(),
                payment_type: param(params, "type").to_string(),
                name: param(params, "name").to_string(),
                requested_amount: amount,
                payable_amount: reservation.amount(),
                created_at: Utc::now(),
                notify_url: param(params, "notify_url").to_string(),
                return_url: param(params, "return_url").to_string(),
                site_name: params.get("sitename").filter(|s| !s.is_empty()).cloned(),
            };
            let result = self.db.create_order(new_order).await;
            drop(reservation);
            match result {
                Ok(order) => break order,
                Err(OrderStoreError::DuplicateOrder(trade_no)) => {
                    // Either a concurrent resubmission won the race, or the random trade number collided
                    if let Some(existing) = self.db.fetch_order_by_out_trade_no(out_trade_no, pid).await? {
                        return Ok(PaymentCreated::from(&existing));
                    }
                    if attempt >= TRADE_NO_ATTEMPTS {
                        return Err(OrderStoreError::DuplicateOrder(trade_no).into());
                    }
                    warn!("🛒️ Trade number {trade_no} collided. Generating another");
                },
                Err(e) => return Err(e.into()),
            }
        };
        info!(
            "🛒️ New order {} for merchant order {} ({}). Payable: {}",
            order.trade_no, order.out_trade_no, order.requested_amount, order.payable_amount
        );
        self.producers.publish_order_created(OrderCreatedEvent::new(order.clone())).await;
        Ok(PaymentCreated::from(&order))
    }

    /// Looks up an order by the merchant's order number.
    pub async fn query_order(&self, pid: &str, out_trade_no: &str) -> Result<OrderResult, PaymentIntakeError> {
        if pid != self.config.merchant_id {
            return Err(PaymentIntakeError::InvalidMerchant);
        }
        let order = self
            .db
            .fetch_order_by_out_trade_no(out_trade_no, pid)
            .await?
            .ok_or_else(|| PaymentIntakeError::OrderNotFound(out_trade_no.to_string()))?;
        Ok(OrderResult::from(&order))
    }

    pub async fn fetch_order(&self, trade_no: &TradeNo) -> Result<Option<Order>, PaymentIntakeError> {
        Ok(self.db.fetch_order_by_trade_no(trade_no).await?)
    }

    /// Closes a pending order. Closing an order that is already paid or closed changes nothing, and the order is
    /// returned as it is.
    pub async fn close_order(&self, trade_no: &TradeNo) -> Result<Order, PaymentIntakeError> {
        let update = match self.db.update_order_status(trade_no, OrderStatusType::Closed, None).await {
            Err(OrderStoreError::OrderNotFound(t)) => return Err(PaymentIntakeError::OrderNotFound(t.0)),
            result => result?,
        };
        if update.was_updated() {
            info!("🛒️ Order {trade_no} closed");
            self.producers.publish_order_closed(OrderClosedEvent::new(update.order().clone())).await;
        } else {
            debug!("🛒️ Order {trade_no} is already {}. Not closing", update.order().status);
        }
        Ok(update.into_order())
    }

    fn validate_payment_params(&self, params: &HashMap<String, String>) -> Result<Money, PaymentIntakeError> {
        for field in REQUIRED_PARAMS {
            if param(params, field).is_empty() {
                return Err(PaymentIntakeError::MissingParameter(field.to_string()));
            }
        }
        let money = match param(params, "money") {
            "" => param(params, "price"),
            m => m,
        };
        if money.is_empty() {
            return Err(PaymentIntakeError::MissingParameter("money".to_string()));
        }
        if param(params, "pid") != self.config.merchant_id {
            return Err(PaymentIntakeError::InvalidMerchant);
        }
        let payment_type = param(params, "type");
        if !self.config.supports_type(payment_type) {
            return Err(PaymentIntakeError::UnsupportedPaymentType(payment_type.to_string()));
        }
        let amount = money.parse::<Money>().map_err(|e| PaymentIntakeError::InvalidAmount(e.to_string()))?;
        if amount < MIN_PAYMENT_AMOUNT || amount > MAX_PAYMENT_AMOUNT {
            return Err(PaymentIntakeError::InvalidAmount(format!(
                "{amount} is outside [{MIN_PAYMENT_AMOUNT}, {MAX_PAYMENT_AMOUNT}]"
            )));
        }
        validate_out_trade_no(param(params, "out_trade_no"))?;
        validate_url("notify_url", param(params, "notify_url"))?;
        validate_url("return_url", param(params, "return_url"))?;
        if !validate_signature(params, self.config.merchant_key.reveal()) {
            warn!("🛒️ Rejected payment request for {} with a bad signature", param(params, "out_trade_no"));
            return Err(PaymentIntakeError::InvalidSignature);
        }
        Ok(amount)
    }
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> &'a str {
    params.get(key).map(|s| s.trim()).unwrap_or_default()
}

fn validate_out_trade_no(out_trade_no: &str) -> Result<(), PaymentIntakeError> {
    let valid = out_trade_no.len() <= MAX_OUT_TRADE_NO_LEN &&
        out_trade_no.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PaymentIntakeError::InvalidParameter {
            field: "out_trade_no".to_string(),
            reason: "must be at most 64 letters, digits, '_' or '-'".to_string(),
        })
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), PaymentIntakeError> {
    let reason = if url.len() > MAX_URL_LEN {
        "url too long"
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        "url must start with http:// or https://"
    } else {
        return Ok(());
    };
    Err(PaymentIntakeError::InvalidParameter { field: field.to_string(), reason: reason.to_string() })
}

#[cfg(test)]
mod test {
    use std::{
        future::Future,
        pin::Pin,
        sync::{Arc, Mutex},
    };

    use lpg_common::Secret;

    use super::*;
    use crate::{
        events::{EventHandlers, EventHooks},
        helpers::generate_sign,
        test_utils::prepare_env::{prepare_test_env, random_db_path},
        SqliteDatabase,
    };

    const KEY: &str = "merchant-secret";

    fn config(business_qr_mode: bool) -> PaymentConfig {
        PaymentConfig {
            merchant_id: "1001".to_string(),
            merchant_key: Secret::new(KEY.to_string()),
            business_qr_mode,
            ..Default::default()
        }
    }

    async fn api(business_qr_mode: bool) -> OrderFlowApi<SqliteDatabase> {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        OrderFlowApi::new(db, EventProducers::default(), config(business_qr_mode))
    }

    fn request(out_trade_no: &str, money: &str) -> HashMap<String, String> {
        let mut params = [
            ("pid", "1001"),
            ("type", "alipay"),
            ("out_trade_no", out_trade_no),
            ("notify_url", "https://shop.test/notify"),
            ("return_url", "https://shop.test/return"),
            ("name", "VIP membership"),
            ("money", money),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
        let sign = generate_sign(&params, KEY);
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), "MD5".to_string());
        params
    }

    #[tokio::test]
    async fn create_and_query() {
        let api = api(false).await;
        let created = api.create_payment(&request("ORDER123", "5.50")).await.unwrap();
        assert_eq!(created.out_trade_no, "ORDER123");
        assert_eq!(created.money, "5.50");
        assert!(!created.amount_adjusted);
        assert_eq!(created.trade_no.len(), 20);

        let result = api.query_order("1001", "ORDER123").await.unwrap();
        assert_eq!(result.trade_no, created.trade_no);
        assert_eq!(result.money, "5.50");
        assert_eq!(result.status, 0);
        assert_eq!(result.endtime, "");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["type"], "alipay");

        assert!(matches!(api.query_order("9999", "ORDER123").await, Err(PaymentIntakeError::InvalidMerchant)));
        assert!(matches!(api.query_order("1001", "NOPE").await, Err(PaymentIntakeError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn resubmission_is_idempotent() {
        let api = api(true).await;
        let first = api.create_payment(&request("ORDER1", "10.00")).await.unwrap();
        let second = api.create_payment(&request("ORDER1", "10.00")).await.unwrap();
        assert_eq!(first, second);
        let other = api.create_payment(&request("ORDER2", "10.00")).await.unwrap();
        assert_eq!(other.money, "10.01");
        assert_eq!(other.original_amount, "10.00");
        assert!(other.amount_adjusted);
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let api = api(false).await;
        let mut p = request("ORDER1", "10.00");
        p.remove("notify_url");
        let err = api.create_payment(&p).await;
        assert!(matches!(err, Err(PaymentIntakeError::MissingParameter(f)) if f == "notify_url"));

        let mut p = request("ORDER1", "10.00");
        p.insert("sign".to_string(), "deadbeef".to_string());
        assert!(matches!(api.create_payment(&p).await, Err(PaymentIntakeError::InvalidSignature)));

        for bad in ["0.00", "100000.00", "1.234", "abc"] {
            let p = request("ORDER1", bad);
            assert!(matches!(api.create_payment(&p).await, Err(PaymentIntakeError::InvalidAmount(_))), "{bad}");
        }

        let mut p = request("ORDER1", "10.00");
        p.insert("pid".to_string(), "2002".to_string());
        assert!(matches!(api.create_payment(&p).await, Err(PaymentIntakeError::InvalidMerchant)));

        let mut p = request("ORDER1", "10.00");
        p.insert("type".to_string(), "wxpay".to_string());
        assert!(matches!(api.create_payment(&p).await, Err(PaymentIntakeError::UnsupportedPaymentType(_))));

        let p = request("ORDER 1", "10.00");
        assert!(matches!(api.create_payment(&p).await, Err(PaymentIntakeError::InvalidParameter { .. })));
        assert!(api.query_order("1001", "ORDER1").await.is_err());
    }

    #[tokio::test]
    async fn price_is_accepted_in_place_of_money() {
        let api = api(false).await;
        let mut p = request("ORDER1", "");
        p.remove("money");
        p.insert("price".to_string(), "3.00".to_string());
        p.remove("sign");
        let sign = generate_sign(&p, KEY);
        p.insert("sign".to_string(), sign);
        let created = api.create_payment(&p).await.unwrap();
        assert_eq!(created.original_amount, "3.00");
    }

    #[tokio::test]
    async fn closing_orders() {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let closed = Arc::new(Mutex::new(Vec::new()));
        let closed2 = closed.clone();
        let mut hooks = EventHooks::default();
        hooks.on_order_closed(move |ev| {
            let closed = closed2.clone();
            Box::pin(async move {
                closed.lock().unwrap().push(ev.order.trade_no);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handlers = EventHandlers::new(10, hooks);
        let producers = handlers.producers();
        handlers.start_handlers().await;

        let api = OrderFlowApi::new(db.clone(), producers, config(false));
        let created = api.create_payment(&request("ORDER1", "1.00")).await.unwrap();
        let trade_no = TradeNo::from(created.trade_no.as_str());
        let order = api.close_order(&trade_no).await.unwrap();
        assert_eq!(order.status, OrderStatusType::Closed);
        let again = api.close_order(&trade_no).await.unwrap();
        assert_eq!(again.status, OrderStatusType::Closed);
        assert!(matches!(api.close_order(&"NOPE".into()).await, Err(PaymentIntakeError::OrderNotFound(_))));

        // Dropping the api drops the last producer, which lets the handler drain and stop
        drop(api);
        for _ in 0..50 {
            if !closed.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(*closed.lock().unwrap(), vec![trade_no]);
    }
}
