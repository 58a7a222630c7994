use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use ledger_payment_engine::{
    config::PaymentConfig,
    db_types::TradeNo,
    events::{EventHandlers, EventHooks},
    OrderFlowApi,
};
use log::*;
use lpg_common::Secret;

use crate::support::prepare_env::{prepare_test_env, random_db_path, signed_request, MERCHANT_ID, MERCHANT_KEY};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

async fn wait_for(hook: &HookCalled, count: i32) {
    for _ in 0..100 {
        if hook.count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn order_created_and_closed_hooks_fire() {
    let db = prepare_test_env(&random_db_path()).await;
    let created = HookCalled::default();
    let created_2 = HookCalled::default();
    let closed = HookCalled::default();

    let mut hooks = EventHooks::default();
    let c = created.clone();
    hooks.on_order_created(move |ev| {
        info!("🪝️ created {}", ev.order.trade_no);
        c.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let c = created_2.clone();
    hooks.on_order_created(move |_| {
        c.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let c = closed.clone();
    hooks.on_order_closed(move |_| {
        c.called();
        Box::pin(async {}) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(8, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let config = PaymentConfig {
        merchant_id: MERCHANT_ID.to_string(),
        merchant_key: Secret::new(MERCHANT_KEY.to_string()),
        ..Default::default()
    };
    let api = OrderFlowApi::new(db, producers, config);
    let first = api.create_payment(&signed_request("HOOK-1", "1.00")).await.unwrap();
    api.create_payment(&signed_request("HOOK-2", "2.00")).await.unwrap();
    // Resubmission does not publish again
    api.create_payment(&signed_request("HOOK-1", "1.00")).await.unwrap();
    api.close_order(&TradeNo::from(first.trade_no.as_str())).await.unwrap();
    api.close_order(&TradeNo::from(first.trade_no.as_str())).await.unwrap();

    wait_for(&created, 2).await;
    wait_for(&created_2, 2).await;
    wait_for(&closed, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(created.count(), 2);
    assert_eq!(created_2.count(), 2);
    assert_eq!(closed.count(), 1);
}
