use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use ledger_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    ledger::HttpLedgerClient,
    notifier::HttpNotifier,
    reconciliation::ReconciliationScheduler,
    SqliteDatabase,
};
use log::*;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    monitor::MonitorControl,
    routes::{health, AdminToken, MonitorResumeRoute, MonitorStatusRoute},
};

const EVENT_BUFFER_SIZE: usize = 25;

pub type Scheduler = ReconciliationScheduler<SqliteDatabase, HttpLedgerClient, HttpNotifier>;

/// Wires up the engine, starts reconciliation and serves the operator routes until the server is shut down (e.g. by
/// SIGINT). Queued reconciliation work is drained before returning.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_event_handlers().await;
    let scheduler = create_scheduler(&config, db, producers)?;
    if scheduler.start() {
        info!("🚀️ Payment monitoring started");
    }
    let srv = create_server_instance(config, scheduler.clone())?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🚀️ Server stopped. Waiting for reconciliation work to finish");
    scheduler.stop().await;
    result
}

pub fn create_scheduler(
    config: &ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Scheduler, ServerError> {
    let ledger = HttpLedgerClient::new(config.ledger.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the ledger client. {e}")))?;
    let notifier = HttpNotifier::new(config.notify.clone(), config.payment.merchant_key.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the merchant notifier. {e}")))?;
    Ok(ReconciliationScheduler::new(db, ledger, notifier, producers, &config.payment, config.monitor.clone()))
}

async fn start_event_handlers() -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            let order = ev.order;
            info!(
                "💰️ Order {} ({}) was paid. {} received against ledger entry {}",
                order.trade_no,
                order.out_trade_no,
                order.payable_amount,
                order.ledger_trade_id.as_deref().unwrap_or("n/a")
            );
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance<M: MonitorControl>(config: ServerConfig, monitor: M) -> Result<Server, ServerError> {
    let admin_token = AdminToken(config.admin_token.clone());
    let srv = HttpServer::new(move || {
        let operator_scope = web::scope("/api")
            .service(MonitorStatusRoute::<M>::new())
            .service(MonitorResumeRoute::<M>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("lpg::access_log"))
            .app_data(web::Data::new(admin_token.clone()))
            .app_data(web::Data::new(monitor.clone()))
            .service(health)
            .service(operator_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
