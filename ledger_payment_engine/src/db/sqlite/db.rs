use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use lpg_common::Money;
use sqlx::{migrate, SqlitePool};

use super::{db_url, new_pool, orders, SqliteDatabaseError};
use crate::{
    db::traits::{OrderStore, OrderStoreError},
    db_types::{NewOrder, Order, OrderStatusType, StatusUpdate, TradeNo},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the database URL from the `LPG_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Created new Sqlite database connection pool for {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date using the embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        migrate!("./src/db/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete for {}", self.url);
        Ok(())
    }

    async fn settle(
        &self,
        trade_no: &TradeNo,
        status: OrderStatusType,
        paid_at: Option<DateTime<Utc>>,
        ledger_trade_id: Option<&str>,
    ) -> Result<StatusUpdate, OrderStoreError> {
        if !OrderStatusType::Pending.can_transition_to(status) {
            return Err(OrderStoreError::InvalidTransition { from: OrderStatusType::Pending, to: status });
        }
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        orders::update_order_status(trade_no, status, paid_at, ledger_trade_id, &mut conn)
            .await?
            .ok_or_else(|| OrderStoreError::OrderNotFound(trade_no.clone()))
    }
}

impl OrderStore for SqliteDatabase {
    async fn create_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::insert_order(order, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_trade_no(&self, trade_no: &TradeNo) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::fetch_order_by_trade_no(trade_no, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_out_trade_no(
        &self,
        out_trade_no: &str,
        merchant_id: &str,
    ) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let order = orders::fetch_order_by_out_trade_no(out_trade_no, merchant_id, &mut conn).await?;
        Ok(order)
    }

    async fn update_order_status(
        &self,
        trade_no: &TradeNo,
        status: OrderStatusType,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<StatusUpdate, OrderStoreError> {
        self.settle(trade_no, status, paid_at, None).await
    }

    async fn mark_order_paid(
        &self,
        trade_no: &TradeNo,
        paid_at: DateTime<Utc>,
        ledger_trade_id: &str,
    ) -> Result<StatusUpdate, OrderStoreError> {
        self.settle(trade_no, OrderStatusType::Paid, Some(paid_at), Some(ledger_trade_id)).await
    }

    async fn fetch_pending_orders_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let orders = orders::fetch_pending_orders_since(since, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_pending_orders_with_amount(
        &self,
        amount: Money,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let orders = orders::fetch_pending_orders_with_amount(amount, since, &mut conn).await?;
        Ok(orders)
    }

    async fn amount_exists(&self, amount: Money, since: DateTime<Utc>) -> Result<bool, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let exists = orders::amount_exists(amount, since, &mut conn).await?;
        Ok(exists)
    }

    async fn is_bill_claimed(&self, ledger_trade_id: &str) -> Result<bool, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let claimed = orders::is_bill_claimed(ledger_trade_id, &mut conn).await?;
        Ok(claimed)
    }

    async fn delete_expired_orders(&self, before: DateTime<Utc>) -> Result<u64, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(SqliteDatabaseError::from)?;
        let count = orders::delete_expired_orders(before, &mut conn).await?;
        if count > 0 {
            info!("🗃️ Deleted {count} expired pending orders created before {before}");
        }
        Ok(count)
    }
}
