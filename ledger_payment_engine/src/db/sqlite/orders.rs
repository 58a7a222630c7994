use chrono::{DateTime, Utc};
use log::{debug, trace};
use lpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db::sqlite::SqliteDatabaseError,
    db_types::{NewOrder, Order, OrderStatusType, StatusUpdate, TradeNo},
};

const ORDER_COLUMNS: &str = "trade_no, out_trade_no, merchant_id, payment_type, name, requested_amount, \
                             payable_amount, status, created_at, paid_at, notify_url, return_url, site_name, \
                             ledger_trade_id";

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    let sql = format!(
        r#"
        INSERT INTO orders (
            trade_no, out_trade_no, merchant_id, payment_type, name, requested_amount, payable_amount, status,
            created_at, notify_url, return_url, site_name
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {ORDER_COLUMNS};
        "#
    );
    let result = sqlx::query_as::<_, Order>(&sql)
        .bind(&order.trade_no)
        .bind(&order.out_trade_no)
        .bind(&order.merchant_id)
        .bind(&order.payment_type)
        .bind(&order.name)
        .bind(order.requested_amount)
        .bind(order.payable_amount)
        .bind(OrderStatusType::Pending)
        .bind(order.created_at)
        .bind(&order.notify_url)
        .bind(&order.return_url)
        .bind(&order.site_name)
        .fetch_one(conn)
        .await;
    match result {
        Ok(o) => {
            debug!("🗃️ Order {} has been saved in the DB", o.trade_no);
            Ok(o)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SqliteDatabaseError::DuplicateOrder(order.trade_no.0))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_trade_no(
    trade_no: &TradeNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE trade_no = $1");
    let order = sqlx::query_as::<_, Order>(&sql).bind(trade_no).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_out_trade_no(
    out_trade_no: &str,
    merchant_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE out_trade_no = $1 AND merchant_id = $2");
    let order = sqlx::query_as::<_, Order>(&sql).bind(out_trade_no).bind(merchant_id).fetch_optional(conn).await?;
    Ok(order)
}

/// Conditionally moves a `Pending` order to `status`. `None` means no row was touched: either the order does not
/// exist or it is no longer `Pending`. The caller disambiguates.
async fn conditional_update(
    trade_no: &TradeNo,
    status: OrderStatusType,
    paid_at: Option<DateTime<Utc>>,
    ledger_trade_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let sql = format!(
        r#"
        UPDATE orders SET
            status = $1,
            paid_at = COALESCE($2, paid_at),
            ledger_trade_id = COALESCE($3, ledger_trade_id)
        WHERE trade_no = $4 AND status = $5
        RETURNING {ORDER_COLUMNS};
        "#
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(status)
        .bind(paid_at)
        .bind(ledger_trade_id)
        .bind(trade_no)
        .bind(OrderStatusType::Pending)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Moves a `Pending` order to `status`. Returns `None` if the order does not exist.
pub async fn update_order_status(
    trade_no: &TradeNo,
    status: OrderStatusType,
    paid_at: Option<DateTime<Utc>>,
    ledger_trade_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<StatusUpdate>, SqliteDatabaseError> {
    match conditional_update(trade_no, status, paid_at, ledger_trade_id, &mut *conn).await? {
        Some(order) => {
            trace!("🗃️ Order {trade_no} is now {status}");
            Ok(Some(StatusUpdate::Updated(order)))
        },
        None => {
            let existing = fetch_order_by_trade_no(trade_no, conn).await?;
            if let Some(o) = &existing {
                trace!("🗃️ Order {trade_no} is already {}. Status left unchanged", o.status);
            }
            Ok(existing.map(StatusUpdate::Unchanged))
        },
    }
}

pub async fn fetch_pending_orders_since(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND created_at >= $2 ORDER BY created_at ASC, trade_no \
         ASC"
    );
    let orders =
        sqlx::query_as::<_, Order>(&sql).bind(OrderStatusType::Pending).bind(since).fetch_all(conn).await?;
    Ok(orders)
}

pub async fn fetch_pending_orders_with_amount(
    amount: Money,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, SqliteDatabaseError> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 AND payable_amount = $2 AND created_at >= $3 ORDER BY \
         created_at ASC, trade_no ASC"
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(OrderStatusType::Pending)
        .bind(amount)
        .bind(since)
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

pub async fn amount_exists(
    amount: Money,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE status = $1 AND payable_amount = $2 AND created_at >= $3",
    )
    .bind(OrderStatusType::Pending)
    .bind(amount)
    .bind(since)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

pub async fn is_bill_claimed(ledger_trade_id: &str, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ledger_trade_id = $1")
        .bind(ledger_trade_id)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

pub async fn delete_expired_orders(
    before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, SqliteDatabaseError> {
    let result = sqlx::query("DELETE FROM orders WHERE status = $1 AND created_at < $2")
        .bind(OrderStatusType::Pending)
        .bind(before)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
