use std::future::Future;

use chrono::{DateTime, Utc};
use lpg_common::Money;
use thiserror::Error;

use crate::db_types::{NewOrder, Order, OrderStatusType, StatusUpdate, TradeNo};

#[derive(Debug, Clone, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(TradeNo),
    #[error("An order with trade number {0} already exists")]
    DuplicateOrder(TradeNo),
    #[error("Cannot move an order from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
}

/// The `OrderStore` trait defines the persistence contract of the gateway. Every status change goes through a
/// conditional update that only touches `Pending` orders, which is what makes concurrent settlement attempts safe.
///
/// The futures returned by the store are `Send` so that implementations can be driven from spawned worker tasks.
pub trait OrderStore: Clone + Send + Sync + 'static {
    /// Persists a brand-new order with status `Pending`.
    fn create_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, OrderStoreError>> + Send;

    fn fetch_order_by_trade_no(
        &self,
        trade_no: &TradeNo,
    ) -> impl Future<Output = Result<Option<Order>, OrderStoreError>> + Send;

    /// Looks up an order by the merchant's own order number, scoped to the merchant.
    fn fetch_order_by_out_trade_no(
        &self,
        out_trade_no: &str,
        merchant_id: &str,
    ) -> impl Future<Output = Result<Option<Order>, OrderStoreError>> + Send;

    /// Moves a `Pending` order to `status`. If the order has already left `Pending`, nothing is written and
    /// [`StatusUpdate::Unchanged`] is returned, so repeating a transition is harmless.
    ///
    /// Returns [`OrderStoreError::OrderNotFound`] if there is no such order.
    fn update_order_status(
        &self,
        trade_no: &TradeNo,
        status: OrderStatusType,
        paid_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<StatusUpdate, OrderStoreError>> + Send;

    /// Settles a `Pending` order, recording which ledger entry paid for it. Same conditional semantics as
    /// [`OrderStore::update_order_status`].
    fn mark_order_paid(
        &self,
        trade_no: &TradeNo,
        paid_at: DateTime<Utc>,
        ledger_trade_id: &str,
    ) -> impl Future<Output = Result<StatusUpdate, OrderStoreError>> + Send;

    /// All `Pending` orders created at or after `since`, oldest first.
    fn fetch_pending_orders_since(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Order>, OrderStoreError>> + Send;

    /// `Pending` orders created at or after `since` whose payable amount equals `amount`, oldest first.
    fn fetch_pending_orders_with_amount(
        &self,
        amount: Money,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Order>, OrderStoreError>> + Send;

    fn amount_exists(
        &self,
        amount: Money,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, OrderStoreError>> + Send;

    /// Whether a ledger entry has already been used to pay an order.
    fn is_bill_claimed(&self, ledger_trade_id: &str) -> impl Future<Output = Result<bool, OrderStoreError>> + Send;

    /// Deletes `Pending` orders created before `before`. Returns the number of rows removed.
    fn delete_expired_orders(&self, before: DateTime<Utc>) -> impl Future<Output = Result<u64, OrderStoreError>> + Send;
}
