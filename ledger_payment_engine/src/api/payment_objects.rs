use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The result of a successful payment submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCreated {
    pub trade_no: String,
    pub out_trade_no: String,
    /// The amount the payer must transfer.
    pub money: String,
    pub payable_amount: String,
    pub amount_adjusted: bool,
    /// The amount the merchant asked for.
    pub original_amount: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for PaymentCreated {
    fn from(order: &Order) -> Self {
        Self {
            trade_no: order.trade_no.as_str().to_string(),
            out_trade_no: order.out_trade_no.clone(),
            money: order.payable_amount.to_string(),
            payable_amount: order.payable_amount.to_string(),
            amount_adjusted: order.amount_adjusted(),
            original_amount: order.requested_amount.to_string(),
            created_at: order.created_at,
        }
    }
}

/// An order as reported to the merchant by an order query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub trade_no: String,
    pub out_trade_no: String,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub pid: String,
    pub addtime: String,
    /// Empty until the order is paid.
    pub endtime: String,
    pub name: String,
    pub money: String,
    /// 1 once paid, 0 otherwise.
    pub status: i32,
}

impl From<&Order> for OrderResult {
    fn from(order: &Order) -> Self {
        let fmt = |t: DateTime<Utc>| t.with_timezone(&Local).format(WIRE_TIME_FORMAT).to_string();
        Self {
            trade_no: order.trade_no.as_str().to_string(),
            out_trade_no: order.out_trade_no.clone(),
            payment_type: order.payment_type.clone(),
            pid: order.merchant_id.clone(),
            addtime: fmt(order.created_at),
            endtime: order.paid_at.map(fmt).unwrap_or_default(),
            name: order.name.clone(),
            money: order.requested_amount.to_string(),
            status: i32::from(order.status == OrderStatusType::Paid),
        }
    }
}
