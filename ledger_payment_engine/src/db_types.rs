use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use lpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and is waiting for a matching ledger entry.
    Pending,
    /// A matching credit was found on the ledger. Terminal for the reconciliation engine.
    Paid,
    /// The order was closed before any payment was detected.
    Closed,
    /// The payment was returned to the payer. Handled outside the reconciliation engine.
    Refunded,
}

impl OrderStatusType {
    /// Whether the status can legally move from `self` to `next`. Only `Pending` orders can change.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        matches!((self, next), (Self::Pending, Self::Paid) | (Self::Pending, Self::Closed))
    }

    /// The numeric code used on the merchant wire protocol.
    pub fn code(&self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Closed => 2,
            Self::Refunded => 3,
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Closed => write!(f, "Closed"),
            OrderStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Closed" => Ok(Self::Closed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------        TradeNo        ---------------------------------------------------------
/// The gateway-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TradeNo(pub String);

impl FromStr for TradeNo {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TradeNo {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TradeNo {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for TradeNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl TradeNo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Order       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub trade_no: TradeNo,
    /// The merchant's own order number. Unique per merchant.
    pub out_trade_no: String,
    pub merchant_id: String,
    pub payment_type: String,
    pub name: String,
    /// The price the merchant asked for.
    pub requested_amount: Money,
    /// The amount the payer must actually transfer. Differs from `requested_amount` when the allocator had to offset
    /// it to keep concurrent amount-matched orders apart. Never changes after creation.
    pub payable_amount: Money,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notify_url: String,
    pub return_url: String,
    pub site_name: Option<String>,
    /// The counterparty trade id of the ledger entry that paid this order.
    pub ledger_trade_id: Option<String>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatusType::Pending
    }

    pub fn amount_adjusted(&self) -> bool {
        self.payable_amount != self.requested_amount
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub trade_no: TradeNo,
    pub out_trade_no: String,
    pub merchant_id: String,
    pub payment_type: String,
    pub name: String,
    pub requested_amount: Money,
    pub payable_amount: Money,
    pub created_at: DateTime<Utc>,
    pub notify_url: String,
    pub return_url: String,
    pub site_name: Option<String>,
}

impl NewOrder {
    /// A new order whose payable amount equals the requested amount. Use [`NewOrder::with_payable_amount`] once an
    /// amount has been allocated.
    pub fn new(trade_no: TradeNo, out_trade_no: &str, merchant_id: &str, amount: Money) -> Self {
        Self {
            trade_no,
            out_trade_no: out_trade_no.to_string(),
            merchant_id: merchant_id.to_string(),
            payment_type: "alipay".to_string(),
            name: String::default(),
            requested_amount: amount,
            payable_amount: amount,
            created_at: Utc::now(),
            notify_url: String::default(),
            return_url: String::default(),
            site_name: None,
        }
    }

    pub fn with_payable_amount(mut self, amount: Money) -> Self {
        self.payable_amount = amount;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_notify_url(mut self, url: &str) -> Self {
        self.notify_url = url.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

//--------------------------------------      BillRecord      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillDirection {
    Credit,
    Debit,
}

impl BillDirection {
    /// Interprets the upstream direction label. Anything that is not recognisably an incoming transfer is treated as
    /// a debit, so it can never satisfy an order.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "收入" | "income" | "credit" | "in" => Self::Credit,
            _ => Self::Debit,
        }
    }
}

/// One line of the upstream ledger. Lives only for the duration of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillRecord {
    pub counterparty_trade_id: String,
    pub amount: Money,
    pub memo: String,
    pub transacted_at: DateTime<Utc>,
    pub direction: BillDirection,
}

impl BillRecord {
    pub fn credit(counterparty_trade_id: &str, amount: Money, memo: &str, transacted_at: DateTime<Utc>) -> Self {
        Self {
            counterparty_trade_id: counterparty_trade_id.to_string(),
            amount,
            memo: memo.to_string(),
            transacted_at,
            direction: BillDirection::Credit,
        }
    }

    pub fn is_credit(&self) -> bool {
        self.direction == BillDirection::Credit
    }
}

//--------------------------------------     StatusUpdate      ---------------------------------------------------------
/// The result of a conditional status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order was `Pending` and now carries the new status.
    Updated(Order),
    /// The order had already left `Pending`. Nothing was written.
    Unchanged(Order),
}

impl StatusUpdate {
    pub fn was_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    pub fn order(&self) -> &Order {
        match self {
            Self::Updated(o) | Self::Unchanged(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Self::Updated(o) | Self::Unchanged(o) => o,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_transitions_are_one_way() {
        use OrderStatusType::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Closed));
        for from in [Paid, Closed, Refunded] {
            for to in [Pending, Paid, Closed, Refunded] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn direction_labels() {
        assert_eq!(BillDirection::from_label("收入"), BillDirection::Credit);
        assert_eq!(BillDirection::from_label(" Credit "), BillDirection::Credit);
        assert_eq!(BillDirection::from_label("支出"), BillDirection::Debit);
        assert_eq!(BillDirection::from_label(""), BillDirection::Debit);
    }
}
