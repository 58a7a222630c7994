use chrono::Duration;
use log::*;

use crate::db_types::{BillRecord, Order};

/// How a ledger entry is tied to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Payers scan one static code, so only the amount and timing identify the order. The amount must equal the
    /// payable amount and the transfer must land no earlier than the order and no later than `tolerance` after it.
    BusinessQr { tolerance: Duration },
    /// The payer's transfer memo carries the merchant order number, and the amount must equal the requested amount.
    Traditional,
}

impl MatchPolicy {
    pub fn new(business_qr_mode: bool, tolerance: Duration) -> Self {
        if business_qr_mode {
            Self::BusinessQr { tolerance }
        } else {
            Self::Traditional
        }
    }

    pub fn is_business_qr(&self) -> bool {
        matches!(self, Self::BusinessQr { .. })
    }

    /// Whether `bill` pays for `order`. Debits and orders that have left `Pending` never match.
    pub fn matches(&self, order: &Order, bill: &BillRecord) -> bool {
        if !bill.is_credit() || !order.is_pending() {
            return false;
        }
        match self {
            Self::BusinessQr { tolerance } => {
                let delay = bill.transacted_at - order.created_at;
                bill.amount == order.payable_amount && delay >= Duration::zero() && delay <= *tolerance
            },
            Self::Traditional => bill.memo == order.out_trade_no && bill.amount == order.requested_amount,
        }
    }

    /// Picks the single order that `bill` should settle out of `candidates`: the earliest created matching order,
    /// with ties broken by trade number. Returns `None` if nothing matches.
    pub fn resolve_claimant<'a>(&self, candidates: &'a [Order], bill: &BillRecord) -> Option<&'a Order> {
        let mut matching = candidates.iter().filter(|o| self.matches(o, bill)).collect::<Vec<_>>();
        if matching.len() > 1 {
            warn!(
                "🔍️ Ledger entry {} for {} matches {} pending orders ({}). The earliest order claims it.",
                bill.counterparty_trade_id,
                bill.amount,
                matching.len(),
                matching.iter().map(|o| o.trade_no.as_str()).collect::<Vec<_>>().join(", ")
            );
        }
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.trade_no.cmp(&b.trade_no)));
        matching.into_iter().next()
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};
    use lpg_common::Money;

    use super::*;
    use crate::db_types::{BillDirection, OrderStatusType};

    fn order(trade_no: &str, out_trade_no: &str, cents: i64, secs: i64) -> Order {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs);
        Order {
            trade_no: trade_no.into(),
            out_trade_no: out_trade_no.to_string(),
            merchant_id: "1001".to_string(),
            payment_type: "alipay".to_string(),
            name: "VIP".to_string(),
            requested_amount: Money::from_cents(cents),
            payable_amount: Money::from_cents(cents),
            status: OrderStatusType::Pending,
            created_at,
            paid_at: None,
            notify_url: String::default(),
            return_url: String::default(),
            site_name: None,
            ledger_trade_id: None,
        }
    }

    fn bill(cents: i64, memo: &str, secs: i64) -> BillRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs);
        BillRecord::credit("B1", Money::from_cents(cents), memo, at)
    }

    #[test]
    fn business_qr_tolerance_boundary_is_inclusive() {
        let policy = MatchPolicy::new(true, Duration::seconds(300));
        let o = order("T1", "M1", 1000, 0);
        assert!(policy.matches(&o, &bill(1000, "", 0)));
        assert!(policy.matches(&o, &bill(1000, "", 300)));
        assert!(!policy.matches(&o, &bill(1000, "", 301)));
        assert!(!policy.matches(&o, &bill(1000, "", -1)));
        assert!(!policy.matches(&o, &bill(1001, "", 10)));
    }

    #[test]
    fn business_qr_uses_payable_amount() {
        let policy = MatchPolicy::new(true, Duration::seconds(300));
        let mut o = order("T1", "M1", 1000, 0);
        o.payable_amount = Money::from_cents(1001);
        assert!(policy.matches(&o, &bill(1001, "", 5)));
        assert!(!policy.matches(&o, &bill(1000, "", 5)));
    }

    #[test]
    fn traditional_mode_needs_memo_and_amount() {
        let policy = MatchPolicy::Traditional;
        let o = order("T1", "ORDER123", 550, 0);
        assert!(policy.matches(&o, &bill(550, "ORDER123", 7200)));
        assert!(!policy.matches(&o, &bill(549, "ORDER123", 10)));
        assert!(!policy.matches(&o, &bill(550, "ORDER124", 10)));
    }

    #[test]
    fn debits_and_settled_orders_never_match() {
        let policy = MatchPolicy::Traditional;
        let mut o = order("T1", "ORDER123", 550, 0);
        let mut b = bill(550, "ORDER123", 10);
        b.direction = BillDirection::Debit;
        assert!(!policy.matches(&o, &b));
        o.status = OrderStatusType::Paid;
        assert!(!policy.matches(&o, &bill(550, "ORDER123", 10)));
    }

    #[test]
    fn earliest_order_claims_an_ambiguous_bill() {
        let policy = MatchPolicy::new(true, Duration::seconds(300));
        let orders = vec![order("T3", "M3", 1000, 20), order("T2", "M2", 1000, 10), order("T1", "M1", 1000, 10)];
        let claimant = policy.resolve_claimant(&orders, &bill(1000, "", 30)).unwrap();
        assert_eq!(claimant.trade_no.as_str(), "T1");
        assert!(policy.resolve_claimant(&orders, &bill(999, "", 30)).is_none());
    }
}
