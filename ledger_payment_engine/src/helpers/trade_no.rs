use chrono::{DateTime, Local};
use rand::Rng;

use crate::db_types::TradeNo;

/// Generates a gateway trade number: the local timestamp as `yyyyMMddHHmmss` followed by six random digits.
pub fn new_trade_no() -> TradeNo {
    trade_no_at(Local::now())
}

pub fn trade_no_at(at: DateTime<Local>) -> TradeNo {
    let suffix = rand::thread_rng().gen_range(0..1_000_000);
    TradeNo(format!("{}{suffix:06}", at.format("%Y%m%d%H%M%S")))
}
