use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use log::*;
use lpg_common::Money;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LedgerClient, LedgerError};
use crate::{
    config::LedgerConfig,
    db_types::{BillDirection, BillRecord},
    helpers::{generate_sign, SIGN_TYPE},
};

pub const LEDGER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillQueryResponse {
    #[serde(default)]
    pub detail_list: Vec<BillRow>,
}

/// One row of the bill query response, exactly as the ledger sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillRow {
    #[serde(default)]
    pub alipay_order_no: String,
    /// Sent as a string by some ledger versions and as a number by others.
    #[serde(default)]
    pub trans_amount: Value,
    #[serde(default)]
    pub trans_memo: String,
    #[serde(default)]
    pub trans_dt: String,
    #[serde(default)]
    pub direction: String,
}

/// Converts a raw row into a [`BillRecord`]. `tz` is the offset the ledger's local timestamps are expressed in.
pub fn parse_bill_row(row: &BillRow, tz: &FixedOffset) -> Result<BillRecord, String> {
    if row.alipay_order_no.is_empty() {
        return Err("missing alipay_order_no".to_string());
    }
    let amount = match &row.trans_amount {
        Value::String(s) => s.trim().parse::<Money>(),
        Value::Number(n) => n.to_string().parse::<Money>(),
        v => return Err(format!("unexpected trans_amount {v}")),
    }
    .map_err(|e| e.to_string())?;
    let naive = NaiveDateTime::parse_from_str(row.trans_dt.trim(), LEDGER_TIME_FORMAT)
        .map_err(|e| format!("invalid trans_dt '{}'. {e}", row.trans_dt))?;
    let transacted_at = tz
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("ambiguous trans_dt '{}'", row.trans_dt))?
        .with_timezone(&Utc);
    Ok(BillRecord {
        counterparty_trade_id: row.alipay_order_no.clone(),
        amount,
        memo: row.trans_memo.clone(),
        transacted_at,
        direction: BillDirection::from_label(&row.direction),
    })
}

#[derive(Clone)]
pub struct HttpLedgerClient {
    config: LedgerConfig,
    client: Arc<Client>,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client =
            Client::builder().timeout(config.timeout).build().map_err(|e| LedgerError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// The signed query parameters for a bill query covering `[end - hours_back, end]`.
    pub fn query_params(&self, end: DateTime<Utc>, hours_back: u32) -> HashMap<String, String> {
        let end = end.with_timezone(&self.config.timezone);
        let start = end - Duration::hours(i64::from(hours_back));
        let mut params = HashMap::with_capacity(7);
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("start_time".to_string(), start.format(LEDGER_TIME_FORMAT).to_string());
        params.insert("end_time".to_string(), end.format(LEDGER_TIME_FORMAT).to_string());
        params.insert("page_no".to_string(), "1".to_string());
        params.insert("page_size".to_string(), PAGE_SIZE.to_string());
        let sign = generate_sign(&params, self.config.secret.reveal());
        params.insert("sign".to_string(), sign);
        params.insert("sign_type".to_string(), SIGN_TYPE.to_string());
        params
    }

    fn parse_response(&self, response: BillQueryResponse) -> Vec<BillRecord> {
        response
            .detail_list
            .iter()
            .filter_map(|row| match parse_bill_row(row, &self.config.timezone) {
                Ok(bill) => Some(bill),
                Err(e) => {
                    warn!("📒️ Skipping malformed ledger row {}: {e}", row.alipay_order_no);
                    None
                },
            })
            .collect()
    }
}

impl LedgerClient for HttpLedgerClient {
    async fn query_recent_bills(&self, hours_back: u32) -> Result<Vec<BillRecord>, LedgerError> {
        let params = self.query_params(Utc::now(), hours_back);
        trace!("📒️ Querying ledger bills for the last {hours_back}h from {}", self.config.url);
        let response = self
            .client
            .get(&self.config.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| LedgerError::Transport(e.to_string()))?;
            return Err(LedgerError::QueryError { status, message });
        }
        let body = response.json::<BillQueryResponse>().await.map_err(|e| LedgerError::JsonError(e.to_string()))?;
        let bills = self.parse_response(body);
        debug!("📒️ Ledger returned {} usable bills", bills.len());
        Ok(bills)
    }
}
