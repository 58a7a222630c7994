//! Access to the upstream transaction ledger ("bills").
//!
//! The gateway cannot be told about payments. It can only ask the ledger which transfers happened recently. The
//! [`LedgerClient`] trait is that question; [`HttpLedgerClient`] asks it over HTTP.
mod http_client;

use std::future::Future;

pub use http_client::{parse_bill_row, BillQueryResponse, BillRow, HttpLedgerClient, LEDGER_TIME_FORMAT};
use thiserror::Error;

use crate::db_types::BillRecord;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Could not initialize ledger client: {0}")]
    Initialization(String),
    #[error("Ledger request failed: {0}")]
    Transport(String),
    #[error("Ledger query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Could not deserialize ledger response: {0}")]
    JsonError(String),
    #[error("Ledger query was cancelled")]
    Cancelled,
}

pub trait LedgerClient: Clone + Send + Sync + 'static {
    /// Fetches the ledger entries recorded in the last `hours_back` hours.
    fn query_recent_bills(&self, hours_back: u32) -> impl Future<Output = Result<Vec<BillRecord>, LedgerError>> + Send;
}
