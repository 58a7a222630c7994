//! # Storage contracts
//!
//! The gateway needs exactly one kind of storage: a record of orders and their lifecycle. [`OrderStore`] describes it.
//! The SQLite backend in [`crate::db::sqlite`] is the shipped implementation.
mod order_store;

pub use order_store::{OrderStore, OrderStoreError};
