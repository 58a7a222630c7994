//! Ledger Payment Engine
//!
//! The engine behind a payment gateway for a provider that offers no payment webhooks. Payments are confirmed by
//! polling the payee's transaction ledger and matching its entries against pending orders.
//!
//! The library is divided into a few main sections:
//! 1. Order storage ([`mod@db`]). The [`OrderStore`] trait defines what the engine needs from a backend. SQLite is the
//!    supported backend. The data types are defined in [`mod@db_types`].
//! 2. The merchant-facing order flow ([`OrderFlowApi`]): validating signed payment requests, allocating a unique
//!    payable amount ([`mod@allocator`]) when orders can only be told apart by amount, order queries and closing.
//! 3. Reconciliation ([`mod@reconciliation`]): a scheduler that periodically fans pending orders out to a worker
//!    pool, where each task queries the ledger ([`mod@ledger`]), matches bills ([`mod@matching`]), settles the order
//!    and notifies the merchant ([`mod@notifier`]).
//!
//! The engine also emits events when orders are created, paid or closed. Hook into them through [`mod@events`].
pub mod allocator;
pub mod config;
pub mod db;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger;
pub mod matching;
pub mod notifier;
pub mod reconciliation;

mod api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{OrderFlowApi, OrderResult, PaymentCreated, PaymentIntakeError};
#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::traits::{OrderStore, OrderStoreError};
