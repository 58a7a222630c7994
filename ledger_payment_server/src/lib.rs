//! # Ledger payment gateway server
//! This crate hosts the server for the ledger payment gateway. It is responsible for:
//! * Loading the configuration from the environment.
//! * Running the reconciliation scheduler, which polls the ledger and settles pending orders.
//! * Serving a small operator HTTP surface.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/monitor/status`: Reconciliation health, failure tracker and worker pool state.
//! * `/api/monitor/resume`: Clears a paused failure tracker.
//!
//! The `/api` routes require the `lpg_admin_token` header to match `LPG_ADMIN_TOKEN`.
pub mod cli;
pub mod config;
pub mod errors;
pub mod monitor;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
