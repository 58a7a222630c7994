//! The merchant-facing order flow: taking payment requests, answering order queries and closing orders.
mod errors;
mod order_flow_api;
mod payment_objects;

pub use errors::PaymentIntakeError;
pub use order_flow_api::OrderFlowApi;
pub use payment_objects::{OrderResult, PaymentCreated};
