use thiserror::Error;

use crate::{allocator::AllocationError, db::traits::OrderStoreError};

#[derive(Debug, Clone, Error)]
pub enum PaymentIntakeError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),
    #[error("Invalid parameter {field}: {reason}")]
    InvalidParameter { field: String, reason: String },
    #[error("Invalid merchant ID")]
    InvalidMerchant,
    #[error("Unsupported payment type: {0}")]
    UnsupportedPaymentType(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Could not allocate a payable amount. {0}")]
    AllocationError(#[from] AllocationError),
    #[error("Database error: {0}")]
    DatabaseError(#[from] OrderStoreError),
}

impl PaymentIntakeError {
    /// Whether the error was caused by the request rather than by the gateway.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::AllocationError(_) | Self::DatabaseError(_))
    }
}
