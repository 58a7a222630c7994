use thiserror::Error;

use crate::db::traits::OrderStoreError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Cannot insert duplicate order {0}")]
    DuplicateOrder(String),
}

impl From<SqliteDatabaseError> for OrderStoreError {
    fn from(e: SqliteDatabaseError) -> Self {
        match e {
            SqliteDatabaseError::DuplicateOrder(trade_no) => OrderStoreError::DuplicateOrder(trade_no.into()),
            e => OrderStoreError::DatabaseError(e.to_string()),
        }
    }
}
