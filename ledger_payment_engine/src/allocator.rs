//! Unique payable amounts for Business-QR mode.
//!
//! When every payer scans the same static QR code, the amount is the only thing that tells two pending orders apart.
//! The allocator nudges a requested amount upward by the configured offset until no live pending order carries it.
//!
//! The check and the subsequent insert must not interleave with another allocation, so [`AmountAllocator::reserve`]
//! hands back an [`AmountReservation`] that keeps the allocator's mutex locked. Persist the order, then drop the
//! reservation.
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::*;
use lpg_common::{Money, MAX_PAYMENT_AMOUNT};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    config::PaymentConfig,
    db::traits::{OrderStore, OrderStoreError},
};

pub const MAX_ALLOCATION_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error("Could not find a free payable amount for {requested} after {attempts} attempts")]
    Exhausted { requested: Money, attempts: usize },
    #[error("The adjusted amount {0} exceeds the maximum payable amount")]
    OutOfRange(Money),
    #[error("Could not check existing amounts. {0}")]
    StoreError(#[from] OrderStoreError),
}

/// A payable amount that is guaranteed not to collide with any live pending order for as long as the reservation is
/// held.
#[derive(Debug)]
pub struct AmountReservation {
    requested: Money,
    amount: Money,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl AmountReservation {
    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn requested(&self) -> Money {
        self.requested
    }

    pub fn is_adjusted(&self) -> bool {
        self.amount != self.requested
    }
}

#[derive(Clone)]
pub struct AmountAllocator<B> {
    db: B,
    lock: Arc<Mutex<()>>,
    enabled: bool,
    offset: Money,
    order_timeout: Duration,
}

impl<B: OrderStore> AmountAllocator<B> {
    pub fn new(db: B, config: &PaymentConfig) -> Self {
        Self {
            db,
            lock: Arc::new(Mutex::new(())),
            enabled: config.business_qr_mode,
            offset: config.amount_offset,
            order_timeout: config.order_timeout,
        }
    }

    /// Finds a payable amount for `requested`. In traditional mode the requested amount is returned as-is and no lock
    /// is taken.
    pub async fn reserve(&self, requested: Money) -> Result<AmountReservation, AllocationError> {
        if !self.enabled {
            return Ok(AmountReservation { requested, amount: requested, _guard: None });
        }
        let guard = self.lock.clone().lock_owned().await;
        let since = Utc::now() - self.order_timeout;
        let mut candidate = requested;
        for attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            if candidate > MAX_PAYMENT_AMOUNT {
                return Err(AllocationError::OutOfRange(candidate));
            }
            if !self.db.amount_exists(candidate, since).await? {
                if attempt > 0 {
                    info!("💰️ Amount {requested} is in use. Allocated {candidate} after {attempt} adjustments");
                }
                return Ok(AmountReservation { requested, amount: candidate, _guard: Some(guard) });
            }
            trace!("💰️ Amount {candidate} is taken by a pending order");
            candidate += self.offset;
        }
        warn!("💰️ Gave up allocating a unique amount for {requested} after {MAX_ALLOCATION_ATTEMPTS} attempts");
        Err(AllocationError::Exhausted { requested, attempts: MAX_ALLOCATION_ATTEMPTS })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        db_types::NewOrder,
        test_utils::prepare_env::{prepare_test_env, random_db_path},
        SqliteDatabase,
    };

    async fn allocator(enabled: bool, offset: i64) -> (SqliteDatabase, AmountAllocator<SqliteDatabase>) {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let config =
            PaymentConfig { business_qr_mode: enabled, amount_offset: Money::from_cents(offset), ..Default::default() };
        (db.clone(), AmountAllocator::new(db, &config))
    }

    async fn persist(db: &SqliteDatabase, trade_no: &str, reservation: &AmountReservation) {
        let order = NewOrder::new(trade_no.into(), trade_no, "1001", reservation.requested())
            .with_payable_amount(reservation.amount());
        db.create_order(order).await.unwrap();
    }

    #[tokio::test]
    async fn traditional_mode_passes_amount_through() {
        let (db, allocator) = allocator(false, 1).await;
        let r = allocator.reserve(Money::from_cents(1000)).await.unwrap();
        persist(&db, "A", &r).await;
        drop(r);
        let r = allocator.reserve(Money::from_cents(1000)).await.unwrap();
        assert_eq!(r.amount(), Money::from_cents(1000));
        assert!(!r.is_adjusted());
    }

    #[tokio::test]
    async fn contested_amounts_are_offset() {
        let (db, allocator) = allocator(true, 1).await;
        let mut amounts = Vec::new();
        for i in 0..3 {
            let r = allocator.reserve(Money::from_cents(1000)).await.unwrap();
            persist(&db, &format!("T{i}"), &r).await;
            amounts.push(r.amount().cents());
        }
        assert_eq!(amounts, vec![1000, 1001, 1002]);
    }

    #[tokio::test]
    async fn exhaustion_is_reported() {
        let (db, allocator) = allocator(true, 0).await;
        let r = allocator.reserve(Money::from_cents(500)).await.unwrap();
        persist(&db, "T0", &r).await;
        drop(r);
        let err = allocator.reserve(Money::from_cents(500)).await.unwrap_err();
        assert!(matches!(err, AllocationError::Exhausted { attempts: MAX_ALLOCATION_ATTEMPTS, .. }));
    }
}
