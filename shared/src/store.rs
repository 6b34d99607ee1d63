use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::{BookingStatus, PaymentStatus};
use crate::models::*;
use crate::schema::*;

/// Persistence needed by [`crate::payments::PaymentService`].
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>>;

    async fn save_payment(&self, payment: &Payment) -> Result<()>;

    /// Saves `payment` only while its stored status is still `expected`.
    /// Returns false when another writer moved the status first.
    async fn save_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> Result<bool>;

    async fn set_booking_status(&self, booking_id: Uuid, status: BookingStatus) -> Result<()>;

    /// Cancels pending payments created before `cutoff` together with their
    /// still-pending bookings. Returns the number of payments cancelled.
    async fn cancel_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        let mut conn = self.pool.get().await?;
        let payment = payments::table
            .find(id)
            .first::<Payment>(&mut conn)
            .await
            .optional()?;
        Ok(payment)
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(payments::table.find(payment.id))
            .set(&PaymentChanges::from(payment))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn save_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            payments::table
                .filter(payments::id.eq(payment.id))
                .filter(payments::status.eq(expected.as_str())),
        )
        .set(&PaymentChanges::from(payment))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn set_booking_status(&self, booking_id: Uuid, status: BookingStatus) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::update(bookings::table.find(booking_id))
            .set(bookings::status.eq(status.as_str()))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn cancel_pending_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.pool.get().await?;

        let cancelled = conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let booking_ids = diesel::update(
                    payments::table
                        .filter(payments::status.eq(PaymentStatus::Pending.as_str()))
                        .filter(payments::created_at.lt(cutoff)),
                )
                .set((
                    payments::status.eq(PaymentStatus::Cancelled.as_str()),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(payments::booking_id)
                .get_results::<Uuid>(conn)
                .await?;

                if !booking_ids.is_empty() {
                    diesel::update(
                        bookings::table
                            .filter(bookings::id.eq_any(&booking_ids))
                            .filter(bookings::status.eq(BookingStatus::Pending.as_str())),
                    )
                    .set(bookings::status.eq(BookingStatus::Cancelled.as_str()))
                    .execute(conn)
                    .await?;
                }

                Ok(booking_ids.len())
            })
        }).await?;

        Ok(cancelled)
    }
}
