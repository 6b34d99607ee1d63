use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use shared::db::DbPool;
use shared::models::*;
use shared::payments::{PaymentError, PaymentService};
use shared::schema::*;
use shared::{Task, TaskMessage};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::mailer::Mailer;
use crate::templates::{self, Email};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEmail {
    Confirmation,
    Failed,
}

impl PaymentEmail {
    pub fn render(self, user: &User, payment: &Payment, booking: &Booking, listing: &Listing) -> Email {
        match self {
            PaymentEmail::Confirmation => templates::payment_confirmation(user, payment, booking, listing),
            PaymentEmail::Failed => templates::payment_failed(user, payment, booking, listing),
        }
    }
}

/// Parses a task envelope. Malformed payloads are logged and skipped.
pub fn decode(payload: &str) -> Option<TaskMessage> {
    match serde_json::from_str::<TaskMessage>(payload) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Skipping malformed task message: {}", e);
            None
        }
    }
}

pub struct TaskHandler {
    pool: DbPool,
    payments: Arc<PaymentService>,
    mailer: Arc<dyn Mailer>,
    payment_expiry: chrono::Duration,
}

impl TaskHandler {
    pub fn new(
        pool: DbPool,
        payments: Arc<PaymentService>,
        mailer: Arc<dyn Mailer>,
        payment_expiry: chrono::Duration,
    ) -> Self {
        Self { pool, payments, mailer, payment_expiry }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    if let Some(payload) = m.payload_view::<str>() {
                        match payload {
                            Ok(json_str) => {
                                if let Some(message) = decode(json_str) {
                                    if let Err(e) = self.handle_message(message).await {
                                        error!("Error handling task: {}", e);
                                    }
                                }
                            }
                            Err(e) => error!("Error parsing payload: {}", e),
                        }
                    }
                    if let Err(e) = consumer.commit_message(&m, CommitMode::Async) {
                        error!("Error committing message: {}", e);
                    }
                }
                Err(e) => error!("Error receiving message: {}", e),
            }
        }
    }

    async fn handle_message(&self, message: TaskMessage) -> Result<()> {
        {
            let mut conn = self.pool.get().await?;
            if is_processed(&mut conn, message.id).await? {
                info!(task_id = %message.id, task = message.task.name(), "Task already processed, skipping");
                return Ok(());
            }
        }

        info!(task_id = %message.id, task = message.task.name(), "Handling task");
        self.dispatch(&message.task).await?;

        let mut conn = self.pool.get().await?;
        store_processed(&mut conn, &message).await
    }

    async fn dispatch(&self, task: &Task) -> Result<()> {
        match *task {
            Task::SendBookingConfirmationEmail { booking_id } => self.send_booking_confirmation(booking_id).await,
            Task::SendPaymentConfirmationEmail { payment_id } => {
                self.send_payment_email(payment_id, PaymentEmail::Confirmation).await
            }
            Task::SendPaymentFailedEmail { payment_id } => self.send_payment_email(payment_id, PaymentEmail::Failed).await,
            Task::UpdatePaymentStatus { payment_id } => {
                self.update_payment_status(payment_id).await;
                Ok(())
            }
            Task::CleanupExpiredPayments => {
                if let Err(e) = self.payments.cancel_expired_payments(self.payment_expiry).await {
                    error!("Error cleaning up expired payments: {}", e);
                }
                Ok(())
            }
            Task::DebugPing => {
                info!("Debug task received");
                Ok(())
            }
        }
    }

    async fn send_booking_confirmation(&self, booking_id: Uuid) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let Some((booking, listing, user)) = load_booking(&mut conn, booking_id).await? else {
            error!(%booking_id, "Booking not found");
            return Ok(());
        };
        drop(conn);

        let email = templates::booking_confirmation(&user, &booking, &listing);
        self.deliver(email).await;
        Ok(())
    }

    async fn send_payment_email(&self, payment_id: Uuid, kind: PaymentEmail) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let Some(payment) = payments::table.find(payment_id).first::<Payment>(&mut conn).await.optional()? else {
            error!(%payment_id, "Payment not found");
            return Ok(());
        };
        let Some((booking, listing, user)) = load_booking(&mut conn, payment.booking_id).await? else {
            error!(%payment_id, booking_id = %payment.booking_id, "Booking for payment not found");
            return Ok(());
        };
        drop(conn);

        let email = kind.render(&user, &payment, &booking, &listing);
        self.deliver(email).await;
        Ok(())
    }

    async fn update_payment_status(&self, payment_id: Uuid) {
        match self.payments.verify_payment_status(payment_id).await {
            Ok(verified) => {
                info!(%payment_id, status = %verified.status, "Payment status verified");
            }
            Err(PaymentError::NotFound(_)) => error!(%payment_id, "Payment not found"),
            Err(e) => error!(%payment_id, "Failed to update payment status: {}", e),
        }
    }

    /// Delivery failures are logged; the task still completes.
    async fn deliver(&self, email: Email) {
        if email.to.is_empty() {
            warn!(subject = %email.subject, "Recipient has no email address, skipping");
            return;
        }
        if let Err(e) = self.mailer.send(&email).await {
            error!(to = %email.to, subject = %email.subject, "Error sending email: {}", e);
        }
    }
}

async fn is_processed(conn: &mut AsyncPgConnection, task_id: Uuid) -> Result<bool> {
    let processed = diesel::select(diesel::dsl::exists(processed_tasks::table.find(task_id)))
        .get_result::<bool>(conn)
        .await?;
    Ok(processed)
}

/// Redelivered tasks hit the primary key and are ignored.
async fn store_processed(conn: &mut AsyncPgConnection, message: &TaskMessage) -> Result<()> {
    let processed_task = ProcessedTask {
        task_id: message.id,
        task_name: message.task.name().to_string(),
        processed_at: Utc::now(),
    };

    diesel::insert_into(processed_tasks::table)
        .values(&processed_task)
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    Ok(())
}

async fn load_booking(conn: &mut AsyncPgConnection, booking_id: Uuid) -> Result<Option<(Booking, Listing, User)>> {
    let row = bookings::table
        .inner_join(listings::table)
        .inner_join(users::table)
        .filter(bookings::id.eq(booking_id))
        .select((bookings::all_columns, listings::all_columns, users::all_columns))
        .first::<(Booking, Listing, User)>(conn)
        .await
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn decodes_task_envelopes() {
        let payment_id = Uuid::new_v4();
        let json = serde_json::to_string(&TaskMessage::new(Task::UpdatePaymentStatus { payment_id })).unwrap();

        let message = decode(&json).unwrap();
        assert_eq!(message.task, Task::UpdatePaymentStatus { payment_id });

        let raw = format!(
            r#"{{"id":"{}","task":{{"name":"cleanup_expired_payments"}},"created_at":"2024-09-10T08:00:00Z"}}"#,
            Uuid::new_v4()
        );
        assert_eq!(decode(&raw).unwrap().task, Task::CleanupExpiredPayments);
    }

    #[tokio::test]
    #[ignore] // Requires PostgreSQL running
    async fn processed_tasks_are_recorded_once() {
        let pool = shared::testing::pool().await;
        let mut conn = pool.get().await.unwrap();
        let message = TaskMessage::new(Task::DebugPing);

        assert!(!is_processed(&mut conn, message.id).await.unwrap());

        store_processed(&mut conn, &message).await.unwrap();
        assert!(is_processed(&mut conn, message.id).await.unwrap());

        store_processed(&mut conn, &message).await.unwrap();
        let rows = processed_tasks::table
            .filter(processed_tasks::task_id.eq(message.id))
            .count()
            .get_result::<i64>(&mut conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let name = processed_tasks::table
            .find(message.id)
            .select(processed_tasks::task_name)
            .first::<String>(&mut conn)
            .await
            .unwrap();
        assert_eq!(name, "debug_ping");
    }

    #[test]
    fn skips_malformed_payloads() {
        assert!(decode("not json").is_none());
        assert!(decode(r#"{"id":"x","task":{"name":"reboot"}}"#).is_none());
    }

    #[test]
    fn payment_email_kind_picks_template() {
        let user = User {
            id: Uuid::new_v4(),
            username: "sara".to_string(),
            email: "sara@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            created_at: Utc::now(),
        };
        let listing = Listing {
            id: Uuid::new_v4(),
            title: "Rustic Farmhouse".to_string(),
            description: String::new(),
            price_per_night: "80.00".parse().unwrap(),
            location: "Denver".to_string(),
            created_at: Utc::now(),
        };
        let booking = Booking::new(
            listing.id,
            user.id,
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 3).unwrap(),
        );
        let payment = Payment::pending(booking.id, "160.00".parse().unwrap(), "ETB");

        let confirmed = PaymentEmail::Confirmation.render(&user, &payment, &booking, &listing);
        assert_eq!(confirmed.subject, "Payment Confirmation - Rustic Farmhouse");
        assert!(confirmed.text.starts_with("Hi sara,"));

        let failed = PaymentEmail::Failed.render(&user, &payment, &booking, &listing);
        assert_eq!(failed.subject, "Payment Failed - Rustic Farmhouse");
        assert_eq!(failed.to, "sara@example.com");
    }
}
