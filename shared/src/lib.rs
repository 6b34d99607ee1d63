pub mod chapa;
pub mod db;
pub mod domain;
pub mod models;
pub mod payments;
pub mod queue;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub use domain::*;

/// Envelope published on the task topic. The worker uses `id` for idempotency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: Uuid,
    pub task: Task,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "args", rename_all = "snake_case")]
pub enum Task {
    SendBookingConfirmationEmail { booking_id: Uuid },
    SendPaymentConfirmationEmail { payment_id: Uuid },
    SendPaymentFailedEmail { payment_id: Uuid },
    UpdatePaymentStatus { payment_id: Uuid },
    CleanupExpiredPayments,
    DebugPing,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::SendBookingConfirmationEmail { .. } => "send_booking_confirmation_email",
            Task::SendPaymentConfirmationEmail { .. } => "send_payment_confirmation_email",
            Task::SendPaymentFailedEmail { .. } => "send_payment_failed_email",
            Task::UpdatePaymentStatus { .. } => "update_payment_status",
            Task::CleanupExpiredPayments => "cleanup_expired_payments",
            Task::DebugPing => "debug_ping",
        }
    }

    /// Partition key; tasks about the same row stay ordered.
    pub fn routing_key(&self) -> String {
        match self {
            Task::SendBookingConfirmationEmail { booking_id } => booking_id.to_string(),
            Task::SendPaymentConfirmationEmail { payment_id }
            | Task::SendPaymentFailedEmail { payment_id }
            | Task::UpdatePaymentStatus { payment_id } => payment_id.to_string(),
            Task::CleanupExpiredPayments | Task::DebugPing => self.name().to_string(),
        }
    }

    /// Email task announcing a payment that just reached `status`, if any.
    pub fn follow_up_for(status: PaymentStatus, payment_id: Uuid) -> Option<Task> {
        match status {
            PaymentStatus::Completed => Some(Task::SendPaymentConfirmationEmail { payment_id }),
            PaymentStatus::Failed => Some(Task::SendPaymentFailedEmail { payment_id }),
            _ => None,
        }
    }
}

impl TaskMessage {
    pub fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_wire_format_uses_name_and_args() {
        let id = Uuid::nil();
        let json = serde_json::to_value(Task::UpdatePaymentStatus { payment_id: id }).unwrap();
        assert_eq!(json["name"], "update_payment_status");
        assert_eq!(json["args"]["payment_id"], id.to_string());

        let cleanup = serde_json::to_value(Task::CleanupExpiredPayments).unwrap();
        assert_eq!(cleanup["name"], "cleanup_expired_payments");
    }

    #[test]
    fn message_parses_from_broker_payload() {
        let raw = r#"{
            "id": "6f1c1c1e-3d4b-4b8e-9b1a-2f0c6b1e8a11",
            "task": {"name": "send_booking_confirmation_email", "args": {"booking_id": "00000000-0000-0000-0000-000000000001"}},
            "created_at": "2024-05-01T10:00:00Z"
        }"#;
        let message: TaskMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.task.name(), "send_booking_confirmation_email");
        assert_eq!(message.task.routing_key(), "00000000-0000-0000-0000-000000000001");
    }

    #[test]
    fn only_terminal_outcomes_trigger_emails() {
        let id = Uuid::new_v4();
        assert_eq!(
            Task::follow_up_for(PaymentStatus::Completed, id),
            Some(Task::SendPaymentConfirmationEmail { payment_id: id })
        );
        assert_eq!(
            Task::follow_up_for(PaymentStatus::Failed, id),
            Some(Task::SendPaymentFailedEmail { payment_id: id })
        );
        assert_eq!(Task::follow_up_for(PaymentStatus::Pending, id), None);
        assert_eq!(Task::follow_up_for(PaymentStatus::Cancelled, id), None);
    }
}
