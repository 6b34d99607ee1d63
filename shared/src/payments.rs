use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chapa::{ChapaError, InitializeRequest, PaymentGateway};
use crate::domain::*;
use crate::models::{Booking, Listing, Payment, User};
use crate::queue::TaskQueue;
use crate::store::PaymentStore;
use crate::Task;

pub const DEFAULT_PAYMENT_EXPIRY_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment {0} not found")]
    NotFound(Uuid),

    #[error("No Chapa transaction reference found")]
    NoTransactionReference,

    #[error("Payment is already {0}")]
    AlreadyFinal(PaymentStatus),

    #[error("Payment has no customer email")]
    MissingCustomerEmail,

    #[error("Booking end date must be after its start date")]
    InvalidStay,

    #[error(transparent)]
    Gateway(#[from] ChapaError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct InitiateOptions {
    pub payment_method: Option<PaymentMethod>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitiatedPayment {
    pub payment_id: Uuid,
    pub reference: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
}

/// The pending payment that goes with a freshly created booking.
pub fn payment_for_booking(booking: &Booking, listing: &Listing, user: &User) -> Result<Payment, PaymentError> {
    let amount = booking_total(&listing.price_per_night, booking.start_date, booking.end_date)
        .ok_or(PaymentError::InvalidStay)?;

    let mut payment = Payment::pending(booking.id, amount, DEFAULT_CURRENCY);
    payment.customer_email = Some(user.email.clone()).filter(|email| !email.is_empty());
    payment.customer_name = Some(user.display_name());
    Ok(payment)
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    queue: Arc<dyn TaskQueue>,
    public_base_url: String,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        queue: Arc<dyn TaskQueue>,
        public_base_url: String,
    ) -> Self {
        Self {
            gateway,
            store,
            queue,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn load(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))
    }

    fn initialize_request(&self, payment: &Payment) -> Result<InitializeRequest, PaymentError> {
        let email = payment
            .customer_email
            .clone()
            .filter(|email| !email.is_empty())
            .ok_or(PaymentError::MissingCustomerEmail)?;
        let (first_name, last_name) = split_customer_name(payment.customer_name.as_deref().unwrap_or_default());

        Ok(InitializeRequest {
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            email,
            first_name,
            last_name,
            tx_ref: payment.reference.clone(),
            callback_url: format!("{}/api/payments/{}/verify", self.public_base_url, payment.id),
            return_url: format!("{}/payment/success/{}", self.public_base_url, payment.reference),
            booking_reference: format!("BK-{}", payment.booking_id),
        })
    }

    /// Opens a Chapa checkout for the payment. A gateway failure marks the payment failed.
    pub async fn initiate_payment(
        &self,
        payment_id: Uuid,
        options: InitiateOptions,
    ) -> Result<InitiatedPayment, PaymentError> {
        let mut payment = self.load(payment_id).await?;

        let current = payment.status()?;
        if matches!(current, PaymentStatus::Completed | PaymentStatus::Cancelled) {
            return Err(PaymentError::AlreadyFinal(current));
        }

        if let Some(method) = options.payment_method {
            payment.payment_method = Some(method.as_str().to_string());
        }
        if let Some(phone) = options.customer_phone.filter(|phone| !phone.is_empty()) {
            payment.customer_phone = Some(phone);
        }

        let request = self.initialize_request(&payment)?;

        match self.gateway.initialize(&request).await {
            Ok(initialized) => {
                payment.chapa_transaction_ref = Some(initialized.transaction_ref);
                payment.checkout_url = Some(initialized.checkout_url.clone());
                payment.set_status(PaymentStatus::Processing);
                self.store.save_payment(&payment).await?;

                info!(payment_id = %payment.id, reference = %payment.reference, "Payment initiated");
                Ok(InitiatedPayment {
                    payment_id: payment.id,
                    reference: payment.reference,
                    checkout_url: initialized.checkout_url,
                })
            }
            Err(e) => {
                warn!(payment_id = %payment.id, "Payment initiation failed: {}", e);
                payment.set_status(PaymentStatus::Failed);
                self.store.save_payment(&payment).await?;
                Err(e.into())
            }
        }
    }

    /// Re-reads the transaction from Chapa and stores the mapped status.
    ///
    /// A transition to `completed` confirms the booking; transitions to
    /// `completed` or `failed` enqueue the matching customer email. The update
    /// only applies while the stored status is the one read here, so concurrent
    /// verifications run the follow-up once.
    pub async fn verify_payment_status(&self, payment_id: Uuid) -> Result<VerifiedPayment, PaymentError> {
        let mut payment = self.load(payment_id).await?;
        let transaction_ref = payment
            .chapa_transaction_ref
            .clone()
            .filter(|reference| !reference.is_empty())
            .ok_or(PaymentError::NoTransactionReference)?;

        let verified = self.gateway.verify(&transaction_ref).await?;
        let status = PaymentStatus::from_chapa(&verified.status);

        let previous = payment.status()?;
        if previous != status {
            payment.set_status(status);
            if self.store.save_payment_if(&payment, previous).await? {
                info!(payment_id = %payment.id, status = %status, "Payment status updated");
                self.on_transition(&payment, status).await?;
            } else {
                info!(payment_id = %payment.id, status = %status, "Payment status already changed, skipping follow-up");
            }
        }

        Ok(VerifiedPayment {
            payment_id: payment.id,
            status,
            amount: verified.amount,
            currency: verified.currency,
        })
    }

    async fn on_transition(&self, payment: &Payment, status: PaymentStatus) -> Result<(), PaymentError> {
        match status {
            PaymentStatus::Completed => {
                self.store.set_booking_status(payment.booking_id, BookingStatus::Confirmed).await?
            }
            PaymentStatus::Cancelled => {
                self.store.set_booking_status(payment.booking_id, BookingStatus::Cancelled).await?
            }
            _ => {}
        }

        if let Some(task) = Task::follow_up_for(status, payment.id) {
            // The status is already stored; a lost email is not worth failing the verification.
            if let Err(e) = self.queue.enqueue(task).await {
                error!(payment_id = %payment.id, "Failed to enqueue payment email: {}", e);
            }
        }
        Ok(())
    }

    pub async fn cancel_expired_payments(&self, max_age: Duration) -> Result<usize, PaymentError> {
        let cutoff = Utc::now() - max_age;
        let cancelled = self.store.cancel_pending_before(cutoff).await?;
        info!(count = cancelled, %cutoff, "Cleaned up expired payments");
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapa::{InitializedTransaction, VerifiedTransaction};
    use crate::TaskMessage;
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        payments: Mutex<HashMap<Uuid, Payment>>,
        bookings: Mutex<HashMap<Uuid, BookingStatus>>,
        // Applied right after a read, as if another verifier finished first.
        racing_status: Mutex<Option<PaymentStatus>>,
    }

    impl MemoryStore {
        fn insert(&self, payment: Payment) {
            self.bookings.lock().unwrap().insert(payment.booking_id, BookingStatus::Pending);
            self.payments.lock().unwrap().insert(payment.id, payment);
        }

        fn payment(&self, id: Uuid) -> Payment {
            self.payments.lock().unwrap()[&id].clone()
        }

        fn booking_status(&self, id: Uuid) -> BookingStatus {
            self.bookings.lock().unwrap()[&id]
        }
    }

    #[async_trait]
    impl PaymentStore for MemoryStore {
        async fn find_payment(&self, id: Uuid) -> anyhow::Result<Option<Payment>> {
            let mut payments = self.payments.lock().unwrap();
            let found = payments.get(&id).cloned();
            if let (Some(status), Some(stored)) = (self.racing_status.lock().unwrap().take(), payments.get_mut(&id)) {
                stored.set_status(status);
            }
            Ok(found)
        }

        async fn save_payment(&self, payment: &Payment) -> anyhow::Result<()> {
            self.payments.lock().unwrap().insert(payment.id, payment.clone());
            Ok(())
        }

        async fn save_payment_if(&self, payment: &Payment, expected: PaymentStatus) -> anyhow::Result<bool> {
            let mut payments = self.payments.lock().unwrap();
            match payments.get(&payment.id) {
                Some(stored) if stored.status == expected.as_str() => {
                    payments.insert(payment.id, payment.clone());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn set_booking_status(&self, booking_id: Uuid, status: BookingStatus) -> anyhow::Result<()> {
            self.bookings.lock().unwrap().insert(booking_id, status);
            Ok(())
        }

        async fn cancel_pending_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
            let mut payments = self.payments.lock().unwrap();
            let mut bookings = self.bookings.lock().unwrap();
            let mut count = 0;
            for payment in payments.values_mut() {
                if payment.status == "pending" && payment.created_at < cutoff {
                    payment.set_status(PaymentStatus::Cancelled);
                    if bookings.get(&payment.booking_id) == Some(&BookingStatus::Pending) {
                        bookings.insert(payment.booking_id, BookingStatus::Cancelled);
                    }
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    #[derive(Default)]
    struct StubGateway {
        reject_initialize: bool,
        verify_status: Option<&'static str>,
        initialized: Mutex<Vec<InitializeRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn initialize(&self, request: &InitializeRequest) -> Result<InitializedTransaction, ChapaError> {
            self.initialized.lock().unwrap().push(request.clone());
            if self.reject_initialize {
                return Err(ChapaError::Api {
                    status: StatusCode::BAD_REQUEST,
                    message: "Invalid currency".to_string(),
                });
            }
            Ok(InitializedTransaction {
                checkout_url: format!("https://checkout.chapa.co/checkout/payment/{}", request.tx_ref),
                transaction_ref: request.tx_ref.clone(),
                status: Some("success".to_string()),
                message: Some("Hosted Link".to_string()),
            })
        }

        async fn verify(&self, transaction_ref: &str) -> Result<VerifiedTransaction, ChapaError> {
            match self.verify_status {
                Some(status) => Ok(VerifiedTransaction {
                    status: status.to_string(),
                    amount: Some("300".parse().unwrap()),
                    currency: Some("ETB".to_string()),
                    transaction_ref: Some(transaction_ref.to_string()),
                    message: None,
                }),
                None => Err(ChapaError::Api {
                    status: StatusCode::NOT_FOUND,
                    message: "Transaction not found".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingQueue {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskQueue for RecordingQueue {
        async fn enqueue(&self, task: Task) -> anyhow::Result<TaskMessage> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(TaskMessage::new(task))
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<StubGateway>,
        queue: Arc<RecordingQueue>,
        service: PaymentService,
    }

    fn harness(gateway: StubGateway) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(gateway);
        let queue = Arc::new(RecordingQueue::default());
        let service = PaymentService::new(
            gateway.clone(),
            store.clone(),
            queue.clone(),
            "https://travel.example.com/".to_string(),
        );
        Harness { store, gateway, queue, service }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "tester".to_string(),
            email: "test@example.com".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            created_at: Utc::now(),
        }
    }

    fn listing() -> Listing {
        Listing {
            id: Uuid::new_v4(),
            title: "Beachside Bungalow".to_string(),
            description: "Steps from the sand".to_string(),
            price_per_night: "100.00".parse().unwrap(),
            location: "Miami".to_string(),
            created_at: Utc::now(),
        }
    }

    fn stay(listing: &Listing, user: &User, nights: u64) -> Booking {
        let start = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        let end = start + chrono::Days::new(nights);
        Booking::new(listing.id, user.id, start, end)
    }

    fn pending_payment(h: &Harness) -> Payment {
        let (user, listing) = (user(), listing());
        let payment = payment_for_booking(&stay(&listing, &user, 3), &listing, &user).unwrap();
        h.store.insert(payment.clone());
        payment
    }

    fn processing_payment(h: &Harness) -> Payment {
        let mut payment = pending_payment(h);
        payment.chapa_transaction_ref = Some(payment.reference.clone());
        payment.set_status(PaymentStatus::Processing);
        h.store.insert(payment.clone());
        payment
    }

    #[test]
    fn booking_payment_is_pending_and_priced_per_night() {
        let (user, listing) = (user(), listing());
        let booking = stay(&listing, &user, 3);
        let payment = payment_for_booking(&booking, &listing, &user).unwrap();

        assert_eq!(payment.booking_id, booking.id);
        assert_eq!(payment.amount, "300.00".parse::<BigDecimal>().unwrap());
        assert_eq!(payment.currency, "ETB");
        assert_eq!(payment.status, "pending");
        assert_eq!(payment.customer_email.as_deref(), Some("test@example.com"));
        assert_eq!(payment.customer_name.as_deref(), Some("Test User"));
        assert!(!payment.reference.is_empty());
    }

    #[test]
    fn zero_night_booking_cannot_be_priced() {
        let (user, listing) = (user(), listing());
        let booking = stay(&listing, &user, 0);
        assert!(matches!(
            payment_for_booking(&booking, &listing, &user),
            Err(PaymentError::InvalidStay)
        ));
    }

    #[tokio::test]
    async fn initiating_sets_processing_and_checkout_url() {
        let h = harness(StubGateway::default());
        let payment = pending_payment(&h);

        let initiated = h
            .service
            .initiate_payment(
                payment.id,
                InitiateOptions {
                    payment_method: Some(PaymentMethod::MobileMoney),
                    customer_phone: Some("0911223344".to_string()),
                },
            )
            .await
            .unwrap();

        assert!(!initiated.checkout_url.is_empty());
        assert_eq!(initiated.reference, payment.reference);

        let stored = h.store.payment(payment.id);
        assert_eq!(stored.status, "processing");
        assert_eq!(stored.checkout_url.as_deref(), Some(initiated.checkout_url.as_str()));
        assert_eq!(stored.chapa_transaction_ref.as_deref(), Some(payment.reference.as_str()));
        assert_eq!(stored.payment_method.as_deref(), Some("mobile_money"));
        assert_eq!(stored.customer_phone.as_deref(), Some("0911223344"));

        let sent = h.gateway.initialized.lock().unwrap()[0].clone();
        assert_eq!(sent.first_name, "Test");
        assert_eq!(sent.last_name, "User");
        assert_eq!(sent.booking_reference, format!("BK-{}", payment.booking_id));
        assert_eq!(
            sent.callback_url,
            format!("https://travel.example.com/api/payments/{}/verify", payment.id)
        );
        assert_eq!(
            sent.return_url,
            format!("https://travel.example.com/payment/success/{}", payment.reference)
        );
    }

    #[tokio::test]
    async fn rejected_initiation_marks_payment_failed() {
        let h = harness(StubGateway { reject_initialize: true, ..Default::default() });
        let payment = pending_payment(&h);

        let err = h.service.initiate_payment(payment.id, InitiateOptions::default()).await.unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(ChapaError::Api { .. })));
        assert_eq!(h.store.payment(payment.id).status, "failed");
        assert!(h.store.payment(payment.id).checkout_url.is_none());
    }

    #[tokio::test]
    async fn completed_payments_cannot_be_initiated_again() {
        let h = harness(StubGateway::default());
        let mut payment = pending_payment(&h);
        payment.set_status(PaymentStatus::Completed);
        h.store.insert(payment.clone());

        let err = h.service.initiate_payment(payment.id, InitiateOptions::default()).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyFinal(PaymentStatus::Completed)));
        assert!(h.gateway.initialized.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn verifying_success_completes_and_sends_confirmation() {
        let h = harness(StubGateway { verify_status: Some("success"), ..Default::default() });
        let payment = processing_payment(&h);

        let verified = h.service.verify_payment_status(payment.id).await.unwrap();

        assert_eq!(verified.status, PaymentStatus::Completed);
        assert_eq!(verified.currency.as_deref(), Some("ETB"));
        assert_eq!(h.store.payment(payment.id).status, "completed");
        assert_eq!(h.store.booking_status(payment.booking_id), BookingStatus::Confirmed);
        assert_eq!(
            *h.queue.tasks.lock().unwrap(),
            vec![Task::SendPaymentConfirmationEmail { payment_id: payment.id }]
        );
    }

    #[tokio::test]
    async fn verifying_failure_marks_failed_and_sends_notice() {
        let h = harness(StubGateway { verify_status: Some("failed"), ..Default::default() });
        let payment = processing_payment(&h);

        let verified = h.service.verify_payment_status(payment.id).await.unwrap();

        assert_eq!(verified.status, PaymentStatus::Failed);
        assert_eq!(h.store.payment(payment.id).status, "failed");
        assert_eq!(h.store.booking_status(payment.booking_id), BookingStatus::Pending);
        assert_eq!(
            *h.queue.tasks.lock().unwrap(),
            vec![Task::SendPaymentFailedEmail { payment_id: payment.id }]
        );
    }

    #[tokio::test]
    async fn repeated_verification_does_not_resend_email() {
        let h = harness(StubGateway { verify_status: Some("success"), ..Default::default() });
        let payment = processing_payment(&h);

        h.service.verify_payment_status(payment.id).await.unwrap();
        h.service.verify_payment_status(payment.id).await.unwrap();

        assert_eq!(h.queue.tasks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_verification_sends_email_once() {
        let h = harness(StubGateway { verify_status: Some("success"), ..Default::default() });
        let payment = processing_payment(&h);
        *h.store.racing_status.lock().unwrap() = Some(PaymentStatus::Completed);

        let verified = h.service.verify_payment_status(payment.id).await.unwrap();

        assert_eq!(verified.status, PaymentStatus::Completed);
        assert_eq!(h.store.payment(payment.id).status, "completed");
        assert_eq!(h.store.booking_status(payment.booking_id), BookingStatus::Pending);
        assert!(h.queue.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn verification_requires_a_transaction_reference() {
        let h = harness(StubGateway { verify_status: Some("success"), ..Default::default() });
        let payment = pending_payment(&h);

        let err = h.service.verify_payment_status(payment.id).await.unwrap_err();
        assert!(matches!(err, PaymentError::NoTransactionReference));
        assert_eq!(h.store.payment(payment.id).status, "pending");
    }

    #[tokio::test]
    async fn gateway_errors_leave_status_untouched() {
        let h = harness(StubGateway::default());
        let payment = processing_payment(&h);

        let err = h.service.verify_payment_status(payment.id).await.unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(_)));
        assert_eq!(h.store.payment(payment.id).status, "processing");
        assert!(h.queue.tasks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let h = harness(StubGateway::default());
        let missing = Uuid::new_v4();
        let err = h.service.verify_payment_status(missing).await.unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn cleanup_cancels_only_stale_pending_payments() {
        let h = harness(StubGateway::default());

        let mut stale = pending_payment(&h);
        stale.created_at = Utc::now() - Duration::hours(25);
        h.store.insert(stale.clone());

        let fresh = pending_payment(&h);

        let mut stale_processing = processing_payment(&h);
        stale_processing.created_at = Utc::now() - Duration::hours(48);
        h.store.insert(stale_processing.clone());

        let cancelled = h
            .service
            .cancel_expired_payments(Duration::hours(DEFAULT_PAYMENT_EXPIRY_HOURS))
            .await
            .unwrap();

        assert_eq!(cancelled, 1);
        assert_eq!(h.store.payment(stale.id).status, "cancelled");
        assert_eq!(h.store.booking_status(stale.booking_id), BookingStatus::Cancelled);
        assert_eq!(h.store.payment(fresh.id).status, "pending");
        assert_eq!(h.store.payment(stale_processing.id).status, "processing");
    }
}
