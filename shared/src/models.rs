use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use bigdecimal::BigDecimal;
use crate::domain::*;

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        customer_display_name(&self.first_name, &self.last_name, &self.username)
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::listings)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::listings)]
pub struct ListingChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_per_night: Option<BigDecimal>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bookings)]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub booked_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(listing_id: Uuid, user_id: Uuid, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            listing_id,
            user_id,
            start_date,
            end_date,
            status: BookingStatus::Pending.as_str().to_string(),
            booked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::bookings)]
pub struct BookingChanges {
    pub listing_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::reviews)]
pub struct Review {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub user_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::reviews)]
pub struct ReviewChanges {
    pub listing_id: Option<Uuid>,
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::payments)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub chapa_transaction_ref: Option<String>,
    pub checkout_url: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A pending payment with a fresh reference.
    pub fn pending(booking_id: Uuid, amount: BigDecimal, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id,
            reference: Uuid::new_v4().to_string(),
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::Pending.as_str().to_string(),
            payment_method: None,
            transaction_id: None,
            chapa_transaction_ref: None,
            checkout_url: None,
            customer_email: None,
            customer_name: None,
            customer_phone: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rows are CHECK-constrained, so an unparseable status means a schema drift.
    pub fn status(&self) -> anyhow::Result<PaymentStatus> {
        self.status
            .parse()
            .map_err(|e| anyhow::anyhow!("payment {} has {}", self.id, e))
    }

    pub fn set_status(&mut self, status: PaymentStatus) {
        self.status = status.as_str().to_string();
        self.updated_at = Utc::now();
    }
}

/// Every column a payment may change after creation.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::payments, treat_none_as_null = true)]
pub struct PaymentChanges {
    pub status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub chapa_transaction_ref: Option<String>,
    pub checkout_url: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentChanges {
    fn from(payment: &Payment) -> Self {
        Self {
            status: payment.status.clone(),
            payment_method: payment.payment_method.clone(),
            transaction_id: payment.transaction_id.clone(),
            chapa_transaction_ref: payment.chapa_transaction_ref.clone(),
            checkout_url: payment.checkout_url.clone(),
            customer_email: payment.customer_email.clone(),
            customer_name: payment.customer_name.clone(),
            customer_phone: payment.customer_phone.clone(),
            updated_at: payment.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::processed_tasks)]
pub struct ProcessedTask {
    pub task_id: Uuid,
    pub task_name: String,
    pub processed_at: DateTime<Utc>,
}
