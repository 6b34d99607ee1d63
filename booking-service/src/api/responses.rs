//! JSON shapes returned by the API, with related rows nested in.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use shared::models::*;
use shared::schema::*;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub id: Uuid,
    pub listing: Listing,
    pub user: UserView,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub booked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub id: Uuid,
    pub listing: Listing,
    pub user: UserView,
    pub rating: i32,
    pub comment: String,
    pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub listing: Listing,
    pub reviews: Vec<ReviewView>,
    pub bookings: Vec<BookingView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub reference: String,
    pub booking: BookingView,
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

async fn listings_by_id(conn: &mut AsyncPgConnection, ids: Vec<Uuid>) -> QueryResult<HashMap<Uuid, Listing>> {
    let rows = listings::table
        .filter(listings::id.eq_any(ids))
        .load::<Listing>(conn)
        .await?;
    Ok(rows.into_iter().map(|listing| (listing.id, listing)).collect())
}

async fn users_by_id(conn: &mut AsyncPgConnection, ids: Vec<Uuid>) -> QueryResult<HashMap<Uuid, User>> {
    let rows = users::table
        .filter(users::id.eq_any(ids))
        .load::<User>(conn)
        .await?;
    Ok(rows.into_iter().map(|user| (user.id, user)).collect())
}

pub async fn booking_views(conn: &mut AsyncPgConnection, bookings: Vec<Booking>) -> QueryResult<Vec<BookingView>> {
    let listings = listings_by_id(conn, bookings.iter().map(|b| b.listing_id).collect()).await?;
    let users = users_by_id(conn, bookings.iter().map(|b| b.user_id).collect()).await?;

    // Foreign keys guarantee both sides exist.
    Ok(bookings
        .into_iter()
        .filter_map(|booking| {
            Some(BookingView {
                id: booking.id,
                listing: listings.get(&booking.listing_id)?.clone(),
                user: users.get(&booking.user_id)?.clone().into(),
                start_date: booking.start_date,
                end_date: booking.end_date,
                status: booking.status,
                booked_at: booking.booked_at,
            })
        })
        .collect())
}

pub async fn booking_view(conn: &mut AsyncPgConnection, booking: Booking) -> QueryResult<BookingView> {
    booking_views(conn, vec![booking])
        .await?
        .pop()
        .ok_or(diesel::result::Error::NotFound)
}

pub async fn review_views(conn: &mut AsyncPgConnection, reviews: Vec<Review>) -> QueryResult<Vec<ReviewView>> {
    let listings = listings_by_id(conn, reviews.iter().map(|r| r.listing_id).collect()).await?;
    let users = users_by_id(conn, reviews.iter().map(|r| r.user_id).collect()).await?;

    Ok(reviews
        .into_iter()
        .filter_map(|review| {
            Some(ReviewView {
                id: review.id,
                listing: listings.get(&review.listing_id)?.clone(),
                user: users.get(&review.user_id)?.clone().into(),
                rating: review.rating,
                comment: review.comment,
                reviewed_at: review.reviewed_at,
            })
        })
        .collect())
}

pub async fn review_view(conn: &mut AsyncPgConnection, review: Review) -> QueryResult<ReviewView> {
    review_views(conn, vec![review])
        .await?
        .pop()
        .ok_or(diesel::result::Error::NotFound)
}

pub async fn payment_views(conn: &mut AsyncPgConnection, payments: Vec<Payment>) -> QueryResult<Vec<PaymentView>> {
    let booking_ids: Vec<Uuid> = payments.iter().map(|p| p.booking_id).collect();
    let bookings = bookings::table
        .filter(bookings::id.eq_any(booking_ids))
        .load::<Booking>(conn)
        .await?;
    let bookings: HashMap<Uuid, BookingView> = booking_views(conn, bookings)
        .await?
        .into_iter()
        .map(|view| (view.id, view))
        .collect();

    Ok(payments
        .into_iter()
        .filter_map(|payment| {
            Some(PaymentView {
                id: payment.id,
                reference: payment.reference,
                booking: bookings.get(&payment.booking_id)?.clone(),
                amount: payment.amount,
                currency: payment.currency,
                status: payment.status,
                payment_method: payment.payment_method,
                transaction_id: payment.transaction_id,
                chapa_transaction_ref: payment.chapa_transaction_ref,
                checkout_url: payment.checkout_url,
                customer_email: payment.customer_email,
                customer_name: payment.customer_name,
                customer_phone: payment.customer_phone,
                created_at: payment.created_at,
                updated_at: payment.updated_at,
            })
        })
        .collect())
}

pub async fn payment_view(conn: &mut AsyncPgConnection, payment: Payment) -> QueryResult<PaymentView> {
    payment_views(conn, vec![payment])
        .await?
        .pop()
        .ok_or(diesel::result::Error::NotFound)
}
