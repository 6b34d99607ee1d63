use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::models::*;
use shared::schema::*;
use uuid::Uuid;

use super::{ApiError, ApiResult};

/// ILIKE pattern matching `search` as a literal substring.
pub fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.trim().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub async fn ensure_listing_exists(conn: &mut AsyncPgConnection, id: Uuid) -> ApiResult<()> {
    let exists = diesel::select(diesel::dsl::exists(listings::table.find(id)))
        .get_result::<bool>(conn)
        .await?;
    if !exists {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

/// Like [`ensure_listing_exists`], for a listing named in a request body.
pub async fn ensure_listing_referenced(conn: &mut AsyncPgConnection, id: Uuid) -> ApiResult<()> {
    match ensure_listing_exists(conn, id).await {
        Err(ApiError::NotFound) => Err(ApiError::invalid("listing does not exist")),
        other => other,
    }
}

pub async fn find_listing(conn: &mut AsyncPgConnection, id: Uuid) -> ApiResult<Listing> {
    listings::table
        .find(id)
        .first::<Listing>(conn)
        .await
        .optional()?
        .ok_or(ApiError::NotFound)
}

pub async fn find_user(conn: &mut AsyncPgConnection, id: Uuid) -> ApiResult<User> {
    users::table
        .find(id)
        .first::<User>(conn)
        .await
        .optional()?
        .ok_or(ApiError::NotFound)
}

pub async fn reviews_for_listing(conn: &mut AsyncPgConnection, listing_id: Uuid) -> QueryResult<Vec<Review>> {
    reviews::table
        .filter(reviews::listing_id.eq(listing_id))
        .order(reviews::reviewed_at.desc())
        .load::<Review>(conn)
        .await
}

pub async fn bookings_for_listing(conn: &mut AsyncPgConnection, listing_id: Uuid) -> QueryResult<Vec<Booking>> {
    bookings::table
        .filter(bookings::listing_id.eq(listing_id))
        .order(bookings::booked_at.desc())
        .load::<Booking>(conn)
        .await
}

pub async fn reviews_by_user(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<Review>> {
    reviews::table
        .filter(reviews::user_id.eq(user_id))
        .order(reviews::reviewed_at.desc())
        .load::<Review>(conn)
        .await
}

pub async fn bookings_by_user(conn: &mut AsyncPgConnection, user_id: Uuid) -> QueryResult<Vec<Booking>> {
    bookings::table
        .filter(bookings::user_id.eq(user_id))
        .order(bookings::booked_at.desc())
        .load::<Booking>(conn)
        .await
}

/// A booking of `user_id`; other users' bookings are reported as missing.
pub async fn owned_booking(conn: &mut AsyncPgConnection, user_id: Uuid, booking_id: Uuid) -> ApiResult<Booking> {
    bookings::table
        .filter(bookings::id.eq(booking_id))
        .filter(bookings::user_id.eq(user_id))
        .first::<Booking>(conn)
        .await
        .optional()?
        .ok_or(ApiError::NotFound)
}

/// A payment on one of `user_id`'s bookings.
pub async fn owned_payment(conn: &mut AsyncPgConnection, user_id: Uuid, payment_id: Uuid) -> ApiResult<Payment> {
    payments::table
        .inner_join(bookings::table)
        .filter(payments::id.eq(payment_id))
        .filter(bookings::user_id.eq(user_id))
        .select(payments::all_columns)
        .first::<Payment>(conn)
        .await
        .optional()?
        .ok_or(ApiError::NotFound)
}
