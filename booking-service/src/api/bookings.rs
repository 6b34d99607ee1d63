use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Deserialize;
use shared::models::*;
use shared::payments::payment_for_booking;
use shared::schema::*;
use shared::{booking_total, BookingStatus, PaymentStatus, Task};
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::queries;
use super::responses::{booking_view, booking_views, payment_view, BookingView, PaymentView};
use super::{ApiError, ApiResult, AppState, Ordering};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(create_booking))
        .route("/my_bookings", get(my_bookings))
        .route(
            "/:id",
            get(get_booking)
                .put(replace_booking)
                .patch(update_booking)
                .delete(delete_booking),
        )
        .route("/:id/listing_details", get(listing_details))
        .route("/:id/payment_details", get(payment_details))
}

#[derive(Debug, Deserialize)]
pub struct BookingQuery {
    pub listing: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub listing: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BookingPatch {
    pub listing: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn ensure_valid_stay(start_date: NaiveDate, end_date: NaiveDate) -> ApiResult<()> {
    if end_date <= start_date {
        return Err(ApiError::invalid("end_date must be after start_date"));
    }
    Ok(())
}

pub async fn list_bookings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<BookingQuery>,
) -> ApiResult<Json<Vec<BookingView>>> {
    let mut conn = state.conn().await?;
    let mut query = bookings::table
        .filter(bookings::user_id.eq(user.id))
        .into_boxed();

    if let Some(listing_id) = params.listing {
        query = query.filter(bookings::listing_id.eq(listing_id));
    }
    if let Some(start_date) = params.start_date {
        query = query.filter(bookings::start_date.eq(start_date));
    }
    if let Some(end_date) = params.end_date {
        query = query.filter(bookings::end_date.eq(end_date));
    }

    let ordering = Ordering::parse(
        params.ordering.as_deref(),
        &["start_date", "end_date", "booked_at"],
        "-booked_at",
    );
    query = match (ordering.field, ordering.descending) {
        ("start_date", false) => query.order(bookings::start_date.asc()),
        ("start_date", true) => query.order(bookings::start_date.desc()),
        ("end_date", false) => query.order(bookings::end_date.asc()),
        ("end_date", true) => query.order(bookings::end_date.desc()),
        (_, false) => query.order(bookings::booked_at.asc()),
        (_, true) => query.order(bookings::booked_at.desc()),
    };

    let rows = query.load::<Booking>(&mut conn).await?;
    Ok(Json(booking_views(&mut conn, rows).await?))
}

pub async fn my_bookings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<BookingView>>> {
    let mut conn = state.conn().await?;
    let rows = queries::bookings_by_user(&mut conn, user.id).await?;
    Ok(Json(booking_views(&mut conn, rows).await?))
}

/// Creates the booking and its pending payment atomically, then queues the confirmation email.
pub async fn create_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<BookingRequest>,
) -> ApiResult<(StatusCode, Json<BookingView>)> {
    ensure_valid_stay(request.start_date, request.end_date)?;

    let mut conn = state.conn().await?;
    let listing = match queries::find_listing(&mut conn, request.listing).await {
        Err(ApiError::NotFound) => return Err(ApiError::invalid("listing does not exist")),
        other => other?,
    };

    let booking = Booking::new(listing.id, user.id, request.start_date, request.end_date);
    let payment = payment_for_booking(&booking, &listing, &user)?;

    let (booking, payment) = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        Box::pin(async move {
            let booking = diesel::insert_into(bookings::table)
                .values(&booking)
                .get_result::<Booking>(conn)
                .await?;

            let payment = diesel::insert_into(payments::table)
                .values(&payment)
                .get_result::<Payment>(conn)
                .await?;

            Ok((booking, payment))
        })
    }).await?;

    info!(booking_id = %booking.id, payment_id = %payment.id, amount = %payment.amount, "Booking created");

    if let Err(e) = state
        .queue
        .enqueue(Task::SendBookingConfirmationEmail { booking_id: booking.id })
        .await
    {
        warn!(booking_id = %booking.id, "Failed to enqueue booking confirmation: {}", e);
    }

    Ok((StatusCode::CREATED, Json(booking_view(&mut conn, booking).await?)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BookingView>> {
    let mut conn = state.conn().await?;
    let booking = queries::owned_booking(&mut conn, user.id, id).await?;
    Ok(Json(booking_view(&mut conn, booking).await?))
}

async fn apply_changes(
    state: &AppState,
    user: &User,
    id: Uuid,
    patch: BookingPatch,
) -> ApiResult<Json<BookingView>> {
    let mut conn = state.conn().await?;
    let current = queries::owned_booking(&mut conn, user.id, id).await?;
    if current.status != BookingStatus::Pending.as_str() {
        return Err(ApiError::invalid("only pending bookings can be changed"));
    }

    let start_date = patch.start_date.unwrap_or(current.start_date);
    let end_date = patch.end_date.unwrap_or(current.end_date);
    ensure_valid_stay(start_date, end_date)?;

    let listing_id = patch.listing.unwrap_or(current.listing_id);
    let listing = match queries::find_listing(&mut conn, listing_id).await {
        Err(ApiError::NotFound) => return Err(ApiError::invalid("listing does not exist")),
        other => other?,
    };
    let total = booking_total(&listing.price_per_night, start_date, end_date)
        .ok_or_else(|| ApiError::invalid("end_date must be after start_date"))?;

    let changes = BookingChanges {
        listing_id: Some(listing_id),
        start_date: Some(start_date),
        end_date: Some(end_date),
    };

    // Unpaid payments follow the new stay; anything already sent to Chapa keeps its amount.
    let booking = conn.transaction::<_, diesel::result::Error, _>(|conn| {
        Box::pin(async move {
            let booking = diesel::update(bookings::table.find(id))
                .set(&changes)
                .get_result::<Booking>(conn)
                .await?;

            diesel::update(
                payments::table
                    .filter(payments::booking_id.eq(id))
                    .filter(payments::status.eq(PaymentStatus::Pending.as_str())),
            )
            .set(payments::amount.eq(total))
            .execute(conn)
            .await?;

            Ok(booking)
        })
    }).await?;

    Ok(Json(booking_view(&mut conn, booking).await?))
}

pub async fn replace_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<BookingRequest>,
) -> ApiResult<Json<BookingView>> {
    let patch = BookingPatch {
        listing: Some(request.listing),
        start_date: Some(request.start_date),
        end_date: Some(request.end_date),
    };
    apply_changes(&state, &user, id, patch).await
}

pub async fn update_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<BookingPatch>,
) -> ApiResult<Json<BookingView>> {
    apply_changes(&state, &user, id, patch).await
}

pub async fn delete_booking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.conn().await?;
    let booking = queries::owned_booking(&mut conn, user.id, id).await?;
    diesel::delete(bookings::table.find(booking.id))
        .execute(&mut conn)
        .await?;
    info!(booking_id = %booking.id, "Booking deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn listing_details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Listing>> {
    let mut conn = state.conn().await?;
    let booking = queries::owned_booking(&mut conn, user.id, id).await?;
    Ok(Json(queries::find_listing(&mut conn, booking.listing_id).await?))
}

/// The most recent payment for the booking.
pub async fn payment_details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentView>> {
    let mut conn = state.conn().await?;
    let booking = queries::owned_booking(&mut conn, user.id, id).await?;
    let payment = payments::table
        .filter(payments::booking_id.eq(booking.id))
        .order(payments::created_at.desc())
        .first::<Payment>(&mut conn)
        .await
        .optional()?
        .ok_or(ApiError::Missing("No payment found for this booking"))?;
    Ok(Json(payment_view(&mut conn, payment).await?))
}
