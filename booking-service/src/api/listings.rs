use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use num_traits::Zero;
use serde::Deserialize;
use shared::models::*;
use shared::schema::*;
use uuid::Uuid;
use validator::Validate;

use super::auth::CurrentUser;
use super::queries;
use super::responses::{booking_views, review_views, BookingView, ListingDetail, ReviewView};
use super::{ApiError, ApiResult, AppState, Ordering};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_listings).post(create_listing))
        .route(
            "/:id",
            get(get_listing)
                .put(replace_listing)
                .patch(update_listing)
                .delete(delete_listing),
        )
        .route("/:id/reviews", get(listing_reviews))
        .route("/:id/bookings", get(listing_bookings))
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    pub location: Option<String>,
    pub price_per_night: Option<BigDecimal>,
    pub search: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListingRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    #[validate(length(min = 1, max = 255))]
    pub location: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListingPatch {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_per_night: Option<BigDecimal>,
    #[validate(length(min = 1, max = 255))]
    pub location: Option<String>,
}

fn ensure_positive_price(price: &BigDecimal) -> ApiResult<()> {
    if *price <= BigDecimal::zero() {
        return Err(ApiError::invalid("price_per_night must be greater than zero"));
    }
    Ok(())
}

pub async fn list_listings(
    State(state): State<AppState>,
    Query(params): Query<ListingQuery>,
) -> ApiResult<Json<Vec<Listing>>> {
    let mut conn = state.conn().await?;
    let mut query = listings::table.into_boxed();

    if let Some(location) = params.location {
        query = query.filter(listings::location.eq(location));
    }
    if let Some(price) = params.price_per_night {
        query = query.filter(listings::price_per_night.eq(price));
    }
    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        let pattern = queries::contains_pattern(&search);
        query = query.filter(
            listings::title
                .ilike(pattern.clone())
                .or(listings::description.ilike(pattern.clone()))
                .or(listings::location.ilike(pattern)),
        );
    }

    let ordering = Ordering::parse(
        params.ordering.as_deref(),
        &["price_per_night", "created_at", "title"],
        "-created_at",
    );
    query = match (ordering.field, ordering.descending) {
        ("price_per_night", false) => query.order(listings::price_per_night.asc()),
        ("price_per_night", true) => query.order(listings::price_per_night.desc()),
        ("title", false) => query.order(listings::title.asc()),
        ("title", true) => query.order(listings::title.desc()),
        (_, false) => query.order(listings::created_at.asc()),
        (_, true) => query.order(listings::created_at.desc()),
    };

    let rows = query.load::<Listing>(&mut conn).await?;
    Ok(Json(rows))
}

pub async fn create_listing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ListingRequest>,
) -> ApiResult<(StatusCode, Json<Listing>)> {
    request.validate()?;
    ensure_positive_price(&request.price_per_night)?;

    let listing = Listing {
        id: Uuid::new_v4(),
        title: request.title,
        description: request.description,
        price_per_night: request.price_per_night,
        location: request.location,
        created_at: Utc::now(),
    };

    let mut conn = state.conn().await?;
    let listing = diesel::insert_into(listings::table)
        .values(&listing)
        .get_result::<Listing>(&mut conn)
        .await?;

    tracing::info!(listing_id = %listing.id, user_id = %user.id, "Listing created");
    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ListingDetail>> {
    let mut conn = state.conn().await?;
    let listing = queries::find_listing(&mut conn, id).await?;
    let reviews = queries::reviews_for_listing(&mut conn, id).await?;
    let bookings = queries::bookings_for_listing(&mut conn, id).await?;

    Ok(Json(ListingDetail {
        listing,
        reviews: review_views(&mut conn, reviews).await?,
        bookings: booking_views(&mut conn, bookings).await?,
    }))
}

async fn apply_changes(state: &AppState, id: Uuid, changes: ListingChanges) -> ApiResult<Json<Listing>> {
    let mut conn = state.conn().await?;

    let unchanged = changes.title.is_none()
        && changes.description.is_none()
        && changes.price_per_night.is_none()
        && changes.location.is_none();
    let listing = if unchanged {
        listings::table.find(id).first::<Listing>(&mut conn).await.optional()?
    } else {
        diesel::update(listings::table.find(id))
            .set(&changes)
            .get_result::<Listing>(&mut conn)
            .await
            .optional()?
    };

    listing.map(Json).ok_or(ApiError::NotFound)
}

pub async fn replace_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(_user): CurrentUser,
    Json(request): Json<ListingRequest>,
) -> ApiResult<Json<Listing>> {
    request.validate()?;
    ensure_positive_price(&request.price_per_night)?;

    let changes = ListingChanges {
        title: Some(request.title),
        description: Some(request.description),
        price_per_night: Some(request.price_per_night),
        location: Some(request.location),
    };
    apply_changes(&state, id, changes).await
}

pub async fn update_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(_user): CurrentUser,
    Json(patch): Json<ListingPatch>,
) -> ApiResult<Json<Listing>> {
    patch.validate()?;
    if let Some(price) = &patch.price_per_night {
        ensure_positive_price(price)?;
    }

    let changes = ListingChanges {
        title: patch.title,
        description: patch.description,
        price_per_night: patch.price_per_night,
        location: patch.location,
    };
    apply_changes(&state, id, changes).await
}

pub async fn delete_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    CurrentUser(_user): CurrentUser,
) -> ApiResult<StatusCode> {
    let mut conn = state.conn().await?;
    let deleted = diesel::delete(listings::table.find(id)).execute(&mut conn).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn listing_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReviewView>>> {
    let mut conn = state.conn().await?;
    queries::ensure_listing_exists(&mut conn, id).await?;
    let reviews = queries::reviews_for_listing(&mut conn, id).await?;
    Ok(Json(review_views(&mut conn, reviews).await?))
}

pub async fn listing_bookings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BookingView>>> {
    let mut conn = state.conn().await?;
    queries::ensure_listing_exists(&mut conn, id).await?;
    let bookings = queries::bookings_for_listing(&mut conn, id).await?;
    Ok(Json(booking_views(&mut conn, bookings).await?))
}
