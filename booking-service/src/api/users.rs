use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use shared::models::*;
use shared::schema::*;
use uuid::Uuid;

use super::auth::CurrentUser;
use super::queries;
use super::responses::{booking_views, review_views, BookingView, ReviewView, UserView};
use super::{ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", get(get_user))
        .route("/:id/bookings", get(user_bookings))
        .route("/:id/reviews", get(user_reviews))
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(params): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserView>>> {
    let mut conn = state.conn().await?;
    let mut query = users::table.order(users::username.asc()).into_boxed();

    if let Some(search) = params.search.filter(|s| !s.trim().is_empty()) {
        let pattern = queries::contains_pattern(&search);
        query = query.filter(
            users::username
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern.clone()))
                .or(users::first_name.ilike(pattern.clone()))
                .or(users::last_name.ilike(pattern)),
        );
    }

    let rows = query.load::<User>(&mut conn).await?;
    Ok(Json(rows.into_iter().map(UserView::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserView>> {
    let mut conn = state.conn().await?;
    Ok(Json(queries::find_user(&mut conn, id).await?.into()))
}

pub async fn user_bookings(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<BookingView>>> {
    let mut conn = state.conn().await?;
    let user = queries::find_user(&mut conn, id).await?;
    let rows = queries::bookings_by_user(&mut conn, user.id).await?;
    Ok(Json(booking_views(&mut conn, rows).await?))
}

pub async fn user_reviews(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReviewView>>> {
    let mut conn = state.conn().await?;
    let user = queries::find_user(&mut conn, id).await?;
    let rows = queries::reviews_by_user(&mut conn, user.id).await?;
    Ok(Json(review_views(&mut conn, rows).await?))
}
