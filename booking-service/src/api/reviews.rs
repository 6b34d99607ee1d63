use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use shared::models::*;
use shared::schema::*;
use uuid::Uuid;
use validator::Validate;

use super::auth::{CurrentUser, MaybeUser};
use super::queries;
use super::responses::{review_view, review_views, ReviewView};
use super::{ApiError, ApiResult, AppState, Ordering};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/my_reviews", get(my_reviews))
        .route(
            "/:id",
            get(get_review)
                .put(replace_review)
                .patch(update_review)
                .delete(delete_review),
        )
        .route("/:id/listing_details", get(listing_details))
}

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    pub listing: Option<Uuid>,
    pub rating: Option<i32>,
    pub user: Option<Uuid>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    pub listing: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewPatch {
    pub listing: Option<Uuid>,
    #[validate(range(min = 1, max = 5))]
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<ReviewQuery>,
) -> ApiResult<Json<Vec<ReviewView>>> {
    let mut conn = state.conn().await?;
    let mut query = reviews::table.into_boxed();

    if let Some(listing_id) = params.listing {
        query = query.filter(reviews::listing_id.eq(listing_id));
    }
    if let Some(rating) = params.rating {
        query = query.filter(reviews::rating.eq(rating));
    }
    if let Some(user_id) = params.user {
        query = query.filter(reviews::user_id.eq(user_id));
    }

    let ordering = Ordering::parse(params.ordering.as_deref(), &["rating", "reviewed_at"], "-reviewed_at");
    query = match (ordering.field, ordering.descending) {
        ("rating", false) => query.order(reviews::rating.asc()),
        ("rating", true) => query.order(reviews::rating.desc()),
        (_, false) => query.order(reviews::reviewed_at.asc()),
        (_, true) => query.order(reviews::reviewed_at.desc()),
    };

    let rows = query.load::<Review>(&mut conn).await?;
    Ok(Json(review_views(&mut conn, rows).await?))
}

pub async fn my_reviews(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> ApiResult<Json<Vec<ReviewView>>> {
    let user = user.ok_or(ApiError::Unauthorized)?;
    let mut conn = state.conn().await?;
    let rows = queries::reviews_by_user(&mut conn, user.id).await?;
    Ok(Json(review_views(&mut conn, rows).await?))
}

pub async fn create_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<(StatusCode, Json<ReviewView>)> {
    request.validate()?;

    let mut conn = state.conn().await?;
    queries::ensure_listing_referenced(&mut conn, request.listing).await?;

    let review = Review {
        id: Uuid::new_v4(),
        listing_id: request.listing,
        user_id: user.id,
        rating: request.rating,
        comment: request.comment,
        reviewed_at: Utc::now(),
    };
    let review = diesel::insert_into(reviews::table)
        .values(&review)
        .get_result::<Review>(&mut conn)
        .await?;

    tracing::info!(review_id = %review.id, listing_id = %review.listing_id, "Review created");
    Ok((StatusCode::CREATED, Json(review_view(&mut conn, review).await?)))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ReviewView>> {
    let mut conn = state.conn().await?;
    let review = find_review(&mut conn, id).await?;
    Ok(Json(review_view(&mut conn, review).await?))
}

async fn find_review(conn: &mut diesel_async::AsyncPgConnection, id: Uuid) -> ApiResult<Review> {
    reviews::table
        .find(id)
        .first::<Review>(conn)
        .await
        .optional()?
        .ok_or(ApiError::NotFound)
}

/// Only the author may change or remove a review.
fn ensure_author(review: &Review, user: &User) -> ApiResult<()> {
    if review.user_id != user.id {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

async fn apply_changes(state: &AppState, user: &User, id: Uuid, changes: ReviewChanges) -> ApiResult<Json<ReviewView>> {
    let mut conn = state.conn().await?;
    let review = find_review(&mut conn, id).await?;
    ensure_author(&review, user)?;

    if let Some(listing_id) = changes.listing_id {
        queries::ensure_listing_referenced(&mut conn, listing_id).await?;
    }

    let unchanged = changes.listing_id.is_none() && changes.rating.is_none() && changes.comment.is_none();
    let review = if unchanged {
        review
    } else {
        diesel::update(reviews::table.find(id))
            .set(&changes)
            .get_result::<Review>(&mut conn)
            .await?
    };

    Ok(Json(review_view(&mut conn, review).await?))
}

pub async fn replace_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ReviewView>> {
    request.validate()?;
    let changes = ReviewChanges {
        listing_id: Some(request.listing),
        rating: Some(request.rating),
        comment: Some(request.comment),
    };
    apply_changes(&state, &user, id, changes).await
}

pub async fn update_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<ReviewPatch>,
) -> ApiResult<Json<ReviewView>> {
    patch.validate()?;
    let changes = ReviewChanges {
        listing_id: patch.listing,
        rating: patch.rating,
        comment: patch.comment,
    };
    apply_changes(&state, &user, id, changes).await
}

pub async fn delete_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.conn().await?;
    let review = find_review(&mut conn, id).await?;
    ensure_author(&review, &user)?;
    diesel::delete(reviews::table.find(id)).execute(&mut conn).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn listing_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Listing>> {
    let mut conn = state.conn().await?;
    let review = find_review(&mut conn, id).await?;
    Ok(Json(queries::find_listing(&mut conn, review.listing_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Uuid) -> User {
        User {
            id,
            username: "abebe".to_string(),
            email: "abebe@example.com".to_string(),
            first_name: "Abebe".to_string(),
            last_name: "Bikila".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        for (rating, valid) in [(0, false), (1, true), (5, true), (6, false)] {
            let request = ReviewRequest { listing: Uuid::new_v4(), rating, comment: String::new() };
            assert_eq!(request.validate().is_ok(), valid, "rating {rating}");
        }

        let patch = ReviewPatch { listing: None, rating: Some(9), comment: None };
        assert!(patch.validate().is_err());
        let patch = ReviewPatch { listing: None, rating: None, comment: Some("Lovely".to_string()) };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn only_the_author_may_modify() {
        let author = user(Uuid::new_v4());
        let review = Review {
            id: Uuid::new_v4(),
            listing_id: Uuid::new_v4(),
            user_id: author.id,
            rating: 4,
            comment: "Great stay".to_string(),
            reviewed_at: Utc::now(),
        };

        assert!(ensure_author(&review, &author).is_ok());
        assert!(matches!(ensure_author(&review, &user(Uuid::new_v4())), Err(ApiError::Forbidden)));
    }
}
