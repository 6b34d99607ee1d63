//! Request identity.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! user's id in [`USER_HEADER`]. Handlers pick [`CurrentUser`] when a user is
//! required and [`MaybeUser`] for read-only-when-anonymous routes.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::models::User;
use shared::schema::users;
use uuid::Uuid;

use super::{ApiError, AppState};

pub const USER_HEADER: &str = "x-user-id";

pub struct MaybeUser(pub Option<User>);

pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else {
            return Ok(MaybeUser(None));
        };
        let user_id = value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .ok_or(ApiError::Unauthorized)?;

        let mut conn = state.conn().await?;
        let user = users::table
            .find(user_id)
            .first::<User>(&mut conn)
            .await
            .optional()?
            .ok_or(ApiError::Unauthorized)?;

        Ok(MaybeUser(Some(user)))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.map(CurrentUser).ok_or(ApiError::Unauthorized)
    }
}
