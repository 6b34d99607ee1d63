mod auth;
mod bookings;
mod error;
mod listings;
mod payments;
mod queries;
mod responses;
mod reviews;
mod users;

use axum::{routing::get, Router};
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::AsyncPgConnection;
use shared::db::DbPool;
use shared::payments::PaymentService;
use shared::queue::TaskQueue;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub queue: Arc<dyn TaskQueue>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    pub async fn conn(&self) -> ApiResult<PooledConnection<'_, AsyncPgConnection>> {
        Ok(self.pool.get().await?)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/listings", listings::routes())
        .nest("/api/bookings", bookings::routes())
        .nest("/api/reviews", reviews::routes())
        .nest("/api/users", users::routes())
        .nest("/api/payments", payments::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// A `?ordering=-field` query parameter resolved against the sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering<'a> {
    pub field: &'a str,
    pub descending: bool,
}

impl<'a> Ordering<'a> {
    /// Unknown fields fall back to `default`.
    pub fn parse(param: Option<&'a str>, allowed: &[&str], default: &'a str) -> Self {
        let parse_one = |raw: &'a str| {
            let descending = raw.starts_with('-');
            Ordering { field: raw.trim_start_matches('-'), descending }
        };
        param
            .map(str::trim)
            .map(parse_one)
            .filter(|ordering| allowed.contains(&ordering.field))
            .unwrap_or_else(|| parse_one(default))
    }
}
