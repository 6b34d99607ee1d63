use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::PoolError;
use serde_json::json;
use shared::payments::PaymentError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found.")]
    NotFound,

    #[error("{0}")]
    Missing(&'static str),

    #[error("Authentication credentials were not provided.")]
    Unauthorized,

    #[error("You do not have permission to perform this action.")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}

impl From<bb8::RunError<PoolError>> for ApiError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        ApiError::Internal(anyhow::anyhow!("Connection pool error: {}", err))
    }
}

impl ApiError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    fn payment_response(err: &PaymentError) -> (StatusCode, &'static str) {
        match err {
            PaymentError::NotFound(_) => (StatusCode::NOT_FOUND, "Payment not found"),
            PaymentError::NoTransactionReference => (StatusCode::BAD_REQUEST, "Payment verification failed"),
            PaymentError::AlreadyFinal(_) => (StatusCode::BAD_REQUEST, "Payment can no longer be initiated"),
            PaymentError::MissingCustomerEmail | PaymentError::InvalidStay => {
                (StatusCode::BAD_REQUEST, "Payment data is incomplete")
            }
            PaymentError::Gateway(_) => (StatusCode::BAD_REQUEST, "Payment gateway request failed"),
            PaymentError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "An unexpected error occurred"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::NotFound | ApiError::Missing(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Payment(err) => {
                let (status, message) = Self::payment_response(err);
                if status.is_server_error() {
                    error!("Payment error: {}", err);
                }
                let body = Json(json!({
                    "success": false,
                    "error": err.to_string(),
                    "message": message,
                }));
                return (status, body).into_response();
            }
            ApiError::Database(DieselError::NotFound) => (StatusCode::NOT_FOUND, "Not found.".to_string()),
            ApiError::Database(DieselError::DatabaseError(kind, info)) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation => (StatusCode::BAD_REQUEST, info.message().to_string()),
                _ => {
                    error!("Database error: {}", info.message());
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
            ApiError::Database(err) => {
                error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
