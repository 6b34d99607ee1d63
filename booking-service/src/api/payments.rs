use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::models::*;
use shared::payments::InitiateOptions;
use shared::schema::*;
use shared::{PaymentMethod, PaymentStatus, Task, DEFAULT_CURRENCY};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::auth::CurrentUser;
use super::queries;
use super::responses::{payment_view, payment_views, PaymentView};
use super::{ApiError, ApiResult, AppState, Ordering};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payments).post(create_payment))
        .route("/my_payments", get(my_payments))
        .route("/:id", get(get_payment).delete(delete_payment))
        .route("/:id/payment_status", get(payment_status))
        .route("/:id/initiate_payment", post(initiate_payment))
        .route("/:id/verify_payment", post(verify_payment))
        .route("/:id/verify", get(chapa_callback))
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub booking: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub ordering: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    pub booking: Uuid,
    pub amount: BigDecimal,
    #[validate(length(equal = 3))]
    pub currency: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct InitiateRequest {
    pub payment_method: Option<PaymentMethod>,
    #[validate(length(max = 20))]
    pub customer_phone: Option<String>,
}

impl From<InitiateRequest> for InitiateOptions {
    fn from(request: InitiateRequest) -> Self {
        Self {
            payment_method: request.payment_method,
            customer_phone: request.customer_phone,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusView {
    pub payment_id: Uuid,
    pub reference: String,
    pub status: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentStatusView {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.id,
            reference: payment.reference,
            status: payment.status,
            amount: payment.amount,
            currency: payment.currency,
            updated_at: payment.updated_at,
        }
    }
}

pub async fn list_payments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<PaymentQuery>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    let mut conn = state.conn().await?;
    let mut query = payments::table
        .inner_join(bookings::table)
        .filter(bookings::user_id.eq(user.id))
        .select(payments::all_columns)
        .into_boxed();

    if let Some(booking_id) = params.booking {
        query = query.filter(payments::booking_id.eq(booking_id));
    }
    if let Some(status) = params.status {
        query = query.filter(payments::status.eq(status.as_str()));
    }
    if let Some(method) = params.payment_method {
        query = query.filter(payments::payment_method.eq(method.as_str()));
    }

    let ordering = Ordering::parse(params.ordering.as_deref(), &["created_at", "amount"], "-created_at");
    query = match (ordering.field, ordering.descending) {
        ("amount", false) => query.order(payments::amount.asc()),
        ("amount", true) => query.order(payments::amount.desc()),
        (_, false) => query.order(payments::created_at.asc()),
        (_, true) => query.order(payments::created_at.desc()),
    };

    let rows = query.load::<Payment>(&mut conn).await?;
    Ok(Json(payment_views(&mut conn, rows).await?))
}

pub async fn my_payments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<PaymentView>>> {
    let mut conn = state.conn().await?;
    let rows = payments::table
        .inner_join(bookings::table)
        .filter(bookings::user_id.eq(user.id))
        .select(payments::all_columns)
        .order(payments::created_at.desc())
        .load::<Payment>(&mut conn)
        .await?;
    Ok(Json(payment_views(&mut conn, rows).await?))
}

/// Records a payment against one of the user's bookings and opens a Chapa checkout for it.
pub async fn create_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentView>)> {
    request.validate()?;
    if request.amount <= BigDecimal::zero() {
        return Err(ApiError::invalid("amount must be greater than zero"));
    }

    // The gateway call takes its own connections; none may be held across it.
    let payment = {
        let mut conn = state.conn().await?;
        let booking = match queries::owned_booking(&mut conn, user.id, request.booking).await {
            Err(ApiError::NotFound) => return Err(ApiError::invalid("booking does not exist")),
            other => other?,
        };

        let currency = request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY).to_uppercase();
        let mut payment = Payment::pending(booking.id, request.amount, &currency);
        payment.payment_method = request.payment_method.map(|method| method.as_str().to_string());
        payment.customer_email = Some(user.email.clone()).filter(|email| !email.is_empty());
        payment.customer_name = Some(user.display_name());

        diesel::insert_into(payments::table)
            .values(&payment)
            .get_result::<Payment>(&mut conn)
            .await?
    };
    info!(payment_id = %payment.id, booking_id = %payment.booking_id, "Payment created");

    state.payments.initiate_payment(payment.id, InitiateOptions::default()).await?;

    let mut conn = state.conn().await?;
    let payment = queries::owned_payment(&mut conn, user.id, payment.id).await?;
    Ok((StatusCode::CREATED, Json(payment_view(&mut conn, payment).await?)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentView>> {
    let mut conn = state.conn().await?;
    let payment = queries::owned_payment(&mut conn, user.id, id).await?;
    Ok(Json(payment_view(&mut conn, payment).await?))
}

pub async fn delete_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut conn = state.conn().await?;
    let payment = queries::owned_payment(&mut conn, user.id, id).await?;
    diesel::delete(payments::table.find(payment.id)).execute(&mut conn).await?;
    info!(payment_id = %payment.id, "Payment deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn payment_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PaymentStatusView>> {
    let mut conn = state.conn().await?;
    let payment = queries::owned_payment(&mut conn, user.id, id).await?;
    Ok(Json(payment.into()))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<InitiateRequest>>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    request.validate()?;

    {
        let mut conn = state.conn().await?;
        queries::owned_payment(&mut conn, user.id, id).await?;
    }

    let initiated = state.payments.initiate_payment(id, request.into()).await?;
    Ok(Json(json!({
        "success": true,
        "checkout_url": initiated.checkout_url,
        "payment_id": initiated.payment_id,
        "reference": initiated.reference,
        "message": "Payment initiated successfully. Please complete payment using the checkout URL.",
    })))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    {
        let mut conn = state.conn().await?;
        queries::owned_payment(&mut conn, user.id, id).await?;
    }

    let verified = state.payments.verify_payment_status(id).await?;
    Ok(Json(json!({
        "success": true,
        "status": verified.status,
        "amount": verified.amount,
        "currency": verified.currency,
        "message": format!("Payment status: {}", verified.status),
    })))
}

/// Chapa's callback. The verification itself runs on the task worker.
pub async fn chapa_callback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut conn = state.conn().await?;
    let exists = diesel::select(diesel::dsl::exists(payments::table.find(id)))
        .get_result::<bool>(&mut conn)
        .await?;
    if !exists {
        return Err(ApiError::NotFound);
    }

    let message = state.queue.enqueue(Task::UpdatePaymentStatus { payment_id: id }).await?;
    info!(payment_id = %id, task_id = %message.id, "Payment verification queued");

    Ok((StatusCode::ACCEPTED, Json(json!({ "payment_id": id, "task_id": message.id }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_request_limits_phone_length() {
        let request: InitiateRequest =
            serde_json::from_str(r#"{"payment_method": "mobile_money", "customer_phone": "0911223344"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.payment_method, Some(PaymentMethod::MobileMoney));

        let request = InitiateRequest {
            payment_method: None,
            customer_phone: Some("0".repeat(21)),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn unknown_payment_methods_are_rejected() {
        let parsed = serde_json::from_str::<InitiateRequest>(r#"{"payment_method": "cash"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn payment_request_currency_is_three_letters() {
        let request: PaymentRequest = serde_json::from_str(&format!(
            r#"{{"booking": "{}", "amount": "150.00", "currency": "ETBX"}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        assert!(request.validate().is_err());

        let request: PaymentRequest =
            serde_json::from_str(&format!(r#"{{"booking": "{}", "amount": "150.00"}}"#, Uuid::new_v4())).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.amount, "150".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn status_view_carries_the_payment_state() {
        let mut payment = Payment::pending(Uuid::new_v4(), "300".parse().unwrap(), "ETB");
        payment.set_status(PaymentStatus::Processing);
        let view = PaymentStatusView::from(payment.clone());
        assert_eq!(view.payment_id, payment.id);
        assert_eq!(view.status, "processing");
        assert_eq!(view.reference, payment.reference);
    }
}
