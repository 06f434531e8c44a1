use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use marquee_core::model::BookingDetail;
use marquee_core::repository::{CreateBookingRequest, PaymentConfirmation};

use crate::error::AppError;
use crate::middleware::identity::{self, UserId};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateBookingBody {
    showtime_id: Uuid,
    seat_ids: Vec<Uuid>,
    idempotency_key: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/refund", post(refund_booking))
        .route_layer(axum::middleware::from_fn(identity::require_user))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<BookingDetail>), AppError> {
    let req = CreateBookingRequest {
        user_id,
        showtime_id: body.showtime_id,
        seat_ids: body.seat_ids,
        idempotency_key: body.idempotency_key,
    };
    let detail = state.bookings.create(&req).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Result<Json<Vec<BookingDetail>>, AppError> {
    let bookings = state.bookings.list_for_user(&user_id).await?;
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let detail = state
        .bookings
        .get(id, &user_id)
        .await?
        .ok_or_else(|| marquee_core::CoreError::not_found("booking", id))?;
    Ok(Json(detail))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
    payment: Option<Json<PaymentConfirmation>>,
) -> Result<Json<BookingDetail>, AppError> {
    let payment = payment.map(|Json(p)| p).unwrap_or_default();
    let detail = state.bookings.confirm(id, &user_id, &payment).await?;
    Ok(Json(detail))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let detail = state.bookings.cancel(id, &user_id).await?;
    Ok(Json(detail))
}

async fn refund_booking(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingDetail>, AppError> {
    let detail = state.bookings.refund(id, &user_id).await?;
    Ok(Json(detail))
}
