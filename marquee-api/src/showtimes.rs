use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use marquee_core::model::{SeatWithStatus, Showtime};
use marquee_core::repository::{RescheduleRequest, ScheduleRequest};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes", post(create_showtime))
        .route(
            "/v1/showtimes/{id}",
            axum::routing::put(update_showtime).delete(delete_showtime),
        )
        .route("/v1/showtimes/{id}/seats", get(showtime_seats))
        .route("/v1/rooms/{id}/showtimes", get(room_showtimes))
}

async fn create_showtime(
    State(state): State<AppState>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<Showtime>), AppError> {
    let showtime = state.showtimes.schedule(&req).await?;
    Ok((StatusCode::CREATED, Json(showtime)))
}

async fn update_showtime(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RescheduleRequest>,
) -> Result<Json<Showtime>, AppError> {
    let showtime = state.showtimes.reschedule(id, &req).await?;
    Ok(Json(showtime))
}

async fn delete_showtime(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.showtimes.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn showtime_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SeatWithStatus>>, AppError> {
    let seats = state.showtimes.seat_statuses(id).await?;
    Ok(Json(seats))
}

async fn room_showtimes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Showtime>>, AppError> {
    let showtimes = state.showtimes.list_by_room(id).await?;
    Ok(Json(showtimes))
}
