use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use marquee_core::CoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Core(CoreError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Core(err) => match err {
                CoreError::ScheduleConflict {
                    conflicting_showtime_id,
                } => (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "code": "schedule_conflict",
                        "error": err.to_string(),
                        "conflicting_showtime_id": conflicting_showtime_id,
                    }),
                ),
                CoreError::SeatUnavailable { ref seat_ids } => (
                    StatusCode::CONFLICT,
                    json!({
                        "code": "seat_unavailable",
                        "error": err.to_string(),
                        "seat_ids": seat_ids,
                    }),
                ),
                CoreError::NotFound { entity, ref id } => (
                    StatusCode::NOT_FOUND,
                    json!({
                        "code": "not_found",
                        "error": err.to_string(),
                        "entity": entity,
                        "id": id,
                    }),
                ),
                CoreError::InvalidTransition { from, to } => (
                    StatusCode::CONFLICT,
                    json!({
                        "code": "invalid_transition",
                        "error": err.to_string(),
                        "from": from,
                        "to": to,
                    }),
                ),
                CoreError::TicketAlreadyUsed { ticket_id } => (
                    StatusCode::CONFLICT,
                    json!({
                        "code": "ticket_already_used",
                        "error": err.to_string(),
                        "ticket_id": ticket_id,
                    }),
                ),
                CoreError::CheckinWindowClosed { ticket_id } => (
                    StatusCode::CONFLICT,
                    json!({
                        "code": "checkin_window_closed",
                        "error": err.to_string(),
                        "ticket_id": ticket_id,
                    }),
                ),
                CoreError::Expired { booking_id } => (
                    StatusCode::GONE,
                    json!({
                        "code": "booking_expired",
                        "error": err.to_string(),
                        "booking_id": booking_id,
                    }),
                ),
                CoreError::Validation(msg) => (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "code": "validation_error",
                        "error": msg,
                    }),
                ),
                CoreError::Storage(msg) => {
                    tracing::error!("Internal Server Error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({
                            "code": "internal_error",
                            "error": "Internal Server Error",
                        }),
                    )
                }
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "code": "internal_error",
                        "error": "Internal Server Error",
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
