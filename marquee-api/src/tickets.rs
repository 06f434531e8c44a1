use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::identity;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{id}/checkin", post(check_in_ticket))
        .route_layer(axum::middleware::from_fn(identity::require_user))
}

async fn check_in_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.bookings.check_in(id).await?;
    Ok(Json(json!({
        "ticket_id": id,
        "used": true,
    })))
}
