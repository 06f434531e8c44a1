use crate::model::BookingStatus;
use uuid::Uuid;

/// Domain error taxonomy. Every variant carries the offending identifiers so
/// the API layer can return them with a stable code.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("showtime overlaps with showtime {conflicting_showtime_id} in the same room")]
    ScheduleConflict { conflicting_showtime_id: Uuid },

    #[error("seats already taken: {seat_ids:?}")]
    SeatUnavailable { seat_ids: Vec<Uuid> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("ticket {ticket_id} already used")]
    TicketAlreadyUsed { ticket_id: Uuid },

    #[error("ticket {ticket_id} is outside its check-in window")]
    CheckinWindowClosed { ticket_id: Uuid },

    #[error("booking {booking_id} hold has expired")]
    Expired { booking_id: Uuid },

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
