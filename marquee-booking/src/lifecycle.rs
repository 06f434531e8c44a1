use chrono::{DateTime, Duration, Utc};
use marquee_core::{BookingStatus, CoreError};
use uuid::Uuid;

/// How long before the showtime starts the doors open for check-in.
pub const CHECKIN_LEAD_MINUTES: i64 = 15;

/// Validates a booking transition. The storage layer runs the matching
/// conditional UPDATE; this keeps the state machine in one place so the
/// handlers and the sweep agree on what is legal.
pub fn validate_transition(
    booking_id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    let allowed = matches!(
        (from, to),
        (BookingStatus::Pending, BookingStatus::Confirmed)
            | (BookingStatus::Pending, BookingStatus::Cancelled)
            | (BookingStatus::Confirmed, BookingStatus::Refunded)
    );

    if !allowed {
        return Err(CoreError::InvalidTransition { from, to });
    }

    // A lapsed hold can still be cancelled (that is what the sweep does),
    // but it can no longer be confirmed.
    if to == BookingStatus::Confirmed && expires_at <= now {
        return Err(CoreError::Expired { booking_id });
    }

    Ok(())
}

/// Check-in opens 15 minutes before the screening and closes when it ends.
pub fn within_checkin_window(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let opens = start_time - Duration::minutes(CHECKIN_LEAD_MINUTES);
    now >= opens && now <= end_time
}

/// Ticket reference encoded into the QR code handed out on confirmation.
pub fn ticket_reference(booking_id: Uuid, seat_id: Uuid) -> String {
    format!("TICKET-{}-{}", booking_id, seat_id)
}
