use std::collections::HashMap;

use marquee_core::{BookingStatus, Seat, SeatStatus, SeatWithStatus};
use uuid::Uuid;

/// An active claim on a seat: the parent booking is PENDING (not yet
/// released by the sweep) or CONFIRMED.
#[derive(Debug, Clone)]
pub struct ActiveClaim {
    pub seat_id: Uuid,
    pub booking_status: BookingStatus,
}

/// Assembles the buyer-facing seat map for one showtime. Inactive seats are
/// reported unavailable no matter what tickets reference them. This is a
/// read-only snapshot; the claim path re-checks under its own transaction.
pub fn snapshot(seats: &[Seat], claims: &[ActiveClaim]) -> Vec<SeatWithStatus> {
    let claimed: HashMap<Uuid, BookingStatus> = claims
        .iter()
        .map(|c| (c.seat_id, c.booking_status))
        .collect();

    seats
        .iter()
        .map(|seat| {
            let status = if !seat.is_active {
                SeatStatus::Unavailable
            } else {
                match claimed.get(&seat.id) {
                    Some(BookingStatus::Confirmed) => SeatStatus::Sold,
                    Some(_) => SeatStatus::Held,
                    None => SeatStatus::Available,
                }
            };
            SeatWithStatus {
                id: seat.id,
                room_id: seat.room_id,
                row: seat.row.clone(),
                number: seat.number,
                seat_type: seat.seat_type,
                is_active: seat.is_active,
                status,
            }
        })
        .collect()
}
