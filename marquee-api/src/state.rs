use std::sync::Arc;

use marquee_core::repository::{BookingRepository, ShowtimeRepository};

#[derive(Clone)]
pub struct AppState {
    pub showtimes: Arc<dyn ShowtimeRepository>,
    pub bookings: Arc<dyn BookingRepository>,
}
