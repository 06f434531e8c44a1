use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use marquee_core::repository::BookingRepository;

/// Background reaper for lapsed PENDING holds. Runs forever; each tick
/// cancels every booking past its expiry and releases its seats.
pub async fn run(bookings: Arc<dyn BookingRepository>, interval_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(interval_seconds));
    info!("Expiry sweep started (every {}s)", interval_seconds);

    loop {
        ticker.tick().await;
        match bookings.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(reaped) => info!("Expiry sweep released {} lapsed booking(s)", reaped),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
    }
}
