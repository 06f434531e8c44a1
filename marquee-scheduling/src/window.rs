use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Mandatory changeover gap around every screening (cleaning, seating).
pub const CHANGEOVER_BUFFER_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("movie duration must be positive, got {0} minutes")]
    InvalidDuration(i32),
}

/// The occupied time window of one screening. `end` is derived from the
/// movie duration, never stored independently of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ShowWindow {
    pub fn from_start(start: DateTime<Utc>, duration_minutes: i32) -> Result<Self, WindowError> {
        if duration_minutes <= 0 {
            return Err(WindowError::InvalidDuration(duration_minutes));
        }
        Ok(Self {
            start,
            end: start + Duration::minutes(duration_minutes as i64),
        })
    }

    /// Bounds of the blocked interval [start - buffer, end + buffer].
    /// The overlap query compares other showtimes against these bounds.
    pub fn buffered_bounds(&self, buffer_minutes: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let buffer = Duration::minutes(buffer_minutes);
        (self.start - buffer, self.end + buffer)
    }

    /// Buffered overlap test. Comparisons are strict: two screenings whose
    /// buffered edges touch exactly do not conflict.
    pub fn conflicts_with(&self, other: &ShowWindow, buffer_minutes: i64) -> bool {
        let (lower, upper) = self.buffered_bounds(buffer_minutes);
        other.start < upper && other.end > lower
    }
}
