use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{BookingDetail, SeatWithStatus, Showtime};

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub movie_id: Uuid,
    pub room_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub price_cents: i32,
}

/// Partial update; `end_time` is recomputed whenever start or movie changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RescheduleRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub movie_id: Option<Uuid>,
    pub price_cents: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct CreateBookingRequest {
    pub user_id: String,
    pub showtime_id: Uuid,
    pub seat_ids: Vec<Uuid>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
}

/// Repository trait for showtime scheduling and the seat-inventory view.
#[async_trait]
pub trait ShowtimeRepository: Send + Sync {
    async fn schedule(&self, req: &ScheduleRequest) -> Result<Showtime, CoreError>;

    async fn reschedule(
        &self,
        showtime_id: Uuid,
        req: &RescheduleRequest,
    ) -> Result<Showtime, CoreError>;

    async fn get(&self, showtime_id: Uuid) -> Result<Option<Showtime>, CoreError>;

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<Showtime>, CoreError>;

    /// Fails while the showtime still has active bookings.
    async fn delete(&self, showtime_id: Uuid) -> Result<(), CoreError>;

    async fn seat_statuses(&self, showtime_id: Uuid) -> Result<Vec<SeatWithStatus>, CoreError>;
}

/// Repository trait for the booking lifecycle. Claims and transitions run
/// inside one storage transaction per call.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, req: &CreateBookingRequest) -> Result<BookingDetail, CoreError>;

    async fn get(&self, booking_id: Uuid, user_id: &str)
        -> Result<Option<BookingDetail>, CoreError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookingDetail>, CoreError>;

    async fn confirm(
        &self,
        booking_id: Uuid,
        user_id: &str,
        payment: &PaymentConfirmation,
    ) -> Result<BookingDetail, CoreError>;

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError>;

    async fn refund(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError>;

    async fn check_in(&self, ticket_id: Uuid) -> Result<(), CoreError>;

    /// Cancels PENDING bookings past their expiry and releases their seats.
    /// Returns the number of bookings reaped.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, CoreError>;
}
