use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatType {
    Standard,
    Vip,
    Couple,
}

impl SeatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatType::Standard => "STANDARD",
            SeatType::Vip => "VIP",
            SeatType::Couple => "COUPLE",
        }
    }
}

impl FromStr for SeatType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(SeatType::Standard),
            "VIP" => Ok(SeatType::Vip),
            "COUPLE" => Ok(SeatType::Couple),
            other => Err(format!("unknown seat type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// Seat state as seen by a buyer for one showtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Held,
    Sold,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub id: Uuid,
    pub room_id: Uuid,
    pub row: String,
    pub number: i32,
    pub seat_type: SeatType,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Showtime {
    pub id: Uuid,
    pub movie_id: Uuid,
    pub room_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price_cents: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub showtime_id: Uuid,
    pub amount_cents: i32,
    pub status: BookingStatus,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket line item joined with its seat coordinates, as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub id: Uuid,
    pub seat_id: Uuid,
    pub seat_row: String,
    pub seat_number: i32,
    pub seat_type: SeatType,
    pub price_cents: i32,
    pub is_used: bool,
    pub qr_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingDetail {
    pub booking: Booking,
    pub tickets: Vec<TicketDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatWithStatus {
    pub id: Uuid,
    pub room_id: Uuid,
    pub row: String,
    pub number: i32,
    pub seat_type: SeatType,
    pub is_active: bool,
    pub status: SeatStatus,
}
