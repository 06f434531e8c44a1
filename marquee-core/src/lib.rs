pub mod error;
pub mod model;
pub mod repository;

pub use error::CoreError;
pub use model::{
    Booking, BookingDetail, BookingStatus, Seat, SeatStatus, SeatType, SeatWithStatus, Showtime,
    TicketDetail,
};
