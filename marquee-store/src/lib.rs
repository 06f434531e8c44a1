pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod showtime_repo;
mod tx;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use showtime_repo::PgShowtimeRepository;
