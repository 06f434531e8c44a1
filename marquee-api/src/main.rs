use std::net::SocketAddr;
use std::sync::Arc;

use marquee_api::{app, state::AppState, sweep};
use marquee_core::repository::{BookingRepository, ShowtimeRepository};
use marquee_store::{DbClient, PgBookingRepository, PgShowtimeRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = marquee_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let showtimes: Arc<dyn ShowtimeRepository> = Arc::new(PgShowtimeRepository::new(
        db.pool.clone(),
        config.business_rules.changeover_buffer_minutes,
    ));
    let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(
        db.pool.clone(),
        &config.business_rules,
    ));

    tokio::spawn(sweep::run(
        bookings.clone(),
        config.business_rules.sweep_interval_seconds,
    ));

    let app_state = AppState {
        showtimes,
        bookings,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
