use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use marquee_booking::inventory::{self, ActiveClaim};
use marquee_core::error::CoreError;
use marquee_core::model::{BookingStatus, Seat, SeatType, SeatWithStatus, Showtime};
use marquee_core::repository::{RescheduleRequest, ScheduleRequest, ShowtimeRepository};
use marquee_scheduling::ShowWindow;

use crate::tx::{RETRY_BACKOFF, TxError};

pub struct PgShowtimeRepository {
    pool: PgPool,
    buffer_minutes: i64,
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_id: Uuid,
    room_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    price_cents: i32,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Showtime {
            id: row.id,
            movie_id: row.movie_id,
            room_id: row.room_id,
            start_time: row.start_time,
            end_time: row.end_time,
            price_cents: row.price_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    room_id: Uuid,
    seat_row: String,
    seat_number: i32,
    seat_type: String,
    is_active: bool,
}

impl SeatRow {
    fn into_model(self) -> Result<Seat, CoreError> {
        let seat_type = SeatType::from_str(&self.seat_type).map_err(CoreError::Storage)?;
        Ok(Seat {
            id: self.id,
            room_id: self.room_id,
            row: self.seat_row,
            number: self.seat_number,
            seat_type,
            is_active: self.is_active,
        })
    }
}

const SELECT_SHOWTIME: &str =
    "SELECT id, movie_id, room_id, start_time, end_time, price_cents FROM showtimes WHERE id = $1";

impl PgShowtimeRepository {
    pub fn new(pool: PgPool, buffer_minutes: i64) -> Self {
        Self {
            pool,
            buffer_minutes,
        }
    }

    async fn movie_duration(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        movie_id: Uuid,
    ) -> Result<i32, TxError> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT duration_minutes FROM movies WHERE id = $1")
                .bind(movie_id)
                .fetch_optional(&mut **tx)
                .await?;
        row.map(|(d,)| d)
            .ok_or_else(|| CoreError::not_found("movie", movie_id).into())
    }

    /// Row-level lock on the room serializes concurrent schedulers: two
    /// overlap checks for the same room cannot both pass before either
    /// commits.
    async fn lock_room(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        room_id: Uuid,
    ) -> Result<(), TxError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM rooms WHERE id = $1 FOR UPDATE")
            .bind(room_id)
            .fetch_optional(&mut **tx)
            .await?;
        if row.is_none() {
            return Err(CoreError::not_found("room", room_id).into());
        }
        Ok(())
    }

    /// Buffered-interval overlap test, strict on both edges. `exclude`
    /// skips the showtime's own row on reschedule.
    async fn find_conflict(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        room_id: Uuid,
        window: &ShowWindow,
        exclude: Option<Uuid>,
    ) -> Result<Option<Uuid>, TxError> {
        let (lower, upper) = window.buffered_bounds(self.buffer_minutes);
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM showtimes \
             WHERE room_id = $1 AND start_time < $2 AND end_time > $3 \
             AND ($4::uuid IS NULL OR id <> $4) \
             ORDER BY start_time LIMIT 1",
        )
        .bind(room_id)
        .bind(upper)
        .bind(lower)
        .bind(exclude)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn schedule_once(&self, req: &ScheduleRequest) -> Result<Showtime, TxError> {
        let mut tx = self.pool.begin().await?;

        let duration = self.movie_duration(&mut tx, req.movie_id).await?;
        self.lock_room(&mut tx, req.room_id).await?;

        let window = ShowWindow::from_start(req.start_time, duration)
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if let Some(conflicting) = self
            .find_conflict(&mut tx, req.room_id, &window, None)
            .await?
        {
            return Err(CoreError::ScheduleConflict {
                conflicting_showtime_id: conflicting,
            }
            .into());
        }

        let row: ShowtimeRow = sqlx::query_as(
            "INSERT INTO showtimes (id, movie_id, room_id, start_time, end_time, price_cents) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, movie_id, room_id, start_time, end_time, price_cents",
        )
        .bind(Uuid::new_v4())
        .bind(req.movie_id)
        .bind(req.room_id)
        .bind(window.start)
        .bind(window.end)
        .bind(req.price_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(showtime_id = %row.id, room_id = %row.room_id, "showtime scheduled");
        Ok(row.into())
    }

    async fn reschedule_once(
        &self,
        showtime_id: Uuid,
        req: &RescheduleRequest,
    ) -> Result<Showtime, TxError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<ShowtimeRow> = sqlx::query_as(
            "SELECT id, movie_id, room_id, start_time, end_time, price_cents \
             FROM showtimes WHERE id = $1 FOR UPDATE",
        )
        .bind(showtime_id)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = existing.ok_or_else(|| CoreError::not_found("showtime", showtime_id))?;

        let movie_id = req.movie_id.unwrap_or(existing.movie_id);
        let start_time = req.start_time.unwrap_or(existing.start_time);
        let price_cents = req.price_cents.unwrap_or(existing.price_cents);

        let duration = self.movie_duration(&mut tx, movie_id).await?;
        self.lock_room(&mut tx, existing.room_id).await?;

        let window = ShowWindow::from_start(start_time, duration)
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if let Some(conflicting) = self
            .find_conflict(&mut tx, existing.room_id, &window, Some(showtime_id))
            .await?
        {
            return Err(CoreError::ScheduleConflict {
                conflicting_showtime_id: conflicting,
            }
            .into());
        }

        let row: ShowtimeRow = sqlx::query_as(
            "UPDATE showtimes \
             SET movie_id = $2, start_time = $3, end_time = $4, price_cents = $5, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING id, movie_id, room_id, start_time, end_time, price_cents",
        )
        .bind(showtime_id)
        .bind(movie_id)
        .bind(window.start)
        .bind(window.end)
        .bind(price_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(showtime_id = %showtime_id, "showtime rescheduled");
        Ok(row.into())
    }
}

#[async_trait]
impl ShowtimeRepository for PgShowtimeRepository {
    async fn schedule(&self, req: &ScheduleRequest) -> Result<Showtime, CoreError> {
        match self.schedule_once(req).await {
            Err(e) if e.is_transient() => {
                tracing::warn!("transient failure scheduling showtime, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.schedule_once(req).await.map_err(TxError::into_core)
            }
            other => other.map_err(TxError::into_core),
        }
    }

    async fn reschedule(
        &self,
        showtime_id: Uuid,
        req: &RescheduleRequest,
    ) -> Result<Showtime, CoreError> {
        match self.reschedule_once(showtime_id, req).await {
            Err(e) if e.is_transient() => {
                tracing::warn!("transient failure rescheduling showtime, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.reschedule_once(showtime_id, req)
                    .await
                    .map_err(TxError::into_core)
            }
            other => other.map_err(TxError::into_core),
        }
    }

    async fn get(&self, showtime_id: Uuid) -> Result<Option<Showtime>, CoreError> {
        let row: Option<ShowtimeRow> = sqlx::query_as(SELECT_SHOWTIME)
            .bind(showtime_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<Showtime>, CoreError> {
        let rows: Vec<ShowtimeRow> = sqlx::query_as(
            "SELECT id, movie_id, room_id, start_time, end_time, price_cents \
             FROM showtimes WHERE room_id = $1 ORDER BY start_time",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, showtime_id: Uuid) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM showtimes WHERE id = $1 FOR UPDATE")
                .bind(showtime_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        if exists.is_none() {
            return Err(CoreError::not_found("showtime", showtime_id));
        }

        let active: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bookings \
             WHERE showtime_id = $1 AND status IN ('PENDING', 'CONFIRMED') LIMIT 1",
        )
        .bind(showtime_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
        if active.is_some() {
            return Err(CoreError::Validation(
                "showtime has active bookings and cannot be deleted".to_string(),
            ));
        }

        // Historical (cancelled/refunded) bookings keep their FK rows; those
        // showtimes stay as audit trail.
        let deleted = sqlx::query("DELETE FROM showtimes WHERE id = $1")
            .bind(showtime_id)
            .execute(&mut *tx)
            .await;
        match deleted {
            Ok(_) => {}
            Err(e) if e.as_database_error().map(|d| d.is_foreign_key_violation()) == Some(true) => {
                return Err(CoreError::Validation(
                    "showtime has historical bookings and cannot be deleted".to_string(),
                ));
            }
            Err(e) => return Err(CoreError::Storage(e.to_string())),
        }

        tx.commit()
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn seat_statuses(&self, showtime_id: Uuid) -> Result<Vec<SeatWithStatus>, CoreError> {
        let showtime: Option<ShowtimeRow> = sqlx::query_as(SELECT_SHOWTIME)
            .bind(showtime_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        let showtime = showtime.ok_or_else(|| CoreError::not_found("showtime", showtime_id))?;

        let seat_rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, room_id, seat_row, seat_number, seat_type, is_active \
             FROM seats WHERE room_id = $1 ORDER BY seat_row, seat_number",
        )
        .bind(showtime.room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        let seats = seat_rows
            .into_iter()
            .map(SeatRow::into_model)
            .collect::<Result<Vec<_>, _>>()?;

        let claim_rows: Vec<(Uuid, String)> = sqlx::query_as(
            "SELECT st.seat_id, b.status FROM seat_tickets st \
             JOIN bookings b ON b.id = st.booking_id \
             WHERE st.showtime_id = $1 AND st.released_at IS NULL",
        )
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        let claims = claim_rows
            .into_iter()
            .map(|(seat_id, status)| {
                let booking_status =
                    BookingStatus::from_str(&status).map_err(CoreError::Storage)?;
                Ok(ActiveClaim {
                    seat_id,
                    booking_status,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(inventory::snapshot(&seats, &claims))
    }
}
