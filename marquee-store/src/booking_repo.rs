use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use marquee_booking::lifecycle;
use marquee_booking::PricingRules;
use marquee_core::error::CoreError;
use marquee_core::model::{Booking, BookingDetail, BookingStatus, SeatType, TicketDetail};
use marquee_core::repository::{BookingRepository, CreateBookingRequest, PaymentConfirmation};

use crate::app_config::BusinessRules;
use crate::tx::{unique_violation, RETRY_BACKOFF, TxError};

/// Partial unique index guarding the exclusivity invariant: at most one
/// active ticket per (showtime, seat). Named in migrations/0001_init.sql.
const ACTIVE_SEAT_CONSTRAINT: &str = "uq_active_seat_claim";
const IDEMPOTENCY_CONSTRAINT: &str = "uq_booking_idempotency";

pub struct PgBookingRepository {
    pool: PgPool,
    hold_ttl: Duration,
    pricing: PricingRules,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    showtime_id: Uuid,
    amount_cents: i32,
    status: String,
    payment_method: Option<String>,
    payment_reference: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_model(self) -> Result<Booking, CoreError> {
        let status = BookingStatus::from_str(&self.status).map_err(CoreError::Storage)?;
        Ok(Booking {
            id: self.id,
            user_id: self.user_id,
            showtime_id: self.showtime_id,
            amount_cents: self.amount_cents,
            status,
            payment_method: self.payment_method,
            payment_reference: self.payment_reference,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    seat_id: Uuid,
    seat_row: String,
    seat_number: i32,
    seat_type: String,
    price_cents: i32,
    is_used: bool,
    qr_reference: Option<String>,
}

impl TicketRow {
    fn into_model(self) -> Result<TicketDetail, CoreError> {
        let seat_type = SeatType::from_str(&self.seat_type).map_err(CoreError::Storage)?;
        Ok(TicketDetail {
            id: self.id,
            seat_id: self.seat_id,
            seat_row: self.seat_row,
            seat_number: self.seat_number,
            seat_type,
            price_cents: self.price_cents,
            is_used: self.is_used,
            qr_reference: self.qr_reference,
        })
    }
}

const SELECT_BOOKING_COLS: &str = "id, user_id, showtime_id, amount_cents, status, \
     payment_method, payment_reference, expires_at, created_at, updated_at";

const SELECT_TICKETS: &str = "SELECT st.id, st.seat_id, s.seat_row, s.seat_number, s.seat_type, \
     st.price_cents, st.is_used, st.qr_reference \
     FROM seat_tickets st JOIN seats s ON s.id = st.seat_id \
     WHERE st.booking_id = $1 ORDER BY s.seat_row, s.seat_number";

impl PgBookingRepository {
    pub fn new(pool: PgPool, rules: &BusinessRules) -> Self {
        Self {
            pool,
            hold_ttl: Duration::minutes(rules.hold_ttl_minutes as i64),
            pricing: PricingRules::new(rules.vip_price_multiplier),
        }
    }

    async fn fetch_detail(&self, booking_id: Uuid) -> Result<BookingDetail, CoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            SELECT_BOOKING_COLS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
        let booking = row
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?
            .into_model()?;

        let tickets: Vec<TicketRow> = sqlx::query_as(SELECT_TICKETS)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        let tickets = tickets
            .into_iter()
            .map(TicketRow::into_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BookingDetail { booking, tickets })
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
        user_id: &str,
    ) -> Result<Option<BookingDetail>, CoreError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM bookings WHERE idempotency_key = $1 AND user_id = $2")
                .bind(key)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        match row {
            Some((id,)) => Ok(Some(self.fetch_detail(id).await?)),
            None => Ok(None),
        }
    }

    /// Which of the requested seats currently carry an active ticket.
    /// Called after a claim aborts so the caller learns what was lost.
    async fn taken_seats(
        &self,
        showtime_id: Uuid,
        seat_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, CoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT seat_id FROM seat_tickets \
             WHERE showtime_id = $1 AND seat_id = ANY($2) AND released_at IS NULL",
        )
        .bind(showtime_id)
        .bind(seat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn lock_booking(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
        user_id: &str,
    ) -> Result<Booking, TxError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND user_id = $2 FOR UPDATE",
            SELECT_BOOKING_COLS
        ))
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        let booking = row
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?
            .into_model()?;
        Ok(booking)
    }

    async fn release_tickets(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        booking_id: Uuid,
    ) -> Result<(), TxError> {
        sqlx::query(
            "UPDATE seat_tickets SET released_at = NOW() \
             WHERE booking_id = $1 AND released_at IS NULL",
        )
        .bind(booking_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// The claim itself. All requested tickets are inserted in one
    /// transaction; the partial unique index rejects any seat already held,
    /// which aborts the whole booking. First committer wins.
    async fn create_once(&self, req: &CreateBookingRequest) -> Result<BookingDetail, TxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let showtime: Option<(Uuid, DateTime<Utc>, i32)> =
            sqlx::query_as("SELECT room_id, start_time, price_cents FROM showtimes WHERE id = $1")
                .bind(req.showtime_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (room_id, start_time, base_price) = showtime
            .ok_or_else(|| CoreError::not_found("showtime", req.showtime_id))?;

        if start_time <= now {
            return Err(CoreError::Validation(
                "showtime has already started".to_string(),
            )
            .into());
        }

        let seats: Vec<(Uuid, Uuid, String, bool)> = sqlx::query_as(
            "SELECT id, room_id, seat_type, is_active FROM seats WHERE id = ANY($1)",
        )
        .bind(&req.seat_ids)
        .fetch_all(&mut *tx)
        .await?;

        if seats.len() != req.seat_ids.len() {
            let found: HashSet<Uuid> = seats.iter().map(|(id, ..)| *id).collect();
            let missing = req
                .seat_ids
                .iter()
                .find(|id| !found.contains(id))
                .copied()
                .unwrap_or(req.showtime_id);
            return Err(CoreError::not_found("seat", missing).into());
        }

        let wrong_room: Vec<Uuid> = seats
            .iter()
            .filter(|(_, seat_room, _, _)| *seat_room != room_id)
            .map(|(id, ..)| *id)
            .collect();
        if !wrong_room.is_empty() {
            return Err(CoreError::Validation(format!(
                "seats do not belong to the showtime's room: {:?}",
                wrong_room
            ))
            .into());
        }

        // Deactivated seats are permanently unavailable, active ticket or not.
        let inactive: Vec<Uuid> = seats
            .iter()
            .filter(|(_, _, _, active)| !active)
            .map(|(id, ..)| *id)
            .collect();
        if !inactive.is_empty() {
            return Err(CoreError::SeatUnavailable { seat_ids: inactive }.into());
        }

        let priced: Vec<(Uuid, i32)> = seats
            .iter()
            .map(|(id, _, type_str, _)| {
                let seat_type = SeatType::from_str(type_str).map_err(CoreError::Storage)?;
                Ok((*id, self.pricing.seat_price_cents(seat_type, base_price)))
            })
            .collect::<Result<_, CoreError>>()?;
        let amount: i32 = priced.iter().map(|(_, p)| p).sum();

        let booking_id = Uuid::new_v4();
        let expires_at = now + self.hold_ttl;

        let inserted = sqlx::query(
            "INSERT INTO bookings \
             (id, user_id, showtime_id, amount_cents, status, idempotency_key, expires_at) \
             VALUES ($1, $2, $3, $4, 'PENDING', $5, $6)",
        )
        .bind(booking_id)
        .bind(&req.user_id)
        .bind(req.showtime_id)
        .bind(amount)
        .bind(&req.idempotency_key)
        .bind(expires_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if unique_violation(&e).as_deref() == Some(IDEMPOTENCY_CONSTRAINT) {
                // A concurrent retry with the same key beat us to it.
                tx.rollback().await.ok();
                return self
                    .find_by_idempotency_key(&req.idempotency_key, &req.user_id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("booking", &req.idempotency_key).into());
            }
            return Err(e.into());
        }

        for (seat_id, price) in &priced {
            let res = sqlx::query(
                "INSERT INTO seat_tickets \
                 (id, booking_id, seat_id, showtime_id, price_cents) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(booking_id)
            .bind(seat_id)
            .bind(req.showtime_id)
            .bind(price)
            .execute(&mut *tx)
            .await;

            if let Err(e) = res {
                if unique_violation(&e).as_deref() == Some(ACTIVE_SEAT_CONSTRAINT) {
                    tx.rollback().await.ok();
                    let taken = self.taken_seats(req.showtime_id, &req.seat_ids).await?;
                    tracing::info!(
                        showtime_id = %req.showtime_id,
                        "seat claim lost the race for {} seat(s)",
                        taken.len()
                    );
                    return Err(CoreError::SeatUnavailable { seat_ids: taken }.into());
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;

        tracing::info!(booking_id = %booking_id, user_id = %req.user_id, "booking created");
        Ok(self.fetch_detail(booking_id).await?)
    }

    async fn confirm_once(
        &self,
        booking_id: Uuid,
        user_id: &str,
        payment: &PaymentConfirmation,
    ) -> Result<BookingDetail, TxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let booking = self.lock_booking(&mut tx, booking_id, user_id).await?;
        lifecycle::validate_transition(
            booking.id,
            booking.status,
            BookingStatus::Confirmed,
            booking.expires_at,
            now,
        )?;

        // Conditional update: if the sweep cancelled this hold between our
        // read and here, zero rows change and the confirm is rejected.
        let updated = sqlx::query(
            "UPDATE bookings SET status = 'CONFIRMED', payment_method = $2, \
             payment_reference = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND expires_at > NOW()",
        )
        .bind(booking_id)
        .bind(&payment.payment_method)
        .bind(&payment.payment_reference)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(CoreError::Expired { booking_id }.into());
        }

        let tickets: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, seat_id FROM seat_tickets WHERE booking_id = $1")
                .bind(booking_id)
                .fetch_all(&mut *tx)
                .await?;
        for (ticket_id, seat_id) in tickets {
            sqlx::query("UPDATE seat_tickets SET qr_reference = $2 WHERE id = $1")
                .bind(ticket_id)
                .bind(lifecycle::ticket_reference(booking_id, seat_id))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::info!(booking_id = %booking_id, "booking confirmed");
        Ok(self.fetch_detail(booking_id).await?)
    }

    async fn cancel_once(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, TxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let booking = self.lock_booking(&mut tx, booking_id, user_id).await?;
        lifecycle::validate_transition(
            booking.id,
            booking.status,
            BookingStatus::Cancelled,
            booking.expires_at,
            now,
        )?;

        sqlx::query(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;
        self.release_tickets(&mut tx, booking_id).await?;

        tx.commit().await?;

        tracing::info!(booking_id = %booking_id, "booking cancelled");
        Ok(self.fetch_detail(booking_id).await?)
    }

    async fn refund_once(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, TxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let booking = self.lock_booking(&mut tx, booking_id, user_id).await?;
        lifecycle::validate_transition(
            booking.id,
            booking.status,
            BookingStatus::Refunded,
            booking.expires_at,
            now,
        )?;

        let used: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM seat_tickets WHERE booking_id = $1 AND is_used LIMIT 1",
        )
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some((ticket_id,)) = used {
            return Err(CoreError::TicketAlreadyUsed { ticket_id }.into());
        }

        sqlx::query(
            "UPDATE bookings SET status = 'REFUNDED', updated_at = NOW() \
             WHERE id = $1 AND status = 'CONFIRMED'",
        )
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;
        self.release_tickets(&mut tx, booking_id).await?;

        tx.commit().await?;

        tracing::info!(booking_id = %booking_id, "booking refunded");
        Ok(self.fetch_detail(booking_id).await?)
    }

    async fn check_in_once(&self, ticket_id: Uuid) -> Result<(), TxError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let row: Option<(bool, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT st.is_used, b.status, s.start_time, s.end_time \
             FROM seat_tickets st \
             JOIN bookings b ON b.id = st.booking_id \
             JOIN showtimes s ON s.id = st.showtime_id \
             WHERE st.id = $1 FOR UPDATE OF st, b",
        )
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await?;
        let (is_used, status, start_time, end_time) =
            row.ok_or_else(|| CoreError::not_found("ticket", ticket_id))?;

        let status = BookingStatus::from_str(&status).map_err(CoreError::Storage)?;
        if status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: status,
                to: BookingStatus::Confirmed,
            }
            .into());
        }
        if is_used {
            return Err(CoreError::TicketAlreadyUsed { ticket_id }.into());
        }
        if !lifecycle::within_checkin_window(start_time, end_time, now) {
            return Err(CoreError::CheckinWindowClosed { ticket_id }.into());
        }

        sqlx::query("UPDATE seat_tickets SET is_used = TRUE WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(ticket_id = %ticket_id, "ticket checked in");
        Ok(())
    }

    async fn sweep_once(&self, now: DateTime<Utc>) -> Result<u64, TxError> {
        let mut tx = self.pool.begin().await?;

        // Conditional on status, so a hold confirmed after our scan is
        // never cancelled out from under the payment path.
        let reaped: Vec<(Uuid,)> = sqlx::query_as(
            "UPDATE bookings SET status = 'CANCELLED', updated_at = NOW() \
             WHERE status = 'PENDING' AND expires_at <= $1 RETURNING id",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        if !reaped.is_empty() {
            let ids: Vec<Uuid> = reaped.iter().map(|(id,)| *id).collect();
            sqlx::query(
                "UPDATE seat_tickets SET released_at = NOW() \
                 WHERE booking_id = ANY($1) AND released_at IS NULL",
            )
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reaped.len() as u64)
    }

    async fn retry_once<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TxError>>,
    {
        match op().await {
            Err(e) if e.is_transient() => {
                tracing::warn!("transient failure in {}, retrying once", label);
                tokio::time::sleep(RETRY_BACKOFF).await;
                op().await.map_err(TxError::into_core)
            }
            other => other.map_err(TxError::into_core),
        }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create(&self, req: &CreateBookingRequest) -> Result<BookingDetail, CoreError> {
        if req.seat_ids.is_empty() {
            return Err(CoreError::Validation("seat_ids must not be empty".to_string()));
        }
        let unique: HashSet<Uuid> = req.seat_ids.iter().copied().collect();
        if unique.len() != req.seat_ids.len() {
            return Err(CoreError::Validation("duplicate seat ids in request".to_string()));
        }

        // Idempotent retry: same key returns the booking already created.
        if let Some(existing) = self
            .find_by_idempotency_key(&req.idempotency_key, &req.user_id)
            .await?
        {
            tracing::info!(
                booking_id = %existing.booking.id,
                "idempotent replay of booking creation"
            );
            return Ok(existing);
        }

        self.retry_once("booking creation", || self.create_once(req))
            .await
    }

    async fn get(
        &self,
        booking_id: Uuid,
        user_id: &str,
    ) -> Result<Option<BookingDetail>, CoreError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM bookings WHERE id = $1 AND user_id = $2")
                .bind(booking_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        match row {
            Some((id,)) => Ok(Some(self.fetch_detail(id).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookingDetail>, CoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        let mut bookings = Vec::with_capacity(rows.len());
        for (id,) in rows {
            bookings.push(self.fetch_detail(id).await?);
        }
        Ok(bookings)
    }

    async fn confirm(
        &self,
        booking_id: Uuid,
        user_id: &str,
        payment: &PaymentConfirmation,
    ) -> Result<BookingDetail, CoreError> {
        self.retry_once("booking confirmation", || {
            self.confirm_once(booking_id, user_id, payment)
        })
        .await
    }

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError> {
        self.retry_once("booking cancellation", || {
            self.cancel_once(booking_id, user_id)
        })
        .await
    }

    async fn refund(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError> {
        self.retry_once("booking refund", || self.refund_once(booking_id, user_id))
            .await
    }

    async fn check_in(&self, ticket_id: Uuid) -> Result<(), CoreError> {
        self.retry_once("ticket check-in", || self.check_in_once(ticket_id))
            .await
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        self.retry_once("expiry sweep", || self.sweep_once(now)).await
    }
}
