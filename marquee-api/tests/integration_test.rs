use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use marquee_api::{app, AppState};
use marquee_booking::inventory::{self, ActiveClaim};
use marquee_booking::{lifecycle, PricingRules};
use marquee_core::model::{
    Booking, BookingDetail, BookingStatus, Seat, SeatType, SeatWithStatus, Showtime, TicketDetail,
};
use marquee_core::repository::{
    BookingRepository, CreateBookingRequest, PaymentConfirmation, RescheduleRequest,
    ScheduleRequest, ShowtimeRepository,
};
use marquee_core::CoreError;
use marquee_scheduling::{ShowWindow, CHANGEOVER_BUFFER_MINUTES};

// ---------------------------------------------------------------------------
// In-memory cinema backing both repository traits, built on the same pure
// window / lifecycle / pricing / inventory logic the Postgres layer uses.
// ---------------------------------------------------------------------------

struct Inner {
    durations: HashMap<Uuid, i32>,
    showtimes: Vec<Showtime>,
    seats: Vec<Seat>,
    bookings: HashMap<Uuid, BookingDetail>,
    by_key: HashMap<String, Uuid>,
}

struct MockCinema {
    inner: Mutex<Inner>,
    pricing: PricingRules,
    hold_ttl: Duration,
}

impl MockCinema {
    fn new(durations: HashMap<Uuid, i32>, showtimes: Vec<Showtime>, seats: Vec<Seat>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                durations,
                showtimes,
                seats,
                bookings: HashMap::new(),
                by_key: HashMap::new(),
            }),
            pricing: PricingRules::default(),
            hold_ttl: Duration::minutes(10),
        }
    }
}

fn active_claims(inner: &Inner, showtime_id: Uuid) -> Vec<ActiveClaim> {
    inner
        .bookings
        .values()
        .filter(|d| {
            d.booking.showtime_id == showtime_id
                && matches!(
                    d.booking.status,
                    BookingStatus::Pending | BookingStatus::Confirmed
                )
        })
        .flat_map(|d| {
            d.tickets.iter().map(|t| ActiveClaim {
                seat_id: t.seat_id,
                booking_status: d.booking.status,
            })
        })
        .collect()
}

#[async_trait]
impl ShowtimeRepository for MockCinema {
    async fn schedule(&self, req: &ScheduleRequest) -> Result<Showtime, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let duration = *inner
            .durations
            .get(&req.movie_id)
            .ok_or_else(|| CoreError::not_found("movie", req.movie_id))?;
        let window = ShowWindow::from_start(req.start_time, duration)
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if let Some(existing) = inner.showtimes.iter().find(|s| {
            s.room_id == req.room_id
                && window.conflicts_with(
                    &ShowWindow {
                        start: s.start_time,
                        end: s.end_time,
                    },
                    CHANGEOVER_BUFFER_MINUTES,
                )
        }) {
            return Err(CoreError::ScheduleConflict {
                conflicting_showtime_id: existing.id,
            });
        }

        let showtime = Showtime {
            id: Uuid::new_v4(),
            movie_id: req.movie_id,
            room_id: req.room_id,
            start_time: window.start,
            end_time: window.end,
            price_cents: req.price_cents,
        };
        inner.showtimes.push(showtime.clone());
        Ok(showtime)
    }

    async fn reschedule(
        &self,
        showtime_id: Uuid,
        req: &RescheduleRequest,
    ) -> Result<Showtime, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let existing = inner
            .showtimes
            .iter()
            .find(|s| s.id == showtime_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("showtime", showtime_id))?;

        let movie_id = req.movie_id.unwrap_or(existing.movie_id);
        let start = req.start_time.unwrap_or(existing.start_time);
        let duration = *inner
            .durations
            .get(&movie_id)
            .ok_or_else(|| CoreError::not_found("movie", movie_id))?;
        let window = ShowWindow::from_start(start, duration)
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        if let Some(other) = inner.showtimes.iter().find(|s| {
            s.id != showtime_id
                && s.room_id == existing.room_id
                && window.conflicts_with(
                    &ShowWindow {
                        start: s.start_time,
                        end: s.end_time,
                    },
                    CHANGEOVER_BUFFER_MINUTES,
                )
        }) {
            return Err(CoreError::ScheduleConflict {
                conflicting_showtime_id: other.id,
            });
        }

        let slot = inner
            .showtimes
            .iter_mut()
            .find(|s| s.id == showtime_id)
            .unwrap();
        slot.movie_id = movie_id;
        slot.start_time = window.start;
        slot.end_time = window.end;
        if let Some(price) = req.price_cents {
            slot.price_cents = price;
        }
        Ok(slot.clone())
    }

    async fn get(&self, showtime_id: Uuid) -> Result<Option<Showtime>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.showtimes.iter().find(|s| s.id == showtime_id).cloned())
    }

    async fn list_by_room(&self, room_id: Uuid) -> Result<Vec<Showtime>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut list: Vec<Showtime> = inner
            .showtimes
            .iter()
            .filter(|s| s.room_id == room_id)
            .cloned()
            .collect();
        list.sort_by_key(|s| s.start_time);
        Ok(list)
    }

    async fn delete(&self, showtime_id: Uuid) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let has_active = inner.bookings.values().any(|d| {
            d.booking.showtime_id == showtime_id
                && matches!(
                    d.booking.status,
                    BookingStatus::Pending | BookingStatus::Confirmed
                )
        });
        if has_active {
            return Err(CoreError::Validation(
                "showtime has active bookings and cannot be deleted".to_string(),
            ));
        }
        let before = inner.showtimes.len();
        inner.showtimes.retain(|s| s.id != showtime_id);
        if inner.showtimes.len() == before {
            return Err(CoreError::not_found("showtime", showtime_id));
        }
        Ok(())
    }

    async fn seat_statuses(&self, showtime_id: Uuid) -> Result<Vec<SeatWithStatus>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let showtime = inner
            .showtimes
            .iter()
            .find(|s| s.id == showtime_id)
            .ok_or_else(|| CoreError::not_found("showtime", showtime_id))?;
        let seats: Vec<Seat> = inner
            .seats
            .iter()
            .filter(|s| s.room_id == showtime.room_id)
            .cloned()
            .collect();
        let claims = active_claims(&inner, showtime_id);
        Ok(inventory::snapshot(&seats, &claims))
    }
}

#[async_trait]
impl BookingRepository for MockCinema {
    async fn create(&self, req: &CreateBookingRequest) -> Result<BookingDetail, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        if let Some(existing_id) = inner.by_key.get(&req.idempotency_key) {
            return Ok(inner.bookings[existing_id].clone());
        }

        let showtime = inner
            .showtimes
            .iter()
            .find(|s| s.id == req.showtime_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("showtime", req.showtime_id))?;
        if showtime.start_time <= now {
            return Err(CoreError::Validation(
                "showtime has already started".to_string(),
            ));
        }

        let mut requested = Vec::new();
        for seat_id in &req.seat_ids {
            let seat = inner
                .seats
                .iter()
                .find(|s| s.id == *seat_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("seat", *seat_id))?;
            if !seat.is_active {
                return Err(CoreError::SeatUnavailable {
                    seat_ids: vec![*seat_id],
                });
            }
            requested.push(seat);
        }

        let claims = active_claims(&inner, req.showtime_id);
        let taken: Vec<Uuid> = req
            .seat_ids
            .iter()
            .filter(|id| claims.iter().any(|c| c.seat_id == **id))
            .copied()
            .collect();
        if !taken.is_empty() {
            return Err(CoreError::SeatUnavailable { seat_ids: taken });
        }

        let booking_id = Uuid::new_v4();
        let tickets: Vec<TicketDetail> = requested
            .iter()
            .map(|seat| TicketDetail {
                id: Uuid::new_v4(),
                seat_id: seat.id,
                seat_row: seat.row.clone(),
                seat_number: seat.number,
                seat_type: seat.seat_type,
                price_cents: self
                    .pricing
                    .seat_price_cents(seat.seat_type, showtime.price_cents),
                is_used: false,
                qr_reference: None,
            })
            .collect();
        let amount = tickets.iter().map(|t| t.price_cents).sum();

        let detail = BookingDetail {
            booking: Booking {
                id: booking_id,
                user_id: req.user_id.clone(),
                showtime_id: req.showtime_id,
                amount_cents: amount,
                status: BookingStatus::Pending,
                payment_method: None,
                payment_reference: None,
                expires_at: now + self.hold_ttl,
                created_at: now,
                updated_at: now,
            },
            tickets,
        };
        inner.by_key.insert(req.idempotency_key.clone(), booking_id);
        inner.bookings.insert(booking_id, detail.clone());
        Ok(detail)
    }

    async fn get(
        &self,
        booking_id: Uuid,
        user_id: &str,
    ) -> Result<Option<BookingDetail>, CoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bookings
            .get(&booking_id)
            .filter(|d| d.booking.user_id == user_id)
            .cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<BookingDetail>, CoreError> {
        let inner = self.inner.lock().unwrap();
        let mut list: Vec<BookingDetail> = inner
            .bookings
            .values()
            .filter(|d| d.booking.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
        Ok(list)
    }

    async fn confirm(
        &self,
        booking_id: Uuid,
        user_id: &str,
        payment: &PaymentConfirmation,
    ) -> Result<BookingDetail, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let detail = inner
            .bookings
            .get_mut(&booking_id)
            .filter(|d| d.booking.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;

        lifecycle::validate_transition(
            booking_id,
            detail.booking.status,
            BookingStatus::Confirmed,
            detail.booking.expires_at,
            now,
        )?;

        detail.booking.status = BookingStatus::Confirmed;
        detail.booking.payment_method = payment.payment_method.clone();
        detail.booking.payment_reference = payment.payment_reference.clone();
        detail.booking.updated_at = now;
        for ticket in &mut detail.tickets {
            ticket.qr_reference = Some(lifecycle::ticket_reference(booking_id, ticket.seat_id));
        }
        Ok(detail.clone())
    }

    async fn cancel(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let detail = inner
            .bookings
            .get_mut(&booking_id)
            .filter(|d| d.booking.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
        lifecycle::validate_transition(
            booking_id,
            detail.booking.status,
            BookingStatus::Cancelled,
            detail.booking.expires_at,
            now,
        )?;
        detail.booking.status = BookingStatus::Cancelled;
        detail.booking.updated_at = now;
        Ok(detail.clone())
    }

    async fn refund(&self, booking_id: Uuid, user_id: &str) -> Result<BookingDetail, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let detail = inner
            .bookings
            .get_mut(&booking_id)
            .filter(|d| d.booking.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
        lifecycle::validate_transition(
            booking_id,
            detail.booking.status,
            BookingStatus::Refunded,
            detail.booking.expires_at,
            now,
        )?;
        if let Some(used) = detail.tickets.iter().find(|t| t.is_used) {
            return Err(CoreError::TicketAlreadyUsed { ticket_id: used.id });
        }
        detail.booking.status = BookingStatus::Refunded;
        detail.booking.updated_at = now;
        Ok(detail.clone())
    }

    async fn check_in(&self, ticket_id: Uuid) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        let (booking_id, showtime_id) = inner
            .bookings
            .values()
            .find_map(|d| {
                d.tickets
                    .iter()
                    .find(|t| t.id == ticket_id)
                    .map(|_| (d.booking.id, d.booking.showtime_id))
            })
            .ok_or_else(|| CoreError::not_found("ticket", ticket_id))?;

        let showtime = inner
            .showtimes
            .iter()
            .find(|s| s.id == showtime_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("showtime", showtime_id))?;

        let detail = inner.bookings.get_mut(&booking_id).unwrap();
        if detail.booking.status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidTransition {
                from: detail.booking.status,
                to: BookingStatus::Confirmed,
            });
        }
        let ticket = detail
            .tickets
            .iter_mut()
            .find(|t| t.id == ticket_id)
            .unwrap();
        if ticket.is_used {
            return Err(CoreError::TicketAlreadyUsed { ticket_id });
        }
        if !lifecycle::within_checkin_window(showtime.start_time, showtime.end_time, now) {
            return Err(CoreError::CheckinWindowClosed { ticket_id });
        }
        ticket.is_used = true;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut reaped = 0;
        for detail in inner.bookings.values_mut() {
            if detail.booking.status == BookingStatus::Pending
                && detail.booking.expires_at <= now
            {
                detail.booking.status = BookingStatus::Cancelled;
                detail.booking.updated_at = now;
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    state: AppState,
    room_id: Uuid,
    movie_id: Uuid,
    showtime_id: Uuid,
    imminent_showtime_id: Uuid,
    seat_a1: Uuid,
    seat_a2: Uuid,
    seat_vip: Uuid,
    seat_inactive: Uuid,
}

fn fixture() -> Fixture {
    let room_id = Uuid::new_v4();
    let movie_id = Uuid::new_v4();
    let showtime_id = Uuid::new_v4();
    let imminent_showtime_id = Uuid::new_v4();

    let seat = |row: &str, number: i32, seat_type: SeatType, is_active: bool| Seat {
        id: Uuid::new_v4(),
        room_id,
        row: row.to_string(),
        number,
        seat_type,
        is_active,
    };
    let seats = vec![
        seat("A", 1, SeatType::Standard, true),
        seat("A", 2, SeatType::Standard, true),
        seat("A", 3, SeatType::Vip, true),
        seat("A", 4, SeatType::Standard, false),
    ];
    let seat_a1 = seats[0].id;
    let seat_a2 = seats[1].id;
    let seat_vip = seats[2].id;
    let seat_inactive = seats[3].id;

    let tomorrow = Utc::now() + Duration::days(1);
    let soon = Utc::now() + Duration::minutes(10);
    let showtimes = vec![
        Showtime {
            id: showtime_id,
            movie_id,
            room_id,
            start_time: tomorrow,
            end_time: tomorrow + Duration::minutes(100),
            price_cents: 1200,
        },
        Showtime {
            id: imminent_showtime_id,
            movie_id,
            room_id: Uuid::new_v4(),
            start_time: soon,
            end_time: soon + Duration::minutes(100),
            price_cents: 1000,
        },
    ];

    let mut durations = HashMap::new();
    durations.insert(movie_id, 100);

    let cinema = Arc::new(MockCinema::new(durations, showtimes, seats));
    let state = AppState {
        showtimes: cinema.clone(),
        bookings: cinema,
    };

    Fixture {
        state,
        room_id,
        movie_id,
        showtime_id,
        imminent_showtime_id,
        seat_a1,
        seat_a2,
        seat_vip,
        seat_inactive,
    }
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_booking_routes_require_identity_header() {
    let fx = fixture();
    let app = app(fx.state);

    let response = app
        .oneshot(request("GET", "/v1/bookings", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_schedule_conflict_within_buffer_rejected() {
    let fx = fixture();
    let app = app(fx.state);

    // Existing screening tomorrow runs 100 minutes; 5 minutes after its end
    // is inside the 15-minute changeover buffer.
    let inside_buffer = Utc::now() + Duration::days(1) + Duration::minutes(105);
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/showtimes",
            None,
            Some(json!({
                "movie_id": fx.movie_id,
                "room_id": fx.room_id,
                "start_time": inside_buffer,
                "price_cents": 1500,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "schedule_conflict");
    assert_eq!(body["conflicting_showtime_id"], json!(fx.showtime_id));

    // One minute past the buffer edge is allowed.
    let past_buffer = Utc::now() + Duration::days(1) + Duration::minutes(116);
    let response = app
        .oneshot(request(
            "POST",
            "/v1/showtimes",
            None,
            Some(json!({
                "movie_id": fx.movie_id,
                "room_id": fx.room_id,
                "start_time": past_buffer,
                "price_cents": 1500,
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_claim_is_all_or_nothing() {
    let fx = fixture();
    let app = app(fx.state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a1, fx.seat_a2],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Overlapping claim loses and reports only the contested seat.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("bob"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a2, fx.seat_vip],
                "idempotency_key": "bob-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "seat_unavailable");
    assert_eq!(body["seat_ids"], json!([fx.seat_a2]));

    // The untouched seat from the losing claim is still free.
    let response = app
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("bob"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_vip],
                "idempotency_key": "bob-2",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() {
    let fx = fixture();
    let app = app(fx.state);

    let mut handles = Vec::new();
    for n in 0..8 {
        let app = app.clone();
        let showtime_id = fx.showtime_id;
        let seat_id = fx.seat_a1;
        handles.push(tokio::spawn(async move {
            let user = format!("user-{}", n);
            let response = app
                .oneshot(request(
                    "POST",
                    "/v1/bookings",
                    Some(user.as_str()),
                    Some(json!({
                        "showtime_id": showtime_id,
                        "seat_ids": [seat_id],
                        "idempotency_key": format!("key-{}", n),
                    })),
                ))
                .await
                .unwrap();
            response.status()
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn test_inactive_seat_is_never_sold() {
    let fx = fixture();
    let app = app(fx.state);

    let response = app
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_inactive],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "seat_unavailable");
}

#[tokio::test]
async fn test_idempotent_booking_creation() {
    let fx = fixture();
    let app = app(fx.state);

    let payload = json!({
        "showtime_id": fx.showtime_id,
        "seat_ids": [fx.seat_a1],
        "idempotency_key": "alice-retry",
    });

    let first = app
        .clone()
        .oneshot(request("POST", "/v1/bookings", Some("alice"), Some(payload.clone())))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = json_body(first).await;

    let second = app
        .oneshot(request("POST", "/v1/bookings", Some("alice"), Some(payload)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_body = json_body(second).await;

    assert_eq!(first_body["booking"]["id"], second_body["booking"]["id"]);
}

#[tokio::test]
async fn test_vip_pricing_and_confirm_flow() {
    let fx = fixture();
    let app = app(fx.state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a1, fx.seat_vip],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    // 1200 standard + 1500 VIP (1.25x)
    assert_eq!(body["booking"]["amount_cents"], 2700);
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/v1/bookings/{}/confirm", booking_id),
            Some("alice"),
            Some(json!({ "payment_method": "card", "payment_reference": "pay_123" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["booking"]["status"], "CONFIRMED");
    for ticket in body["tickets"].as_array().unwrap() {
        let reference = ticket["qr_reference"].as_str().unwrap();
        assert!(reference.starts_with(&format!("TICKET-{}-", booking_id)));
    }

    // Confirming twice is an invalid transition.
    let response = app
        .oneshot(request(
            "POST",
            &format!("/v1/bookings/{}/confirm", booking_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn test_refund_blocked_after_check_in() {
    let fx = fixture();
    let app = app(fx.state);

    // Book against the screening starting in ten minutes so check-in is open.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.imminent_showtime_id,
                "seat_ids": [fx.seat_a1],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    let ticket_id = body["tickets"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/v1/bookings/{}/confirm", booking_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/v1/tickets/{}/checkin", ticket_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(
            "POST",
            &format!("/v1/bookings/{}/refund", booking_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ticket_already_used");
    assert_eq!(body["ticket_id"], json!(ticket_id));
}

#[tokio::test]
async fn test_check_in_rejected_before_doors_open() {
    let fx = fixture();
    let app = app(fx.state);

    // The screening starts tomorrow, well before the 15-minute door window.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a1],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();
    let ticket_id = body["tickets"][0]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/v1/bookings/{}/confirm", booking_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(request(
            "POST",
            &format!("/v1/tickets/{}/checkin", ticket_id),
            Some("alice"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "checkin_window_closed");
    assert_eq!(body["ticket_id"], json!(ticket_id));
}

#[tokio::test]
async fn test_bookings_are_scoped_to_their_owner() {
    let fx = fixture();
    let app = app(fx.state);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a1],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    let booking_id = body["booking"]["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request(
            "GET",
            &format!("/v1/bookings/{}", booking_id),
            Some("mallory"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_seat_snapshot_reflects_holds_and_sales() {
    let fx = fixture();
    let app = app(fx.state.clone());

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/bookings",
            Some("alice"),
            Some(json!({
                "showtime_id": fx.showtime_id,
                "seat_ids": [fx.seat_a1],
                "idempotency_key": "alice-1",
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(request(
            "GET",
            &format!("/v1/showtimes/{}/seats", fx.showtime_id),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let seats = body.as_array().unwrap();

    let status_of = |seat_id: Uuid| -> String {
        seats
            .iter()
            .find(|s| s["id"] == json!(seat_id))
            .unwrap()["status"]
            .as_str()
            .unwrap()
            .to_string()
    };
    assert_eq!(status_of(fx.seat_a1), "held");
    assert_eq!(status_of(fx.seat_a2), "available");
    assert_eq!(status_of(fx.seat_inactive), "unavailable");
}

#[tokio::test]
async fn test_expired_hold_frees_seats_for_reclaim() {
    let fx = fixture();

    // Claim, then force the hold past its deadline and sweep.
    let req = CreateBookingRequest {
        user_id: "alice".to_string(),
        showtime_id: fx.showtime_id,
        seat_ids: vec![fx.seat_a1],
        idempotency_key: "alice-1".to_string(),
    };
    let detail = fx.state.bookings.create(&req).await.unwrap();

    let reaped = fx
        .state
        .bookings
        .sweep_expired(detail.booking.expires_at + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(reaped, 1);

    // Confirming the reaped hold is rejected, and the seat is claimable again.
    let err = fx
        .state
        .bookings
        .confirm(detail.booking.id, "alice", &PaymentConfirmation::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidTransition { .. }));

    let req = CreateBookingRequest {
        user_id: "bob".to_string(),
        showtime_id: fx.showtime_id,
        seat_ids: vec![fx.seat_a1],
        idempotency_key: "bob-1".to_string(),
    };
    let detail = fx.state.bookings.create(&req).await.unwrap();
    assert_eq!(detail.booking.status, BookingStatus::Pending);
}
