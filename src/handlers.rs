// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers. Each handler extracts its inputs, delegates to
// checkout / store and returns JSON. Request counts and latency are recorded
// for every response by `metrics::track_http`.
//
// AXUM EXTRACTORS USED:
// - State<Arc<AppState>>: shared application context
// - Subject: caller identity and roles (see auth.rs)
// - Path<T> / Json<T>: path parameters and request bodies
// - HeaderMap + Bytes: raw webhook delivery for signature checking
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::auth::{authorize, Role, Subject};
use crate::availability::DateRange;
use crate::checkout::{self, WebhookOutcome};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::*;
use crate::payments::SIGNATURE_HEADER;
use crate::AppState;

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness check
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "hotel-booking-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check: the store must answer; Redis only counts when configured.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    let store_healthy = state.store.health_check().await;
    let redis_healthy = state.cache.ping().await;

    let all_healthy = store_healthy && redis_healthy.unwrap_or(true);
    let status = if all_healthy { "ready" } else { "not_ready" };

    let response = ReadinessResponse {
        status: status.to_string(),
        checks: ReadinessChecks {
            store: store_healthy,
            redis: redis_healthy,
        },
    };

    if all_healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// ROOM CATALOG
// =============================================================================

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Room>>> {
    let start = Instant::now();

    let rooms = state.store.list_rooms().await?;

    metrics::record_db_query("list_rooms", start.elapsed().as_secs_f64());

    Ok(Json(rooms))
}

/// GET /api/v1/rooms/:id
///
/// - 200 OK: room JSON
/// - 404 Not Found: unknown room id
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> AppResult<Json<Room>> {
    let room = checkout::load_room(&state, &room_id).await?;

    Ok(Json(room))
}

/// Quote a stay: availability over the occupied nights and total cost.
///
/// POST /api/v1/rooms/:id/availability
///
/// # Request Body
/// ```json
/// { "check_in": "2024-08-15", "check_out": "2024-08-18" }
/// ```
///
/// An unavailable range is a normal 200 answer with `"available": false`.
/// An empty or inverted range is a 400.
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(request): Json<AvailabilityRequest>,
) -> AppResult<Json<AvailabilityResponse>> {
    let range = DateRange::new(request.check_in, request.check_out);
    let quote = checkout::quote(&state, &room_id, &range).await?;

    Ok(Json(quote.to_response(&state.config.currency)))
}

// =============================================================================
// PAYMENTS
// =============================================================================

/// Start a gateway transaction for a stay.
///
/// POST /api/v1/payments/initialize
///
/// # Request Body
/// ```json
/// { "room_id": "deluxe-king", "check_in": "2024-08-15", "check_out": "2024-08-18",
///   "email": "guest@example.com" }
/// ```
pub async fn initialize_payment(
    State(state): State<Arc<AppState>>,
    subject: Subject,
    Json(request): Json<InitializePaymentRequest>,
) -> AppResult<Json<InitializePaymentResponse>> {
    let user_id = subject.require_user()?;

    let response = checkout::initialize_payment(&state, user_id, &request).await?;

    Ok(Json(response))
}

/// Gateway webhook. Authenticated by the signature over the raw body, so the
/// body must not be parsed before verification.
///
/// POST /api/v1/payments/webhook
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookOutcome>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = checkout::handle_webhook(&state, signature, &body).await?;

    Ok(Json(outcome))
}

// =============================================================================
// BOOKINGS
// =============================================================================

/// Place a booking.
///
/// POST /api/v1/bookings
///
/// # Request Body
/// ```json
/// { "payment_method": "Paystack", "room_id": "deluxe-king",
///   "check_in": "2024-08-15", "check_out": "2024-08-18", "transaction_ref": "T123" }
/// ```
///
/// # Response
/// - 201 Created: booking record
/// - 400: invalid range or reused transaction
/// - 402: payment not successful
/// - 409: room fully booked on a night of the stay
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    subject: Subject,
    Json(request): Json<BookingRequest>,
) -> AppResult<(StatusCode, Json<BookingRecord>)> {
    let user_id = subject.require_user()?;

    tracing::info!(
        user_id = %user_id,
        room_id = %request.room_id(),
        payment_method = %request.payment_method(),
        "Attempting to place booking"
    );

    let record = checkout::place_booking(&state, user_id, &request).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// The caller's bookings, newest first.
///
/// GET /api/v1/bookings
pub async fn my_bookings(
    State(state): State<Arc<AppState>>,
    subject: Subject,
) -> AppResult<Json<BookingListResponse>> {
    let start = Instant::now();
    let user_id = subject.require_user()?;

    let bookings = state.store.bookings_by_user(user_id).await?;

    metrics::record_db_query("bookings_by_user", start.elapsed().as_secs_f64());

    Ok(Json(BookingListResponse {
        total: bookings.len(),
        bookings,
    }))
}

/// One booking. Guests only see their own; staff see all.
///
/// GET /api/v1/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    subject: Subject,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingRecord>> {
    let booking = state
        .store
        .get_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Booking not found: {}", id)))?;

    let is_owner = subject.user_id.as_deref() == Some(booking.user_id.as_str());
    if !is_owner && !authorize(&subject, &[Role::Staff, Role::Admin]).is_granted() {
        // not revealing that the id exists
        return Err(AppError::NotFound(format!("Booking not found: {}", id)));
    }

    Ok(Json(booking))
}

// =============================================================================
// STAFF / ADMIN
// =============================================================================

/// GET /api/v1/admin/bookings
pub async fn admin_list_bookings(
    State(state): State<Arc<AppState>>,
    subject: Subject,
) -> AppResult<Json<BookingListResponse>> {
    authorize(&subject, &[Role::Staff, Role::Admin]).require()?;

    let bookings = state.store.list_bookings().await?;

    Ok(Json(BookingListResponse {
        total: bookings.len(),
        bookings,
    }))
}

/// Allocate a physical room number to a booking.
///
/// PUT /api/v1/admin/bookings/:id/room-number
///
/// # Request Body
/// ```json
/// { "room_number": "304" }
/// ```
pub async fn assign_room_number(
    State(state): State<Arc<AppState>>,
    subject: Subject,
    Path(id): Path<Uuid>,
    Json(request): Json<AssignRoomNumberRequest>,
) -> AppResult<Json<BookingRecord>> {
    authorize(&subject, &[Role::Staff, Role::Admin]).require()?;

    let room_number = request.room_number.trim();
    if room_number.is_empty() {
        return Err(AppError::Validation("room_number must not be empty".to_string()));
    }

    let booking = state.store.assign_room_number(id, room_number).await?;

    tracing::info!(
        booking_id = %id,
        room_number = %room_number,
        "Room number assigned"
    );

    Ok(Json(booking))
}

/// Successful payments that have no booking record.
///
/// GET /api/v1/admin/reconciliation
pub async fn reconciliation(
    State(state): State<Arc<AppState>>,
    subject: Subject,
) -> AppResult<Json<ReconciliationResponse>> {
    authorize(&subject, &[Role::Admin]).require()?;

    let payments = checkout::unreconciled_payments(&state).await?;

    Ok(Json(ReconciliationResponse {
        total: payments.len(),
        payments,
    }))
}
