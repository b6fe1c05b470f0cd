// =============================================================================
// CHECKOUT MODULE
// =============================================================================
// Orchestrates the booking flow over the store and the payment gateway:
//
//   quote               range -> room -> inventory -> availability + cost
//   initialize_payment  quote -> gateway transaction
//   place_booking       quote -> (verify payment) -> build record -> persist
//   handle_webhook      signed gateway notification -> payment confirmation
//
// Paid bookings are confirmed on two independent paths: the verify call made
// here while placing the booking, and the gateway webhook. Both record a
// PaymentConfirmation; a confirmation with no matching booking shows up in
// `unreconciled_payments`.
// =============================================================================

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::availability::{first_full_night, is_available, DateRange, InventoryMap};
use crate::booking::{build_booking, BookingError};
use crate::cache::{room_key, ROOM_TTL_SECS};
use crate::error::{AppError, AppResult};
use crate::flow::{BookingFlow, FlowEvent};
use crate::metrics;
use crate::models::{
    AvailabilityResponse, BookingRecord, BookingRequest, ConfirmationSource,
    InitializePaymentRequest, InitializePaymentResponse, PaymentConfirmation, Room,
};
use crate::payments::{
    is_valid_reference, verify_signature, PaymentError, WebhookEvent, CHARGE_SUCCESS, STATUS_SUCCESS,
};
use crate::pricing::{compute_cost, format_amount, to_minor_units, validate_rate};
use crate::store::StoreError;
use crate::AppState;

// =============================================================================
// CATALOG
// =============================================================================

/// Room by id, through the cache.
pub async fn load_room(state: &AppState, room_id: &str) -> AppResult<Room> {
    let key = room_key(room_id);
    if let Some(room) = state.cache.get_json::<Room>(&key).await {
        return Ok(room);
    }

    let start = Instant::now();
    let room = state
        .store
        .get_room(room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room not found: {}", room_id)))?;
    metrics::record_db_query("get_room", start.elapsed().as_secs_f64());

    state.cache.put_json(&key, &room, ROOM_TTL_SECS).await;
    Ok(room)
}

// =============================================================================
// QUOTE
// =============================================================================

/// Availability and price of one stay.
#[derive(Debug, Clone)]
pub struct Quote {
    pub room: Room,
    pub range: DateRange,
    pub nights: u32,
    pub booked: InventoryMap,
    pub available: bool,
    pub total_cost: f64,
}

impl Quote {
    /// First night without capacity, when unavailable.
    pub fn conflict(&self) -> Option<AppError> {
        if self.available {
            return None;
        }
        let day = first_full_night(&self.range, &self.booked, self.room.capacity())
            .unwrap_or(self.range.from);
        Some(
            BookingError::AvailabilityConflict {
                room_id: self.room.id.clone(),
                day: day.to_string(),
            }
            .into(),
        )
    }

    pub fn to_response(&self, currency: &str) -> AvailabilityResponse {
        AvailabilityResponse {
            room_id: self.room.id.clone(),
            check_in: self.range.from,
            check_out: self.range.to,
            available: self.available,
            nights: self.nights,
            nightly_rate: self.room.nightly_rate,
            total_cost: self.total_cost,
            display_total: format_amount(self.total_cost, currency),
            booked: self.booked.clone(),
        }
    }
}

/// Validate the range, then check it against the room's inventory and price it.
pub async fn quote(state: &AppState, room_id: &str, range: &DateRange) -> AppResult<Quote> {
    let nights = range.validate()?;
    let room = load_room(state, room_id).await?;
    let rate = validate_rate(room.nightly_rate)?;

    let start = Instant::now();
    let booked = state.store.inventory(&room.id, range).await?;
    metrics::record_db_query("inventory", start.elapsed().as_secs_f64());

    let available = is_available(range, &booked, room.capacity());
    metrics::record_availability_check(&room.id, available);

    tracing::debug!(
        room_id = %room.id,
        check_in = %range.from,
        check_out = %range.to,
        nights = nights,
        available = available,
        "Availability checked"
    );

    Ok(Quote {
        total_cost: compute_cost(nights, rate),
        room,
        range: *range,
        nights,
        booked,
        available,
    })
}

// =============================================================================
// PAYMENT INITIALIZATION
// =============================================================================

pub async fn initialize_payment(
    state: &AppState,
    user_id: &str,
    request: &InitializePaymentRequest,
) -> AppResult<InitializePaymentResponse> {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation(format!("invalid payer email: {:?}", request.email)));
    }

    let range = DateRange::new(request.check_in, request.check_out);
    let quote = quote(state, &request.room_id, &range).await?;
    if let Some(conflict) = quote.conflict() {
        return Err(conflict);
    }

    let amount = to_minor_units(quote.total_cost);
    let session = state.payments.initialize(amount, email).await?;

    tracing::info!(
        user_id = %user_id,
        room_id = %quote.room.id,
        reference = %session.reference,
        amount = amount,
        "Payment initialized"
    );

    Ok(InitializePaymentResponse {
        reference: session.reference,
        access_code: session.access_code,
        authorization_url: session.authorization_url,
        amount,
        display_total: format_amount(quote.total_cost, &state.config.currency),
    })
}

// =============================================================================
// BOOKING PLACEMENT
// =============================================================================

fn step(flow: &mut BookingFlow, event: FlowEvent) -> AppResult<()> {
    flow.apply(event)
        .map(|_| ())
        .map_err(|e| AppError::Internal(e.to_string()))
}

fn failure_reason(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) | AppError::NotFound(_) => "validation",
        AppError::AvailabilityConflict { .. } => "unavailable",
        AppError::Payment(_) | AppError::Gateway(_) => "payment",
        _ => "persistence",
    }
}

/// Place a booking for `user_id`. Returns the persisted record.
pub async fn place_booking(
    state: &AppState,
    user_id: &str,
    request: &BookingRequest,
) -> AppResult<BookingRecord> {
    let mut flow = BookingFlow::new(format!("{}/{}", request.room_id(), user_id));
    let result = run_booking_flow(state, user_id, request, &mut flow).await;
    match &result {
        Ok(record) => {
            metrics::record_booking_created(&record.room_id, record.payment_method.as_str());
            tracing::info!(
                booking_id = %record.id,
                user_id = %record.user_id,
                room_id = %record.room_id,
                nights = record.nights,
                total_cost = record.total_cost,
                payment_method = %record.payment_method,
                "Booking created"
            );
        }
        Err(e) => {
            metrics::record_booking_failure(failure_reason(e));
            tracing::debug!(room_id = %request.room_id(), state = %flow.state(), "Booking flow stopped");
        }
    }
    result
}

/// Drive `flow` through one booking attempt, leaving it in the state the
/// attempt reached.
pub async fn run_booking_flow(
    state: &AppState,
    user_id: &str,
    request: &BookingRequest,
    flow: &mut BookingFlow,
) -> AppResult<BookingRecord> {
    let range = request.range();

    step(flow, FlowEvent::CheckRequested)?;
    let quote = quote(state, request.room_id(), &range).await?;
    if let Some(conflict) = quote.conflict() {
        step(flow, FlowEvent::RangeUnavailable)?;
        return Err(conflict);
    }
    step(flow, FlowEvent::RangeAvailable)?;
    step(flow, FlowEvent::MethodChosen)?;

    let transaction_ref = match request.transaction_ref() {
        Some(reference) => {
            step(flow, FlowEvent::AwaitPayment)?;
            match confirm_payment(state, reference, to_minor_units(quote.total_cost)).await {
                Ok(confirmed) => {
                    step(flow, FlowEvent::PaymentSucceeded)?;
                    Some(confirmed)
                }
                Err(e) => {
                    step(flow, FlowEvent::PaymentCancelled)?;
                    return Err(e);
                }
            }
        }
        None => None,
    };

    let record = build_booking(
        user_id,
        &quote.room,
        &range,
        request.payment_method(),
        transaction_ref.clone(),
    )?;

    let start = Instant::now();
    let saved = state.store.append_booking(&record, quote.room.capacity()).await;
    metrics::record_db_query("append_booking", start.elapsed().as_secs_f64());

    match saved {
        Ok(saved) => {
            step(flow, FlowEvent::Persisted)?;
            Ok(saved)
        }
        Err(e) => {
            step(flow, FlowEvent::PersistFailed)?;
            match (&e, &transaction_ref) {
                // the payment already backs another booking
                (StoreError::DuplicateReference(_), _) | (_, None) => {}
                (_, Some(reference)) => tracing::error!(
                    reference = %reference,
                    user_id = %user_id,
                    room_id = %record.room_id,
                    error = %e,
                    "Paid booking was not saved; payment needs reconciliation"
                ),
            }
            Err(match e {
                StoreError::Unavailable { .. }
                | StoreError::RoomNotFound(_)
                | StoreError::DuplicateReference(_) => e.into(),
                other => BookingError::Persistence {
                    message: other.to_string(),
                    transaction_ref,
                }
                .into(),
            })
        }
    }
}

/// Verify a gateway transaction covers `expected` minor units in the
/// configured currency and record the confirmation. Returns the reference as
/// the gateway reported it. A reference can pay for one booking only.
async fn confirm_payment(state: &AppState, reference: &str, expected: u64) -> AppResult<String> {
    if !is_valid_reference(reference) {
        metrics::record_payment_verification("declined");
        return Err(PaymentError::InvalidReference(reference.to_string()).into());
    }

    if let Some(existing) = state.store.booking_by_transaction_ref(reference).await? {
        metrics::record_payment_verification("declined");
        return Err(AppError::Validation(format!(
            "transaction {} already paid for booking {}",
            reference, existing.id
        )));
    }

    let status = match state.payments.verify(reference).await {
        Ok(status) => status,
        Err(e) => {
            metrics::record_payment_verification("error");
            tracing::warn!(reference = %reference, error = %e, "Payment verification failed");
            return Err(e.into());
        }
    };

    let decline = |message: String| -> AppError {
        metrics::record_payment_verification("declined");
        tracing::warn!(reference = %reference, reason = %message, "Payment declined");
        BookingError::Payment(message).into()
    };

    if status.reference != reference {
        return Err(decline(format!(
            "gateway answered for transaction {} instead of {}",
            status.reference, reference
        )));
    }
    if !status.is_success() {
        return Err(decline(format!(
            "transaction {} has status {}",
            reference, status.status
        )));
    }
    if !status.is_in(&state.config.currency) {
        return Err(decline(format!(
            "transaction {} was paid in {}, expected {}",
            reference, status.currency, state.config.currency
        )));
    }
    if status.amount < expected {
        return Err(decline(format!(
            "transaction {} paid {} but the stay costs {}",
            reference, status.amount, expected
        )));
    }

    let confirmation = PaymentConfirmation {
        reference: status.reference.clone(),
        status: status.status.clone(),
        amount: status.amount,
        email: status.email.clone(),
        source: ConfirmationSource::Verify,
        received_at: Utc::now(),
    };
    if let Err(e) = state.store.record_payment(&confirmation).await {
        tracing::warn!(reference = %reference, error = %e, "Failed to record payment confirmation");
    }

    metrics::record_payment_verification("success");
    Ok(status.reference)
}

// =============================================================================
// WEBHOOK
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Event type we do not act on
    Ignored { event: String },
    /// Payment recorded and a booking carries the reference
    Matched { booking_id: Uuid },
    /// Payment recorded without a booking yet
    Unmatched { reference: String },
}

/// Authenticate and apply a gateway webhook delivery.
pub async fn handle_webhook(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<WebhookOutcome> {
    let authentic = signature
        .is_some_and(|signature| verify_signature(&state.config.paystack_secret_key, body, signature));
    if !authentic {
        metrics::record_webhook("unknown", "rejected");
        return Err(AppError::Unauthorized("invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("malformed webhook payload: {}", e)))?;

    if event.event != CHARGE_SUCCESS {
        metrics::record_webhook(&event.event, "ignored");
        tracing::debug!(event = %event.event, "Ignoring webhook event");
        return Ok(WebhookOutcome::Ignored { event: event.event });
    }

    let data = event.data;
    let confirmation = PaymentConfirmation {
        reference: data.reference.clone(),
        status: data.status.unwrap_or_else(|| STATUS_SUCCESS.to_string()),
        amount: data.amount,
        email: data.customer.and_then(|customer| customer.email),
        source: ConfirmationSource::Webhook,
        received_at: Utc::now(),
    };
    state.store.record_payment(&confirmation).await?;
    metrics::record_webhook(&event.event, "recorded");

    match state.store.booking_by_transaction_ref(&data.reference).await? {
        Some(booking) => {
            tracing::info!(
                reference = %data.reference,
                booking_id = %booking.id,
                "Webhook confirmed booking payment"
            );
            Ok(WebhookOutcome::Matched { booking_id: booking.id })
        }
        None => {
            tracing::warn!(
                reference = %data.reference,
                amount = data.amount,
                "Payment confirmed by webhook has no booking yet"
            );
            Ok(WebhookOutcome::Unmatched { reference: data.reference })
        }
    }
}

// =============================================================================
// RECONCILIATION
// =============================================================================

pub async fn unreconciled_payments(state: &AppState) -> AppResult<Vec<PaymentConfirmation>> {
    let payments = state.store.unreconciled_payments().await?;
    metrics::set_unreconciled_payments(payments.len());
    Ok(payments)
}
