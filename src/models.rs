// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures shared by the store, the checkout flow and the HTTP API.
//
// - Room / BookingRecord / PaymentConfirmation are persisted entities
// - *Request / *Response structs define the JSON API shape
// =============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::availability::{DateRange, InventoryMap};

// =============================================================================
// ROOM
// =============================================================================
/// A bookable room type from the catalog. Read-only for the booking flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Room {
    /// Slug identifier, e.g. "deluxe-king"
    pub id: String,

    pub name: String,

    pub description: String,

    /// Price of one night, in major currency units
    pub nightly_rate: f64,

    /// Maximum simultaneous bookings of this room per day
    pub capacity: i32,

    /// Guests allowed in one booking
    pub max_guests: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Room {
    /// Capacity as an unsigned count; a corrupt negative value reads as 0,
    /// which makes every range unavailable.
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.capacity).unwrap_or(0)
    }
}

// =============================================================================
// PAYMENT METHOD & BOOKING STATUS
// =============================================================================

/// How a booking is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Card payment through the Paystack gateway
    Paystack,
    /// Reservation settled at the front desk
    PayAtProperty,
}

impl PaymentMethod {
    /// Whether a gateway transaction must confirm the booking.
    pub fn requires_gateway(self) -> bool {
        matches!(self, PaymentMethod::Paystack)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Paystack => "Paystack",
            PaymentMethod::PayAtProperty => "PayAtProperty",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Paystack" => Ok(PaymentMethod::Paystack),
            "PayAtProperty" => Ok(PaymentMethod::PayAtProperty),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Paid through the gateway
    Confirmed,
    /// Held for payment at the property
    Reserved,
}

impl BookingStatus {
    pub fn for_method(method: PaymentMethod) -> Self {
        if method.requires_gateway() {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Reserved
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Reserved => "reserved",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "reserved" => Ok(BookingStatus::Reserved),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

// =============================================================================
// BOOKING RECORD
// =============================================================================
/// A persisted booking. Immutable once created, except `room_number`,
/// which staff assign later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: Uuid,

    pub room_id: String,

    pub user_id: String,

    pub check_in: NaiveDate,

    pub check_out: NaiveDate,

    /// Occupied nights, always >= 1
    pub nights: u32,

    /// nights x nightly rate at creation time
    pub total_cost: f64,

    pub payment_method: PaymentMethod,

    /// Gateway reference; only present for gateway-paid bookings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_ref: Option<String>,

    pub status: BookingStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_number: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.check_in, self.check_out)
    }
}

// =============================================================================
// PAYMENT CONFIRMATION
// =============================================================================

/// Which path told us about a successful payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    /// Server-side verify call made while placing the booking
    Verify,
    /// Asynchronous gateway webhook
    Webhook,
}

impl ConfirmationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationSource::Verify => "verify",
            ConfirmationSource::Webhook => "webhook",
        }
    }
}

impl FromStr for ConfirmationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verify" => Ok(ConfirmationSource::Verify),
            "webhook" => Ok(ConfirmationSource::Webhook),
            other => Err(format!("unknown confirmation source: {}", other)),
        }
    }
}

/// A gateway-confirmed payment, kept so money received without a matching
/// booking can be reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub reference: String,
    pub status: String,
    /// Minor currency units
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub source: ConfirmationSource,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================

/// Stay selection shared by every booking request variant.
///
/// # Example JSON
/// ```json
/// { "room_id": "deluxe-king", "check_in": "2024-08-15", "check_out": "2024-08-18" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StayRequest {
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRequest {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.check_in, self.check_out)
    }
}

/// Stay paid through the gateway; carries the transaction to verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaidStayRequest {
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub transaction_ref: String,
}

/// Booking request, tagged by `payment_method`.
///
/// ```json
/// { "payment_method": "PayAtProperty", "room_id": "...", "check_in": "...", "check_out": "..." }
/// { "payment_method": "Paystack", "room_id": "...", "check_in": "...", "check_out": "...", "transaction_ref": "T123" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "payment_method")]
pub enum BookingRequest {
    Paystack(PaidStayRequest),
    PayAtProperty(StayRequest),
}

impl BookingRequest {
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            BookingRequest::Paystack(_) => PaymentMethod::Paystack,
            BookingRequest::PayAtProperty(_) => PaymentMethod::PayAtProperty,
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            BookingRequest::Paystack(req) => &req.room_id,
            BookingRequest::PayAtProperty(req) => &req.room_id,
        }
    }

    pub fn range(&self) -> DateRange {
        match self {
            BookingRequest::Paystack(req) => DateRange::new(req.check_in, req.check_out),
            BookingRequest::PayAtProperty(req) => req.range(),
        }
    }

    pub fn transaction_ref(&self) -> Option<&str> {
        match self {
            BookingRequest::Paystack(req) => Some(&req.transaction_ref),
            BookingRequest::PayAtProperty(_) => None,
        }
    }
}

/// Body of `POST /api/v1/rooms/:id/availability`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// Availability quote for one room and stay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub available: bool,
    pub nights: u32,
    pub nightly_rate: f64,
    pub total_cost: f64,
    pub display_total: String,
    /// Booked counts for the occupied nights
    pub booked: InventoryMap,
}

/// Body of `POST /api/v1/payments/initialize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializePaymentRequest {
    pub room_id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializePaymentResponse {
    pub reference: String,
    pub access_code: String,
    pub authorization_url: String,
    /// Minor currency units charged
    pub amount: u64,
    pub display_total: String,
}

/// Body of `PUT /api/v1/admin/bookings/:id/room-number`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRoomNumberRequest {
    pub room_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingRecord>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResponse {
    pub payments: Vec<PaymentConfirmation>,
    pub total: usize,
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub store: bool,
    /// `None` when no cache is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<bool>,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details.into()),
        }
    }
}
