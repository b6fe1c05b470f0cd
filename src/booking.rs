// =============================================================================
// BOOKING MODULE
// =============================================================================
// Domain error taxonomy and the booking request builder.
//
// The builder is pure: it turns a validated stay into a BookingRecord. The
// caller persists the record and triggers any notification.
// =============================================================================

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::availability::DateRange;
use crate::models::{BookingRecord, BookingStatus, PaymentMethod, Room};
use crate::pricing::{compute_cost, validate_rate};

// =============================================================================
// ERROR TAXONOMY
// =============================================================================
#[derive(Debug, Error)]
pub enum BookingError {
    /// Bad date range, non-positive nights, malformed input.
    /// Shown to the user, never persisted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Capacity exhausted on at least one occupied night
    #[error("Room {room_id} is fully booked on {day}")]
    AvailabilityConflict { room_id: String, day: String },

    /// Gateway failure, cancellation or non-success status. No record is created.
    #[error("Payment failed: {0}")]
    Payment(String),

    /// Booking write failed. When `transaction_ref` is set money has already
    /// moved and the payment must be reconciled.
    #[error("Failed to persist booking: {message}")]
    Persistence {
        message: String,
        transaction_ref: Option<String>,
    },
}

// =============================================================================
// BOOKING REQUEST BUILDER
// =============================================================================
/// Assemble a booking record for `user_id` staying in `room` over `range`.
///
/// Preconditions: availability has been confirmed for the range. Fails with
/// `BookingError::Validation` when the range has no nights, the room rate is
/// not positive, or a gateway method comes without a transaction reference.
/// A reference supplied for a pay-at-property reservation is dropped.
pub fn build_booking(
    user_id: &str,
    room: &Room,
    range: &DateRange,
    payment_method: PaymentMethod,
    transaction_ref: Option<String>,
) -> Result<BookingRecord, BookingError> {
    if user_id.trim().is_empty() {
        return Err(BookingError::Validation("user reference is required".to_string()));
    }

    let nights = range.validate()?;
    let rate = validate_rate(room.nightly_rate)?;

    let transaction_ref = if payment_method.requires_gateway() {
        match transaction_ref {
            Some(reference) if !reference.trim().is_empty() => Some(reference),
            _ => {
                return Err(BookingError::Validation(format!(
                    "{} bookings require a transaction reference",
                    payment_method
                )))
            }
        }
    } else {
        None
    };

    Ok(BookingRecord {
        id: Uuid::new_v4(),
        room_id: room.id.clone(),
        user_id: user_id.to_string(),
        check_in: range.from,
        check_out: range.to,
        nights,
        total_cost: compute_cost(nights, rate),
        payment_method,
        transaction_ref,
        status: BookingStatus::for_method(payment_method),
        room_number: None,
        created_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn room(rate: f64) -> Room {
        Room {
            id: "garden-view".to_string(),
            name: "Garden View".to_string(),
            description: "Queen bed facing the garden".to_string(),
            nightly_rate: rate,
            capacity: 2,
            max_guests: 2,
            image_url: None,
        }
    }

    fn range(from: &str, to: &str) -> DateRange {
        DateRange::new(
            from.parse::<NaiveDate>().unwrap(),
            to.parse::<NaiveDate>().unwrap(),
        )
    }

    #[test]
    fn three_nights_at_100_cost_300_with_reference() {
        let record = build_booking(
            "user-1",
            &room(100.0),
            &range("2024-08-15", "2024-08-18"),
            PaymentMethod::Paystack,
            Some("T123".to_string()),
        )
        .unwrap();

        assert_eq!(record.nights, 3);
        assert_eq!(record.total_cost, 300.0);
        assert_eq!(record.transaction_ref.as_deref(), Some("T123"));
        assert_eq!(record.status, BookingStatus::Confirmed);
        assert_eq!(record.room_number, None);
    }

    #[test]
    fn reservation_drops_transaction_reference() {
        let record = build_booking(
            "user-1",
            &room(100.0),
            &range("2024-08-15", "2024-08-18"),
            PaymentMethod::PayAtProperty,
            Some("T123".to_string()),
        )
        .unwrap();

        assert_eq!(record.transaction_ref, None);
        assert_eq!(record.status, BookingStatus::Reserved);
        assert_eq!(record.total_cost, 300.0);
    }

    #[test]
    fn zero_nights_is_a_validation_error() {
        let result = build_booking(
            "user-1",
            &room(100.0),
            &range("2024-08-15", "2024-08-15"),
            PaymentMethod::PayAtProperty,
            None,
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let result = build_booking(
            "user-1",
            &room(100.0),
            &range("2024-08-18", "2024-08-15"),
            PaymentMethod::Paystack,
            Some("T1".to_string()),
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn gateway_booking_needs_a_reference() {
        for reference in [None, Some("  ".to_string())] {
            let result = build_booking(
                "user-1",
                &room(100.0),
                &range("2024-08-15", "2024-08-16"),
                PaymentMethod::Paystack,
                reference,
            );
            assert!(matches!(result, Err(BookingError::Validation(_))));
        }
    }

    #[test]
    fn non_positive_rate_never_yields_a_record() {
        let result = build_booking(
            "user-1",
            &room(-50.0),
            &range("2024-08-15", "2024-08-16"),
            PaymentMethod::PayAtProperty,
            None,
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[test]
    fn missing_user_is_rejected() {
        let result = build_booking(
            "",
            &room(100.0),
            &range("2024-08-15", "2024-08-16"),
            PaymentMethod::PayAtProperty,
            None,
        );
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }
}
