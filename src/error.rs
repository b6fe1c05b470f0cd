// =============================================================================
// ERROR MODULE
// =============================================================================
// HTTP-facing error type. Domain, store and gateway errors convert into
// AppError, which renders as a JSON ErrorResponse with a matching status.
//
// Internal details (SQL errors, gateway bodies) are logged, not returned.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::booking::BookingError;
use crate::models::ErrorResponse;
use crate::payments::PaymentError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // CLIENT ERRORS
    // -------------------------------------------------------------------------
    /// Bad date range, non-positive nights, malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Capacity exhausted for the requested nights
    #[error("Room {room_id} is fully booked on {day}")]
    AvailabilityConflict { room_id: String, day: String },

    /// Payment declined, cancelled or not covering the stay
    #[error("Payment failed: {0}")]
    Payment(String),

    // -------------------------------------------------------------------------
    // SERVER ERRORS
    // -------------------------------------------------------------------------
    /// Gateway unreachable or answered garbage
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Booking write failed; `transaction_ref` set means a paid booking is
    /// missing and needs reconciliation
    #[error("Failed to persist booking: {message}")]
    Persistence {
        message: String,
        transaction_ref: Option<String>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),

            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),

            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None),

            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None),

            AppError::AvailabilityConflict { room_id, day } => (
                StatusCode::CONFLICT,
                "AVAILABILITY_CONFLICT",
                format!("Room {} is fully booked on {}. Please choose other dates.", room_id, day),
                None,
            ),

            AppError::Payment(msg) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_ERROR", msg.clone(), None),

            AppError::Gateway(_) => (
                StatusCode::BAD_GATEWAY,
                "BAD_GATEWAY",
                "The payment provider could not be reached".to_string(),
                None,
            ),

            // The reference goes back to the client so support can match the
            // payment by hand if reconciliation has not caught it yet.
            AppError::Persistence { transaction_ref, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                "Your booking could not be saved".to_string(),
                transaction_ref.as_ref().map(|r| format!("payment reference: {}", r)),
            ),

            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),

            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
        };

        if status.is_server_error() {
            tracing::error!(error_code = error_code, error = %self, "Request failed");
        } else {
            tracing::warn!(error_code = error_code, message = %message, "Request rejected");
        }

        let body = match details {
            Some(details) => ErrorResponse::with_details(error_code, message, details),
            None => ErrorResponse::new(error_code, message),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

// =============================================================================
// CONVERSION HELPERS
// =============================================================================

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::Validation(msg),
            BookingError::AvailabilityConflict { room_id, day } => {
                AppError::AvailabilityConflict { room_id, day }
            }
            BookingError::Payment(msg) => AppError::Payment(msg),
            BookingError::Persistence {
                message,
                transaction_ref,
            } => AppError::Persistence {
                message,
                transaction_ref,
            },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RoomNotFound(id) => AppError::NotFound(format!("Room not found: {}", id)),
            StoreError::BookingNotFound(id) => AppError::NotFound(format!("Booking not found: {}", id)),
            StoreError::Unavailable { room_id, day } => AppError::AvailabilityConflict { room_id, day },
            StoreError::DuplicateReference(reference) => AppError::Validation(format!(
                "transaction {} already paid for another booking",
                reference
            )),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Rejected { message, .. } => AppError::Payment(message),
            PaymentError::InvalidReference(reference) => {
                AppError::Validation(format!("invalid transaction reference: {:?}", reference))
            }
            other => AppError::Gateway(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(status_of(BookingError::Validation("x".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(
                BookingError::AvailabilityConflict {
                    room_id: "r".into(),
                    day: "2024-08-15".into()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(BookingError::Payment("declined".into()).into()), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            status_of(
                BookingError::Persistence {
                    message: "down".into(),
                    transaction_ref: Some("T1".into())
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_and_gateway_errors_convert() {
        assert_eq!(status_of(StoreError::RoomNotFound("x".into()).into()), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(
                StoreError::Unavailable {
                    room_id: "r".into(),
                    day: "d".into()
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(StoreError::DuplicateReference("T1".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PaymentError::InvalidReference("../T1".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(PaymentError::RequestFailed("timeout".into()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(
                PaymentError::Rejected {
                    status: 400,
                    message: "not found".into()
                }
                .into()
            ),
            StatusCode::PAYMENT_REQUIRED
        );
    }
}
