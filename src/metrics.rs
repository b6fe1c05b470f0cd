// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics for the booking service.
//
// - Counter: requests, availability checks, bookings, payment outcomes
// - Gauge: unreconciled payments
// - Histogram: request, database and Redis latency
// =============================================================================

use std::time::Instant;

use anyhow::Result;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================

/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Labels: room_id, result (available/unavailable)
pub const AVAILABILITY_CHECKS_TOTAL: &str = "booking_availability_checks_total";

/// Labels: room_id, payment_method
pub const BOOKINGS_CREATED_TOTAL: &str = "bookings_created_total";

/// Labels: reason (validation/unavailable/payment/persistence)
pub const BOOKING_FAILURES_TOTAL: &str = "booking_failures_total";

/// Labels: outcome (success/declined/error)
pub const PAYMENT_VERIFICATIONS_TOTAL: &str = "payment_verifications_total";

/// Labels: event, outcome (recorded/ignored/rejected)
pub const PAYMENT_WEBHOOKS_TOTAL: &str = "payment_webhooks_total";

/// Successful payments without a booking record
pub const UNRECONCILED_PAYMENTS: &str = "unreconciled_payments";

/// Labels: operation
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Labels: operation (get/set)
pub const REDIS_OPERATION_DURATION_SECONDS: &str = "redis_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================
/// Install the global Prometheus recorder and return its render handle.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let latency_buckets = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(HTTP_REQUEST_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(DB_QUERY_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .set_buckets_for_metric(
            Matcher::Full(REDIS_OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(AVAILABILITY_CHECKS_TOTAL, "Availability checks by result");
    describe_counter!(BOOKINGS_CREATED_TOTAL, "Bookings persisted, by payment method");
    describe_counter!(BOOKING_FAILURES_TOTAL, "Booking attempts that did not produce a record");
    describe_counter!(PAYMENT_VERIFICATIONS_TOTAL, "Gateway transaction verifications by outcome");
    describe_counter!(PAYMENT_WEBHOOKS_TOTAL, "Gateway webhook deliveries by event and outcome");
    describe_gauge!(UNRECONCILED_PAYMENTS, "Successful payments with no booking record");
    describe_histogram!(DB_QUERY_DURATION_SECONDS, "Store operation latency in seconds");
    describe_histogram!(REDIS_OPERATION_DURATION_SECONDS, "Redis operation latency in seconds");

    Ok(handle)
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Middleware: count and time every response, errors included. Routes are
/// labelled by their pattern; requests no route matched by "unmatched".
pub async fn track_http(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

pub fn record_availability_check(room_id: &str, available: bool) {
    let result = if available { "available" } else { "unavailable" };
    counter!(
        AVAILABILITY_CHECKS_TOTAL,
        "room_id" => room_id.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_booking_created(room_id: &str, payment_method: &str) {
    counter!(
        BOOKINGS_CREATED_TOTAL,
        "room_id" => room_id.to_string(),
        "payment_method" => payment_method.to_string()
    )
    .increment(1);
}

/// `reason`: validation, unavailable, payment, persistence
pub fn record_booking_failure(reason: &'static str) {
    counter!(BOOKING_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// `outcome`: success, declined, error
pub fn record_payment_verification(outcome: &'static str) {
    counter!(PAYMENT_VERIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// `outcome`: recorded, ignored, rejected
pub fn record_webhook(event: &str, outcome: &'static str) {
    counter!(
        PAYMENT_WEBHOOKS_TOTAL,
        "event" => event.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_unreconciled_payments(count: usize) {
    gauge!(UNRECONCILED_PAYMENTS).set(count as f64);
}

pub fn record_db_query(operation: &'static str, duration_secs: f64) {
    histogram!(DB_QUERY_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}

pub fn record_redis_operation(operation: &'static str, duration_secs: f64) {
    histogram!(REDIS_OPERATION_DURATION_SECONDS, "operation" => operation).record(duration_secs);
}
