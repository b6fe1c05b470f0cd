// =============================================================================
// PRICING MODULE
// =============================================================================
// Stay cost is nights x nightly rate, kept at full precision. Rounding only
// happens when an amount is shown to a person or handed to the gateway.
// =============================================================================

use crate::booking::BookingError;

/// Total cost of a stay. Callers validate `nights >= 1` and `rate > 0`.
pub fn compute_cost(nights: u32, nightly_rate: f64) -> f64 {
    f64::from(nights) * nightly_rate
}

/// Rejects rates that are zero, negative or not finite.
pub fn validate_rate(nightly_rate: f64) -> Result<f64, BookingError> {
    if nightly_rate.is_finite() && nightly_rate > 0.0 {
        Ok(nightly_rate)
    } else {
        Err(BookingError::Validation(format!(
            "nightly rate must be a positive amount, got {}",
            nightly_rate
        )))
    }
}

/// Amount in the gateway's minor unit (kobo for NGN), rounded to nearest.
pub fn to_minor_units(amount: f64) -> u64 {
    // negative and NaN saturate to 0 on the cast
    (amount * 100.0).round() as u64
}

/// Human-readable amount with two decimals, e.g. `NGN 300.00`.
pub fn format_amount(amount: f64, currency: &str) -> String {
    format!("{} {:.2}", currency, amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_nights_times_rate() {
        assert_eq!(compute_cost(3, 100.0), 300.0);
        for nights in 1..=30u32 {
            for rate in [1.0, 49.99, 100.0, 25_000.5] {
                assert_eq!(compute_cost(nights, rate), f64::from(nights) * rate);
            }
        }
    }

    #[test]
    fn cost_keeps_full_precision() {
        let cost = compute_cost(3, 33.333);
        assert!((cost - 99.999).abs() < 1e-9);
        assert_eq!(format_amount(cost, "NGN"), "NGN 100.00");
    }

    #[test]
    fn invalid_rates_are_rejected() {
        assert!(validate_rate(120.0).is_ok());
        for rate in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(validate_rate(rate), Err(BookingError::Validation(_))));
        }
    }

    #[test]
    fn minor_units_round_to_nearest() {
        assert_eq!(to_minor_units(300.0), 30_000);
        assert_eq!(to_minor_units(99.999), 10_000);
        assert_eq!(to_minor_units(0.004), 0);
    }
}
