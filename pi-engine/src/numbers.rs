//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert a count to f64 while allowing precision loss in a single location.
#[must_use]
pub fn count_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert a seed to the signed 32-bit representation used in persisted tables.
#[must_use]
pub fn seed_to_i32(seed: u32) -> Option<i32> {
    cast::<u32, i32>(seed)
}

/// Convert a persisted seed back, rejecting negative or out-of-range values.
#[must_use]
pub fn seed_from_i64(value: i64) -> Option<u32> {
    cast::<i64, u32>(value)
}

/// Parse a digit run into f64, returning `None` when it does not fit.
#[must_use]
pub fn digits_to_f64(digits: &str) -> Option<f64> {
    digits
        .parse::<u64>()
        .ok()
        .and_then(|value| cast::<u64, f64>(value))
}

/// Round half away from zero at the given number of decimal digits.
///
/// Non-finite values are returned unchanged.
#[must_use]
pub fn round_to_digits(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let exponent = cast::<u32, i32>(digits.min(15)).unwrap_or(15);
    let factor = 10_f64.powi(exponent);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_uses_half_away_from_zero() {
        assert!((round_to_digits(2.0 / 3.0, 3) - 0.667).abs() < f64::EPSILON);
        assert!((round_to_digits(0.123_455, 5) - 0.123_46).abs() < 1e-12);
        assert!((round_to_digits(-0.5, 0) + 1.0).abs() < f64::EPSILON);
        assert!(round_to_digits(f64::NAN, 3).is_nan());
    }

    #[test]
    fn seeds_round_trip_through_signed_storage() {
        assert_eq!(seed_to_i32(99_999), Some(99_999));
        assert_eq!(seed_to_i32(u32::MAX), None);
        assert_eq!(seed_from_i64(-1), None);
        assert_eq!(seed_from_i64(42), Some(42));
    }

    #[test]
    fn digits_parse_into_floats() {
        assert_eq!(digits_to_f64("2299932"), Some(2_299_932.0));
        assert_eq!(digits_to_f64("abc"), None);
        assert_eq!(count_to_f64(3), 3.0);
    }
}
