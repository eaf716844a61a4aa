/// Round to two decimal places, half away from zero.
///
/// The input is nudged by one machine epsilon in its own direction before
/// scaling, so values such as `1.005` (stored as `1.00499999...`) land on the
/// expected side. Every distance, liter, consumption and tank figure the
/// ledger persists goes through this function, which keeps repeated sums
/// from drifting.
///
/// Non-finite input is returned unchanged.
///
/// # Examples
///
/// ```
/// use fleetfold::round2;
///
/// assert_eq!(round2(1.005), 1.01);
/// assert_eq!(round2(-2.675), -2.68);
/// assert_eq!(round2(0.1 + 0.2), 0.3);
/// assert_eq!(round2(round2(6.666)), round2(6.666));
/// ```
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let biased = value + f64::EPSILON.copysign(value);
    (biased * 100.0).round() / 100.0
}

/// Divide, yielding `0.0` instead of infinity or NaN for a zero denominator.
pub(crate) fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(2.345), 2.35);
        assert_eq!(round2(-2.345), -2.35);
        assert_eq!(round2(7.5), 7.5);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn absorbs_representation_error() {
        let mut total = 0.0;
        for _ in 0..10 {
            total = round2(total + 0.1);
        }
        assert_eq!(total, 1.0);
    }

    #[test]
    fn non_finite_passthrough() {
        assert!(round2(f64::NAN).is_nan());
        assert_eq!(round2(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn ratio_of_zero_denominator_is_zero() {
        assert_eq!(ratio(15.0, 0.0), 0.0);
        assert_eq!(ratio(15.0, 200.0), 0.075);
    }
}
