//! Scalar helpers exposed as the `math` module.

use rand::Rng;
use scriptbridge::{BridgeError, BridgeResult};

/// Degrees to radians.
pub fn radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

/// Radians to degrees.
pub fn degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// `a * (1 - t) + b * t`, with `t` unclamped. Returns `a` at `t == 0` and
/// `b` at `t == 1` exactly.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

/// Limit `value` to `[min, max]`.
pub fn clamp(value: f64, min: f64, max: f64) -> BridgeResult<f64> {
    if min.is_nan() || max.is_nan() || min > max {
        return Err(BridgeError::domain(format!(
            "clamp bounds are inverted: min {min} > max {max}"
        )));
    }
    Ok(value.clamp(min, max))
}

/// Uniform sample from `[low, high)`; `low` when the bounds are equal.
pub fn random(rng: &mut impl Rng, low: f64, high: f64) -> BridgeResult<f64> {
    if !(high - low).is_finite() {
        return Err(BridgeError::domain("random bounds must be finite"));
    }
    if low > high {
        return Err(BridgeError::domain(format!(
            "random bounds are inverted: {low} > {high}"
        )));
    }
    if low == high {
        return Ok(low);
    }
    Ok(rng.gen_range(low..high))
}

/// Uniform integer from `[min, max]`.
pub fn random_int(rng: &mut impl Rng, min: i64, max: i64) -> BridgeResult<i64> {
    if min > max {
        return Err(BridgeError::domain(format!(
            "random_int bounds are inverted: {min} > {max}"
        )));
    }
    Ok(rng.gen_range(min..=max))
}

/// Interpret a number as an integer bound, rejecting fractions.
pub(crate) fn integer(value: f64, what: &str) -> BridgeResult<i64> {
    // 2^53: beyond this, f64 no longer represents every integer.
    const LIMIT: f64 = 9_007_199_254_740_992.0;
    if value.fract() != 0.0 || value.abs() > LIMIT {
        return Err(BridgeError::domain(format!("{what} must be an integer, got {value}")));
    }
    Ok(value as i64)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_angle_conversion() {
        assert!((radians(180.0) - std::f64::consts::PI).abs() < 1e-15);
        assert_eq!(radians(0.0), 0.0);
        assert!((degrees(radians(45.0)) - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_lerp_endpoints_and_extrapolation() {
        assert_eq!(lerp(2.0, 10.0, 0.0), 2.0);
        assert_eq!(lerp(2.0, 10.0, 1.0), 10.0);
        assert_eq!(lerp(2.0, 10.0, 0.5), 6.0);
        assert_eq!(lerp(0.0, 10.0, 2.0), 20.0);
        assert_eq!(lerp(0.2, -0.37, 1.0), -0.37);
        assert_eq!(lerp(0.2, -0.37, 0.0), 0.2);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5.0, 0.0, 1.0).unwrap(), 1.0);
        assert_eq!(clamp(-5.0, 0.0, 1.0).unwrap(), 0.0);
        assert!(matches!(clamp(0.5, 1.0, 0.0), Err(BridgeError::Domain(_))));
    }

    #[test]
    fn test_random_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let x = random(&mut rng, 1.0, 10.0).unwrap();
            assert!((1.0..10.0).contains(&x));
        }
        assert_eq!(random(&mut rng, 3.0, 3.0).unwrap(), 3.0);
        assert!(matches!(
            random(&mut rng, 10.0, 1.0),
            Err(BridgeError::Domain(_))
        ));
        assert!(matches!(
            random(&mut rng, f64::NEG_INFINITY, 1.0),
            Err(BridgeError::Domain(_))
        ));
    }

    #[test]
    fn test_random_is_reproducible_with_a_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(
                random(&mut a, 0.0, 1.0).unwrap(),
                random(&mut b, 0.0, 1.0).unwrap()
            );
        }
    }

    #[test]
    fn test_random_int_is_inclusive() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let n = random_int(&mut rng, 1, 3).unwrap();
            seen[(n - 1) as usize] = true;
        }
        assert_eq!(seen, [true; 3]);
        assert!(random_int(&mut rng, 2, 1).is_err());
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(integer(4.0, "min").unwrap(), 4);
        assert!(integer(4.5, "min").is_err());
    }
}
