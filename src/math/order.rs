//! Order-statistic transform for knot x-locations.
//!
//! Given `n` independent uniform draws `u_1..u_n`, the recurrence
//!
//! ```text
//! x_0 = x_min
//! x_i = x_{i-1} + (x_max - x_{i-1}) * (1 - u_i^(1/(n - i + 1)))
//! ```
//!
//! produces the order statistics of `n` uniforms on `(x_min, x_max)` directly
//! in increasing order (arXiv:1506.00171). Each step samples the minimum of the
//! `n - i + 1` uniforms still to be placed in `[x_{i-1}, x_max]`, so no sort is
//! needed and the map from the unit hypercube is a bijection.

use crate::domain::KnotBounds;
use crate::error::FlexError;

/// One step of the recurrence.
///
/// `remaining` is the number of knots still to be placed including this one
/// (`n - i + 1`); it must be at least 1.
#[inline]
pub fn next_location(previous: f64, upper: f64, u: f64, remaining: usize) -> f64 {
    let exponent = 1.0 / remaining.max(1) as f64;
    previous + (upper - previous) * (1.0 - u.powf(exponent))
}

/// Map ordering draws to increasing interior knot x-locations.
///
/// The output has the same length as `draws`. Boundary draws are accepted:
/// `u = 0` lands on `bounds.max` and `u = 1` repeats the previous location.
/// Those coincident knots surface as `DegenerateKnotSet` when the knot set is
/// assembled.
pub fn order_knot_locations(bounds: KnotBounds, draws: &[f64]) -> Result<Vec<f64>, FlexError> {
    let n = draws.len();
    let mut out = Vec::with_capacity(n);
    let mut previous = bounds.min;

    for (idx, &u) in draws.iter().enumerate() {
        if !(u.is_finite() && (0.0..=1.0).contains(&u)) {
            return Err(FlexError::InvalidDraw {
                index: idx + 1,
                value: u,
            });
        }
        let x = next_location(previous, bounds.max, u, n - idx);
        out.push(x);
        previous = x;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Knot, KnotSet};
    use rand::prelude::*;
    use rand::rngs::StdRng;

    #[test]
    fn single_knot_midpoint() {
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let xs = order_knot_locations(bounds, &[0.5]).unwrap();
        assert_eq!(xs.len(), 1);
        assert!((xs[0] - 5.0).abs() < 1e-12, "expected 5, got {}", xs[0]);
    }

    #[test]
    fn zero_order_yields_no_interior_knots() {
        let bounds = KnotBounds::new(-3.0, 3.0).unwrap();
        assert!(order_knot_locations(bounds, &[]).unwrap().is_empty());
    }

    #[test]
    fn random_draws_are_strictly_increasing_and_inside_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..12 {
            let bounds = KnotBounds::new(50.0, 100.0).unwrap();
            for _ in 0..200 {
                let draws: Vec<f64> = (0..n).map(|_| rng.gen_range(1e-6..1.0 - 1e-6)).collect();
                let xs = order_knot_locations(bounds, &draws).unwrap();
                let mut prev = bounds.min;
                for &x in &xs {
                    assert!(x > prev, "not increasing: {x} after {prev} for {draws:?}");
                    assert!(x < bounds.max, "outside bounds: {x}");
                    prev = x;
                }
            }
        }
    }

    #[test]
    fn matches_sorted_uniforms_for_known_draws() {
        // With n = 2: x_1 = 10*(1 - sqrt(u_1)), x_2 = x_1 + (10 - x_1)*(1 - u_2).
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let xs = order_knot_locations(bounds, &[0.25, 0.5]).unwrap();
        assert!((xs[0] - 5.0).abs() < 1e-12);
        assert!((xs[1] - 7.5).abs() < 1e-12);
    }

    #[test]
    fn unit_draw_produces_degenerate_knot_set() {
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let xs = order_knot_locations(bounds, &[0.5, 1.0]).unwrap();
        assert_eq!(xs[0], xs[1]);

        let interior: Vec<Knot> = xs.iter().map(|&x| Knot { x, y: 0.0 }).collect();
        let err = KnotSet::from_parts(bounds, 0.0, &interior, 0.0).unwrap_err();
        assert!(matches!(err, FlexError::DegenerateKnotSet { index: 2, .. }));
    }

    #[test]
    fn rejects_draws_outside_unit_interval() {
        let bounds = KnotBounds::new(0.0, 1.0).unwrap();
        let err = order_knot_locations(bounds, &[0.2, 1.5]).unwrap_err();
        assert_eq!(err, FlexError::InvalidDraw { index: 2, value: 1.5 });
        assert!(order_knot_locations(bounds, &[f64::NAN]).is_err());
    }

    #[test]
    fn step_function_composes_to_full_transform() {
        let bounds = KnotBounds::new(1.0, 4.0).unwrap();
        let draws = [0.9, 0.1, 0.6];
        let full = order_knot_locations(bounds, &draws).unwrap();

        let mut prev = bounds.min;
        for (i, &u) in draws.iter().enumerate() {
            prev = next_location(prev, bounds.max, u, draws.len() - i);
            assert_eq!(prev.to_bits(), full[i].to_bits());
        }
    }
}
