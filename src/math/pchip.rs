//! Monotone piecewise cubic Hermite interpolation (PCHIP).
//!
//! Two layers:
//!
//! - a slice-level buffer boundary (`fit_slopes`, `evaluate_slices`): the
//!   caller owns every buffer and all lengths are checked on entry
//! - a typed layer over [`KnotSet`] (`fit`, `evaluate`, [`Pchip`])
//!
//! Slopes follow Fritsch-Butland / Brodlie (as in SLATEC `PCHIM`):
//! - interior: zero at local extrema, else a weighted harmonic mean of the
//!   adjacent secants
//! - endpoints: three-point one-sided estimate, clipped so it never has the
//!   wrong sign and never exceeds `3x` the adjacent secant near an extremum
//!
//! Queries outside the knot range return the nearest endpoint value.

use crate::domain::KnotSet;
use crate::error::FlexError;

/// Derivative estimates at each knot, produced by [`fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct DerivativeSet {
    d: Vec<f64>,
}

impl DerivativeSet {
    pub fn as_slice(&self) -> &[f64] {
        &self.d
    }

    pub fn len(&self) -> usize {
        self.d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.d.is_empty()
    }
}

/// Compute PCHIP slopes for `(x, y)` into `d`.
///
/// `x` must be strictly increasing with at least two entries; `y` and `d`
/// must match its length.
pub fn fit_slopes(x: &[f64], y: &[f64], d: &mut [f64]) -> Result<(), FlexError> {
    let n = x.len();
    if n < 2 {
        return Err(FlexError::TooFewKnots { actual: n });
    }
    check_len("knot y-values", n, y.len())?;
    check_len("derivative buffer", n, d.len())?;

    for i in 1..n {
        if x[i] <= x[i - 1] {
            return Err(FlexError::DegenerateKnotSet {
                index: i,
                previous: x[i - 1],
                current: x[i],
            });
        }
    }

    let h = |k: usize| x[k + 1] - x[k];
    let del = |k: usize| (y[k + 1] - y[k]) / (x[k + 1] - x[k]);

    if n == 2 {
        let s = del(0);
        d[0] = s;
        d[1] = s;
        return Ok(());
    }

    for k in 1..n - 1 {
        let s1 = del(k - 1);
        let s2 = del(k);
        d[k] = if s1 == 0.0 || s2 == 0.0 || s1.signum() != s2.signum() {
            0.0
        } else {
            let h1 = h(k - 1);
            let h2 = h(k);
            let w1 = 2.0 * h2 + h1;
            let w2 = h2 + 2.0 * h1;
            (w1 + w2) / (w1 / s1 + w2 / s2)
        };
    }

    d[0] = endpoint_slope(h(0), h(1), del(0), del(1));
    d[n - 1] = endpoint_slope(h(n - 2), h(n - 3), del(n - 2), del(n - 3));

    if d.iter().any(|v| !v.is_finite()) {
        return Err(FlexError::NonFinite { what: "spline derivatives" });
    }
    Ok(())
}

/// Shape-preserving one-sided slope at an end knot.
///
/// `h0`/`s0` belong to the interval touching the end knot, `h1`/`s1` to its neighbour.
fn endpoint_slope(h0: f64, h1: f64, s0: f64, s1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * s0 - h0 * s1) / (h0 + h1);
    if d == 0.0 || s0 == 0.0 || d.signum() != s0.signum() {
        0.0
    } else if s0.signum() != s1.signum() && d.abs() > 3.0 * s0.abs() {
        3.0 * s0
    } else {
        d
    }
}

/// Evaluate the interpolant defined by `(x, y, d)` at `query`, writing into `out`.
///
/// Ascending queries walk a forward cursor (O(m + n)); a query that moves
/// backwards falls back to a binary search for that query.
pub fn evaluate_slices(
    x: &[f64],
    y: &[f64],
    d: &[f64],
    query: &[f64],
    out: &mut [f64],
) -> Result<(), FlexError> {
    let n = x.len();
    if n < 2 {
        return Err(FlexError::TooFewKnots { actual: n });
    }
    check_len("knot y-values", n, y.len())?;
    check_len("derivative buffer", n, d.len())?;
    check_len("output buffer", query.len(), out.len())?;

    let first = x[0];
    let last = x[n - 1];
    let mut k = 0usize;

    for (slot, &q) in out.iter_mut().zip(query.iter()) {
        if q.is_nan() {
            return Err(FlexError::NonFinite { what: "spline query" });
        }
        if q <= first {
            *slot = y[0];
            continue;
        }
        if q >= last {
            *slot = y[n - 1];
            continue;
        }

        if q < x[k] {
            k = x.partition_point(|&xi| xi <= q).saturating_sub(1);
        } else {
            while q >= x[k + 1] {
                k += 1;
            }
        }

        *slot = hermite(x[k], x[k + 1], y[k], y[k + 1], d[k], d[k + 1], q);
    }

    Ok(())
}

#[inline]
fn hermite(x0: f64, x1: f64, y0: f64, y1: f64, d0: f64, d1: f64, q: f64) -> f64 {
    let h = x1 - x0;
    let t = (q - x0) / h;
    let t2 = t * t;
    let t3 = t2 * t;

    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;

    h00 * y0 + h10 * h * d0 + h01 * y1 + h11 * h * d1
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), FlexError> {
    if expected != actual {
        return Err(FlexError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Compute derivative estimates for a knot set.
pub fn fit(knots: &KnotSet) -> Result<DerivativeSet, FlexError> {
    let mut d = vec![0.0; knots.len()];
    fit_slopes(knots.xs(), knots.ys(), &mut d)?;
    Ok(DerivativeSet { d })
}

/// Evaluate the fitted interpolant at each query point.
pub fn evaluate(
    knots: &KnotSet,
    derivs: &DerivativeSet,
    query: &[f64],
) -> Result<Vec<f64>, FlexError> {
    let mut out = vec![0.0; query.len()];
    evaluate_slices(knots.xs(), knots.ys(), &derivs.d, query, &mut out)?;
    Ok(out)
}

/// A knot set together with its fitted derivatives.
#[derive(Debug, Clone)]
pub struct Pchip {
    knots: KnotSet,
    derivs: DerivativeSet,
}

impl Pchip {
    pub fn new(knots: KnotSet) -> Result<Self, FlexError> {
        let derivs = fit(&knots)?;
        Ok(Self { knots, derivs })
    }

    pub fn knots(&self) -> &KnotSet {
        &self.knots
    }

    pub fn derivatives(&self) -> &DerivativeSet {
        &self.derivs
    }

    /// Value at a single point. A NaN query is an error, not a NaN result.
    pub fn eval(&self, q: f64) -> Result<f64, FlexError> {
        let mut out = [0.0];
        evaluate_slices(self.knots.xs(), self.knots.ys(), &self.derivs.d, &[q], &mut out)?;
        Ok(out[0])
    }

    pub fn eval_many(&self, query: &[f64]) -> Result<Vec<f64>, FlexError> {
        evaluate(&self.knots, &self.derivs, query)
    }

    pub fn eval_into(&self, query: &[f64], out: &mut [f64]) -> Result<(), FlexError> {
        evaluate_slices(self.knots.xs(), self.knots.ys(), &self.derivs.d, query, out)
    }
}
