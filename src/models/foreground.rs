//! Foreground model evaluation.
//!
//! The likelihood relies on two primitive operations:
//! - predict `T_fg(ν)` given the coefficients (for every likelihood call)
//! - build a design row for a given frequency (for profiling linear models)
//!
//! Frequencies are in MHz and normalized by `ν_c = 75 MHz`.

use std::f64::consts::PI;

use crate::domain::ForegroundKind;

/// Reference frequency (MHz).
pub const NU_C: f64 = 75.0;

/// Fill a design row for a linear foreground model.
///
/// Returns `false` for models that are not linear in their coefficients.
///
/// # Panics
/// Panics if `out` is shorter than `model.param_count()`.
pub fn fill_design_row(model: ForegroundKind, nu: f64, out: &mut [f64]) -> bool {
    match model {
        ForegroundKind::None => true,
        ForegroundKind::Edges => {
            let r = nu / NU_C;
            let l = r.ln();
            let base = r.powf(-2.5);
            out[0] = base;
            out[1] = base * l;
            out[2] = base * l * l;
            out[3] = r.powf(-4.5);
            out[4] = r.powi(-2);
            true
        }
        ForegroundKind::Sims => false,
    }
}

/// Predict `T_fg(ν)` for the given model.
///
/// `coeffs` must hold at least `model.param_count()` values.
pub fn predict(model: ForegroundKind, nu: f64, coeffs: &[f64]) -> f64 {
    match model {
        ForegroundKind::None => 0.0,
        ForegroundKind::Edges => {
            let r = nu / NU_C;
            let l = r.ln();
            let base = r.powf(-2.5);
            coeffs[0] * base
                + coeffs[1] * base * l
                + coeffs[2] * base * l * l
                + coeffs[3] * r.powf(-4.5)
                + coeffs[4] * r.powi(-2)
        }
        ForegroundKind::Sims => {
            let r = nu / NU_C;
            let phase = 2.0 * PI * nu / coeffs[1];
            let t_cal = r.powf(coeffs[0]) * (coeffs[2] * phase.sin() + coeffs[3] * phase.cos());
            let lg = r.log10();
            let t_pow: f64 = (4..9).map(|i| 10f64.powf(coeffs[i] * lg.powi(i as i32))).sum();
            t_pow + t_cal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_reference_frequency_reduces_to_sum() {
        // At ν = ν_c every log term vanishes and every power is 1.
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let t = predict(ForegroundKind::Edges, NU_C, &a);
        assert!((t - (1.0 + 4.0 + 5.0)).abs() < 1e-12);
    }

    #[test]
    fn edges_design_row_matches_prediction() {
        let a = [1560.0, -30.0, 8.0, 12.0, -40.0];
        let mut row = [0.0; 5];
        for &nu in &[51.0, 63.5, 75.0, 88.2, 99.9] {
            assert!(fill_design_row(ForegroundKind::Edges, nu, &mut row));
            let dot: f64 = row.iter().zip(a.iter()).map(|(r, c)| r * c).sum();
            let t = predict(ForegroundKind::Edges, nu, &a);
            assert!((dot - t).abs() < 1e-9 * t.abs().max(1.0));
        }
    }

    #[test]
    fn sims_is_not_linear() {
        let mut row = [0.0; 9];
        assert!(!fill_design_row(ForegroundKind::Sims, 70.0, &mut row));
        let d = [-2.5, 12.5, 0.1, 0.2, 3.0, 0.0, 0.0, 0.0, 0.0];
        assert!(predict(ForegroundKind::Sims, 70.0, &d).is_finite());
    }

    #[test]
    fn none_is_zero() {
        assert_eq!(predict(ForegroundKind::None, 70.0, &[]), 0.0);
    }
}
