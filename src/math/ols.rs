//! Weighted least squares solver.
//!
//! Used to profile linear foreground coefficients: given a fixed flexknot
//! signal `s(ν)`, the coefficients `a` of a linear foreground minimize
//!
//! ```text
//! Σ w_i (y_i - s(ν_i) - φ(ν_i)^T a)^2
//! ```
//!
//! Rows are scaled by `sqrt(w_i)` and the resulting ordinary least squares
//! problem is solved with an SVD, which tolerates the nearly collinear
//! columns a log-polynomial basis produces over a narrow band.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Build `sqrt(w)`-scaled design and target from per-row basis values and solve.
///
/// `rows[i]` holds the basis values for observation `i`; every row must have
/// the same length `p`. Returns `None` for empty input or a failed solve.
pub fn weighted_least_squares(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    if n == 0 || y.len() != n || w.len() != n {
        return None;
    }
    let p = rows[0].len();
    if p == 0 || rows.iter().any(|r| r.len() != p) {
        return None;
    }

    let mut xw = DMatrix::<f64>::zeros(n, p);
    let mut yw = DVector::<f64>::zeros(n);
    for i in 0..n {
        let sw = w[i].max(0.0).sqrt();
        for j in 0..p {
            xw[(i, j)] = rows[i][j] * sw;
        }
        yw[i] = y[i] * sw;
    }

    solve_least_squares(&xw, &yw).map(|beta| beta.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weighted_rows_ignore_zero_weight_outlier() {
        let rows = vec![
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
            vec![1.0, 3.0],
        ];
        let y = [1.0, 3.0, 5.0, 100.0];
        let w = [1.0, 1.0, 1.0, 0.0];
        let beta = weighted_least_squares(&rows, &y, &w).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-9);
        assert!((beta[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_rows_reject_ragged_input() {
        let rows = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(weighted_least_squares(&rows, &[1.0, 2.0], &[1.0, 1.0]).is_none());
    }
}
