//! Reporting utilities: residuals, outlier channels, and formatted terminal output.

mod format;

pub use format::*;

use crate::domain::{DataSeries, ForegroundKind, KnotSet};
use crate::error::AppError;
use crate::math::Pchip;
use crate::models::predict;

/// Observed vs fitted value at one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelResidual {
    pub x: f64,
    pub y_obs: f64,
    pub y_fit: f64,
    pub residual: f64,
}

/// Fitted values (signal + foreground) and residuals at every data channel.
pub fn compute_residuals(
    data: &DataSeries,
    knots: &KnotSet,
    foreground: ForegroundKind,
    coefficients: &[f64],
) -> Result<Vec<ChannelResidual>, AppError> {
    let signal = Pchip::new(knots.clone())?.eval_many(data.x())?;

    let mut out = Vec::with_capacity(data.len());
    for ((&x, &y_obs), &s) in data.x().iter().zip(data.y()).zip(&signal) {
        let y_fit = s + predict(foreground, x, coefficients);
        if !y_fit.is_finite() {
            return Err(AppError::new(
                4,
                "Non-finite model prediction during residual computation.",
            ));
        }
        out.push(ChannelResidual {
            x,
            y_obs,
            y_fit,
            residual: y_obs - y_fit,
        });
    }
    Ok(out)
}

/// Root-mean-square residual, or NaN when empty.
pub fn rms(residuals: &[ChannelResidual]) -> f64 {
    if residuals.is_empty() {
        return f64::NAN;
    }
    let ss: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
    (ss / residuals.len() as f64).sqrt()
}

/// The `top_n` channels with the largest absolute residual.
pub fn largest_residuals(residuals: &[ChannelResidual], top_n: usize) -> Vec<ChannelResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.residual.abs().total_cmp(&a.residual.abs()));
    sorted.truncate(top_n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series() -> DataSeries {
        DataSeries::new(vec![0.0, 5.0, 10.0], vec![0.0, 11.0, -0.5]).unwrap()
    }

    fn peak() -> KnotSet {
        KnotSet::new(vec![0.0, 5.0, 10.0], vec![0.0, 10.0, 0.0]).unwrap()
    }

    #[test]
    fn residuals_at_knots_are_data_minus_knot_values() {
        let r = compute_residuals(&series(), &peak(), ForegroundKind::None, &[]).unwrap();
        assert_eq!(r.len(), 3);
        assert!(r[0].residual.abs() < 1e-12);
        assert!((r[1].residual - 1.0).abs() < 1e-12);
        assert!((r[2].residual + 0.5).abs() < 1e-12);
    }

    #[test]
    fn largest_residuals_sorted_by_magnitude() {
        let r = compute_residuals(&series(), &peak(), ForegroundKind::None, &[]).unwrap();
        let top = largest_residuals(&r, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].x, 5.0);
        assert_eq!(top[1].x, 10.0);
    }

    #[test]
    fn rms_of_known_residuals() {
        let r = compute_residuals(&series(), &peak(), ForegroundKind::None, &[]).unwrap();
        let expected = ((1.0 + 0.25) / 3.0_f64).sqrt();
        assert!((rms(&r) - expected).abs() < 1e-12);
        assert!(rms(&[]).is_nan());
    }
}
