//! Read/write curve JSON files.
//!
//! Curve JSON is the portable representation of a fitted flexknot signal:
//! - knot x/y (enough to re-interpolate exactly)
//! - foreground model + coefficients
//! - the log-likelihood of the point, when known
//! - a precomputed signal grid for quick plotting
//!
//! The schema is defined by `domain::CurveFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{CurveFile, CurveGrid, ForegroundKind, KnotSet, KnotTable};
use crate::error::{AppError, FlexError};
use crate::math::Pchip;

/// Points in the precomputed grid.
pub const GRID_POINTS: usize = 201;

/// Evenly spaced grid over `[lo, hi]` (inclusive, at least 2 points).
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n as f64 - 1.0))
        .collect()
}

/// Assemble a curve file for `knots`.
pub fn build_curve_file(
    knots: &KnotSet,
    foreground: ForegroundKind,
    coefficients: Vec<f64>,
    log_likelihood: Option<f64>,
) -> Result<CurveFile, FlexError> {
    let xs = knots.xs();
    let grid_x = linspace(xs[0], xs[xs.len() - 1], GRID_POINTS);
    let grid_y = Pchip::new(knots.clone())?.eval_many(&grid_x)?;

    Ok(CurveFile {
        tool: env!("CARGO_PKG_NAME").to_string(),
        generated: Utc::now(),
        order: knots.order(),
        knots: KnotTable {
            x: xs.to_vec(),
            y: knots.ys().to_vec(),
        },
        foreground,
        coefficients,
        log_likelihood,
        grid: CurveGrid {
            x: grid_x,
            y: grid_y,
        },
    })
}

/// Rebuild the knot set stored in a curve file.
pub fn curve_knots(curve: &CurveFile) -> Result<KnotSet, FlexError> {
    KnotSet::new(curve.knots.x.clone(), curve.knots.y.clone())
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create curve JSON '{}': {e}", path.display()),
        )
    })?;

    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(2, format!("Failed to write curve JSON: {e}")))?;

    Ok(())
}

/// Read a curve JSON file.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open curve JSON '{}': {e}", path.display()),
        )
    })?;
    let curve: CurveFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid curve JSON: {e}")))?;
    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_file_survives_disk() {
        let knots = KnotSet::new(vec![50.0, 70.0, 100.0], vec![0.0, -0.5, 0.0]).unwrap();
        let curve =
            build_curve_file(&knots, ForegroundKind::None, Vec::new(), Some(-12.5)).unwrap();
        assert_eq!(curve.grid.x.len(), GRID_POINTS);
        assert_eq!(curve.grid.x[0], 50.0);
        assert_eq!(curve.grid.x[GRID_POINTS - 1], 100.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.json");
        write_curve_json(&path, &curve).unwrap();
        let loaded = read_curve_json(&path).unwrap();

        assert_eq!(loaded.order, 1);
        assert_eq!(loaded.log_likelihood, Some(-12.5));
        assert_eq!(curve_knots(&loaded).unwrap(), knots);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"tool\": 3}").unwrap();
        assert_eq!(read_curve_json(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn linspace_hits_both_ends() {
        let g = linspace(0.0, 1.0, 5);
        assert_eq!(g, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }
}
