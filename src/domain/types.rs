//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during likelihood evaluation
//! - exported to JSON/CSV
//! - reloaded later for plotting or comparisons

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FlexError;

/// Largest number of free interior knots a run may declare.
pub const MAX_ORDER: i64 = 64;

/// Named parameter values, as handed to a likelihood by the sampler.
pub type Assignment = HashMap<String, f64>;

/// One `(x, y)` control point of the interpolant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    pub x: f64,
    pub y: f64,
}

/// Fixed x-locations of the two endpoint knots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnotBounds {
    pub min: f64,
    pub max: f64,
}

impl KnotBounds {
    pub fn new(min: f64, max: f64) -> Result<Self, FlexError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(FlexError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Bounds spanning the data frequencies, widened by `border` on each side.
    pub fn around(stats: &DatasetStats, border: f64) -> Result<Self, FlexError> {
        Self::new(stats.x_min - border, stats.x_max + border)
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// An ordered knot sequence: two fixed endpoints plus `order` interior knots.
///
/// Construction is the only place the strict-increase invariant is checked,
/// so a `KnotSet` that exists is always safe to hand to the spline engine.
#[derive(Debug, Clone, PartialEq)]
pub struct KnotSet {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl KnotSet {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FlexError> {
        if x.len() != y.len() {
            return Err(FlexError::LengthMismatch {
                what: "knot y-values",
                expected: x.len(),
                actual: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(FlexError::TooFewKnots { actual: x.len() });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(FlexError::NonFinite { what: "knot x-values" });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(FlexError::NonFinite { what: "knot y-values" });
        }
        for (i, w) in x.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(FlexError::DegenerateKnotSet {
                    index: i + 1,
                    previous: w[0],
                    current: w[1],
                });
            }
        }
        Ok(Self { x, y })
    }

    /// Assemble `[(min, y_first), interior..., (max, y_last)]`.
    pub fn from_parts(
        bounds: KnotBounds,
        y_first: f64,
        interior: &[Knot],
        y_last: f64,
    ) -> Result<Self, FlexError> {
        let mut x = Vec::with_capacity(interior.len() + 2);
        let mut y = Vec::with_capacity(interior.len() + 2);
        x.push(bounds.min);
        y.push(y_first);
        for k in interior {
            x.push(k.x);
            y.push(k.y);
        }
        x.push(bounds.max);
        y.push(y_last);
        Self::new(x, y)
    }

    pub fn xs(&self) -> &[f64] {
        &self.x
    }

    pub fn ys(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Number of free interior knots.
    pub fn order(&self) -> usize {
        self.x.len() - 2
    }

    pub fn knots(&self) -> impl Iterator<Item = Knot> + '_ {
        self.x.iter().zip(self.y.iter()).map(|(&x, &y)| Knot { x, y })
    }
}

/// Summary stats about a loaded series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub n_points: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

/// The observed spectrum: frequency axis and measured values.
#[derive(Debug, Clone)]
pub struct DataSeries {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl DataSeries {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, FlexError> {
        if x.len() != y.len() {
            return Err(FlexError::InvalidData(format!(
                "frequency and value columns differ in length ({} vs {})",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(FlexError::InvalidData("data series is empty".to_string()));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(FlexError::InvalidData(
                "data series contains non-finite values".to_string(),
            ));
        }
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn stats(&self) -> DatasetStats {
        let fold = |v: &[f64]| {
            v.iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &a| (lo.min(a), hi.max(a)))
        };
        let (x_min, x_max) = fold(&self.x);
        let (y_min, y_max) = fold(&self.y);
        DatasetStats {
            n_points: self.x.len(),
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }
}

/// Process-lifetime context shared read-only by the builder and the likelihood.
///
/// Replaces process-wide globals: it is created once, then only borrowed.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub data: DataSeries,
    pub rank: usize,
    pub size: usize,
}

impl RunContext {
    pub fn new(data: DataSeries, rank: usize, size: usize) -> Result<Self, FlexError> {
        if size == 0 || rank >= size {
            return Err(FlexError::InvalidSetting {
                name: "rank",
                value: format!("{rank}/{size}"),
                reason: "rank must be below a non-zero world size",
            });
        }
        Ok(Self { data, rank, size })
    }

    pub fn single(data: DataSeries) -> Self {
        Self {
            data,
            rank: 0,
            size: 1,
        }
    }

    /// Only the root rank writes reports and files.
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }
}

/// Foreground model added to the flexknot signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ForegroundKind {
    /// No foreground: the data is the signal plus noise.
    None,
    /// Five-term log-polynomial used in the EDGES low-band analysis.
    Edges,
    /// Nine-term power law plus sinusoidal calibration term (Sims & Pober).
    Sims,
}

impl ForegroundKind {
    pub fn name(self) -> &'static str {
        match self {
            ForegroundKind::None => "none",
            ForegroundKind::Edges => "edges",
            ForegroundKind::Sims => "sims",
        }
    }

    /// Number of coefficients the model consumes.
    pub fn param_count(self) -> usize {
        match self {
            ForegroundKind::None => 0,
            ForegroundKind::Edges => 5,
            ForegroundKind::Sims => 9,
        }
    }

    /// Whether the model is linear in its coefficients (and can be profiled).
    pub fn is_linear(self) -> bool {
        matches!(self, ForegroundKind::None | ForegroundKind::Edges)
    }
}

fn default_knot_range() -> (f64, f64) {
    (-1.0, 1.0)
}

fn default_nlive() -> usize {
    100
}

fn default_foreground() -> ForegroundKind {
    ForegroundKind::None
}

fn default_noise_sigma() -> f64 {
    0.025
}

/// Configuration as written by a user (JSON file or CLI flags), before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_knot_range")]
    pub knot_range: (f64, f64),
    #[serde(default)]
    pub foreground_priors: Vec<(f64, f64)>,
    #[serde(default = "default_nlive")]
    pub nlive: usize,
    #[serde(default)]
    pub write_diagnostics: bool,
    #[serde(default = "default_foreground")]
    pub foreground: ForegroundKind,
    #[serde(default = "default_noise_sigma")]
    pub noise_sigma: f64,
    #[serde(default)]
    pub fixed_endpoints: Option<(f64, f64)>,
    #[serde(default)]
    pub border: f64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            order: 0,
            knot_range: default_knot_range(),
            foreground_priors: Vec::new(),
            nlive: default_nlive(),
            write_diagnostics: false,
            foreground: default_foreground(),
            noise_sigma: default_noise_sigma(),
            fixed_endpoints: None,
            border: 0.0,
        }
    }
}

/// A validated run configuration. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct FlexConfig {
    pub order: usize,
    pub knot_range: (f64, f64),
    pub foreground_priors: Vec<(f64, f64)>,
    pub nlive: usize,
    pub write_diagnostics: bool,
    pub foreground: ForegroundKind,
    pub noise_sigma: f64,
    /// When set, `fy_f`/`fy_l` are held at these values instead of sampled.
    pub fixed_endpoints: Option<(f64, f64)>,
    /// Padding added beyond the data range for the fixed endpoint x-locations.
    pub border: f64,
}

impl TryFrom<RawConfig> for FlexConfig {
    type Error = FlexError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.order < 0 {
            return Err(FlexError::InvalidOrder {
                order: raw.order,
                reason: "order must be >= 0".to_string(),
            });
        }
        if raw.order > MAX_ORDER {
            return Err(FlexError::InvalidOrder {
                order: raw.order,
                reason: format!("order must be <= {MAX_ORDER}"),
            });
        }

        let (lo, hi) = raw.knot_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(FlexError::InvalidKnotRange { min: lo, max: hi });
        }

        for (i, &(min, max)) in raw.foreground_priors.iter().enumerate() {
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(FlexError::InvalidPrior {
                    name: foreground_name(i),
                    min,
                    max,
                });
            }
        }

        let expected = raw.foreground.param_count();
        if raw.foreground_priors.len() != expected {
            return Err(FlexError::ForegroundMismatch {
                model: raw.foreground.name(),
                expected,
                actual: raw.foreground_priors.len(),
            });
        }

        if raw.nlive == 0 {
            return Err(FlexError::InvalidSetting {
                name: "nlive",
                value: raw.nlive.to_string(),
                reason: "must be > 0",
            });
        }
        if !(raw.noise_sigma.is_finite() && raw.noise_sigma > 0.0) {
            return Err(FlexError::InvalidSetting {
                name: "noise_sigma",
                value: raw.noise_sigma.to_string(),
                reason: "must be finite and > 0",
            });
        }
        if !(raw.border.is_finite() && raw.border >= 0.0) {
            return Err(FlexError::InvalidSetting {
                name: "border",
                value: raw.border.to_string(),
                reason: "must be finite and >= 0",
            });
        }
        if let Some((f, l)) = raw.fixed_endpoints {
            if !(f.is_finite() && l.is_finite()) {
                return Err(FlexError::InvalidSetting {
                    name: "fixed_endpoints",
                    value: format!("{f}:{l}"),
                    reason: "must be finite",
                });
            }
        }

        Ok(FlexConfig {
            order: raw.order as usize,
            knot_range: raw.knot_range,
            foreground_priors: raw.foreground_priors,
            nlive: raw.nlive,
            write_diagnostics: raw.write_diagnostics,
            foreground: raw.foreground,
            noise_sigma: raw.noise_sigma,
            fixed_endpoints: raw.fixed_endpoints,
            border: raw.border,
        })
    }
}

impl FlexConfig {
    /// Same configuration at a different order (used by order selection).
    pub fn with_order(&self, order: usize) -> Self {
        Self {
            order,
            ..self.clone()
        }
    }
}

/// Name of the `i`-th foreground coefficient (`a_0`, `a_1`, ...).
pub fn foreground_name(i: usize) -> String {
    format!("a_{i}")
}

/// Name of the `i`-th interior knot x-location (1-based).
pub fn knot_x_name(i: usize) -> String {
    format!("x_{i}")
}

/// Name of the `i`-th interior knot y-value (1-based).
pub fn knot_y_name(i: usize) -> String {
    format!("y_{i}")
}

/// Name of the `i`-th ordering draw (1-based).
pub fn draw_name(i: usize) -> String {
    format!("v_{i}")
}

pub const FIRST_ENDPOINT: &str = "fy_f";
pub const LAST_ENDPOINT: &str = "fy_l";

/// One posterior draw: parameter values plus an importance weight.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub values: HashMap<String, f64>,
    pub weight: f64,
}

/// Knot coordinates as stored in a curve file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnotTable {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// A saved curve file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub generated: DateTime<Utc>,
    pub order: usize,
    pub knots: KnotTable,
    pub foreground: ForegroundKind,
    pub coefficients: Vec<f64>,
    pub log_likelihood: Option<f64>,
    pub grid: CurveGrid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knot_set_rejects_duplicate_x() {
        let err = KnotSet::new(vec![0.0, 5.0, 5.0, 10.0], vec![0.0; 4]).unwrap_err();
        assert_eq!(
            err,
            FlexError::DegenerateKnotSet {
                index: 2,
                previous: 5.0,
                current: 5.0
            }
        );
    }

    #[test]
    fn knot_set_needs_two_knots() {
        let err = KnotSet::new(vec![1.0], vec![1.0]).unwrap_err();
        assert_eq!(err, FlexError::TooFewKnots { actual: 1 });
    }

    #[test]
    fn order_zero_is_just_the_endpoints() {
        let bounds = KnotBounds::new(50.0, 100.0).unwrap();
        let set = KnotSet::from_parts(bounds, 0.1, &[], -0.2).unwrap();
        assert_eq!(set.order(), 0);
        assert_eq!(set.xs(), &[50.0, 100.0]);
        assert_eq!(set.ys(), &[0.1, -0.2]);
    }

    #[test]
    fn config_rejects_negative_order() {
        let raw = RawConfig {
            order: -1,
            ..RawConfig::default()
        };
        let err = FlexConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, FlexError::InvalidOrder { order: -1, .. }));
    }

    #[test]
    fn config_rejects_empty_knot_range() {
        let raw = RawConfig {
            knot_range: (1.0, 1.0),
            ..RawConfig::default()
        };
        let err = FlexConfig::try_from(raw).unwrap_err();
        assert_eq!(err, FlexError::InvalidKnotRange { min: 1.0, max: 1.0 });
    }

    #[test]
    fn config_checks_foreground_prior_count() {
        let raw = RawConfig {
            foreground: ForegroundKind::Edges,
            foreground_priors: vec![(-1.0, 1.0); 3],
            ..RawConfig::default()
        };
        let err = FlexConfig::try_from(raw).unwrap_err();
        assert_eq!(
            err,
            FlexError::ForegroundMismatch {
                model: "edges",
                expected: 5,
                actual: 3
            }
        );
    }

    #[test]
    fn config_json_uses_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"order": 2, "foreground": "edges", "foreground_priors": [[-1e5, 1e5], [-1e5, 1e5], [-1e5, 1e5], [-1e5, 1e5], [-1e5, 1e5]]}"#,
        )
        .unwrap();
        let config = FlexConfig::try_from(raw).unwrap();
        assert_eq!(config.order, 2);
        assert_eq!(config.foreground, ForegroundKind::Edges);
        assert_eq!(config.knot_range, (-1.0, 1.0));
        assert_eq!(config.nlive, 100);
        assert!((config.noise_sigma - 0.025).abs() < 1e-15);
    }

    #[test]
    fn data_series_stats() {
        let data = DataSeries::new(vec![50.0, 60.0, 70.0], vec![1.0, -2.0, 3.0]).unwrap();
        let s = data.stats();
        assert_eq!(s.n_points, 3);
        assert_eq!((s.x_min, s.x_max), (50.0, 70.0));
        assert_eq!((s.y_min, s.y_max), (-2.0, 3.0));
    }
}
