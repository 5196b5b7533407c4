//! Turning posterior samples back into curves.
//!
//! Two sample forms are supported behind [`SampleSource`]:
//!
//! - [`SampleTable`]: a raw column table, as loaded from a samples CSV
//! - [`PosteriorSamples`]: a table that knows which columns hold the weight
//!   and the log-likelihood
//!
//! [`extract`] reads one row into a [`KnotSet`]; [`curve_bands`] does that for
//! every row and reduces the curves to weighted quantiles over a grid.

use rayon::prelude::*;

use crate::domain::{
    Assignment, FIRST_ENDPOINT, Knot, KnotBounds, KnotSet, LAST_ENDPOINT, SampleRecord,
    knot_x_name, knot_y_name,
};
use crate::error::FlexError;
use crate::math::Pchip;

pub const WEIGHT_COLUMN: &str = "weight";
pub const LOGLIKE_COLUMN: &str = "loglike";
pub const MINUS_LOGPOST_COLUMN: &str = "minuslogpost";

/// Named access to one posterior row.
pub trait RowLookup {
    fn value(&self, name: &str) -> Option<f64>;
}

impl RowLookup for Assignment {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

impl RowLookup for SampleRecord {
    fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Where the endpoint knot y-values come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EndpointPolicy {
    /// Read `fy_f`/`fy_l` from the row; absence is an error.
    Sampled,
    /// Use these values regardless of the row.
    Fixed(f64, f64),
    /// Read `fy_f`/`fy_l` when present, otherwise use zero (with a warning).
    DefaultZero,
}

impl EndpointPolicy {
    /// Resolve `DefaultZero` once against a column list.
    pub fn resolve(self, columns: &[String]) -> Self {
        match self {
            EndpointPolicy::DefaultZero => {
                let has = |name: &str| columns.iter().any(|c| c == name);
                if has(FIRST_ENDPOINT) && has(LAST_ENDPOINT) {
                    EndpointPolicy::Sampled
                } else {
                    log::warn!("{FIRST_ENDPOINT}/{LAST_ENDPOINT} not found; defaulting both to 0");
                    EndpointPolicy::Fixed(0.0, 0.0)
                }
            }
            other => other,
        }
    }
}

fn require<R: RowLookup + ?Sized>(row: &R, name: &str) -> Result<f64, FlexError> {
    row.value(name).ok_or_else(|| FlexError::MissingParameter {
        name: name.to_string(),
    })
}

/// Build the knot set a posterior row describes.
pub fn extract<R: RowLookup + ?Sized>(
    order: usize,
    row: &R,
    bounds: KnotBounds,
    endpoints: EndpointPolicy,
) -> Result<KnotSet, FlexError> {
    let (y_first, y_last) = match endpoints {
        EndpointPolicy::Sampled => (require(row, FIRST_ENDPOINT)?, require(row, LAST_ENDPOINT)?),
        EndpointPolicy::Fixed(f, l) => (f, l),
        EndpointPolicy::DefaultZero => {
            match (row.value(FIRST_ENDPOINT), row.value(LAST_ENDPOINT)) {
                (Some(f), Some(l)) => (f, l),
                (f, l) => {
                    log::warn!(
                        "{FIRST_ENDPOINT}/{LAST_ENDPOINT} not found; defaulting missing values to 0"
                    );
                    (f.unwrap_or(0.0), l.unwrap_or(0.0))
                }
            }
        }
    };

    let interior = (1..=order)
        .map(|i| {
            Ok(Knot {
                x: require(row, &knot_x_name(i))?,
                y: require(row, &knot_y_name(i))?,
            })
        })
        .collect::<Result<Vec<_>, FlexError>>()?;

    KnotSet::from_parts(bounds, y_first, &interior, y_last)
}

/// Uniform access to a set of weighted samples.
pub trait SampleSource {
    fn columns(&self) -> &[String];
    fn column(&self, name: &str) -> Option<&[f64]>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Importance weight per row.
    fn weights(&self) -> Vec<f64>;

    fn record(&self, index: usize) -> Option<SampleRecord>;

    /// Row index of the highest-likelihood sample.
    fn best_fit(&self) -> Option<usize>;
}

/// Column-major table of sample values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleTable {
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
    rows: usize,
}

impl SampleTable {
    pub fn new(columns: Vec<String>) -> Self {
        let data = vec![Vec::new(); columns.len()];
        Self {
            columns,
            data,
            rows: 0,
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, FlexError> {
        let mut table = Self::new(columns);
        for row in &rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), FlexError> {
        if row.len() != self.columns.len() {
            return Err(FlexError::LengthMismatch {
                what: "sample row",
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (col, &v) in self.data.iter_mut().zip(row) {
            col.push(v);
        }
        self.rows += 1;
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Row values in column order.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.rows).then(|| self.data.iter().map(|c| c[index]).collect())
    }
}

fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

impl SampleSource for SampleTable {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.index_of(name).map(|i| self.data[i].as_slice())
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn weights(&self) -> Vec<f64> {
        match self.column(WEIGHT_COLUMN) {
            Some(w) => w.to_vec(),
            None => vec![1.0; self.rows],
        }
    }

    fn record(&self, index: usize) -> Option<SampleRecord> {
        if index >= self.rows {
            return None;
        }
        let values = self
            .columns
            .iter()
            .zip(&self.data)
            .map(|(name, col)| (name.clone(), col[index]))
            .collect();
        let weight = self.column(WEIGHT_COLUMN).map_or(1.0, |w| w[index]);
        Some(SampleRecord { values, weight })
    }

    fn best_fit(&self) -> Option<usize> {
        if let Some(ll) = self.column(LOGLIKE_COLUMN) {
            return argmax(ll);
        }
        if let Some(mlp) = self.column(MINUS_LOGPOST_COLUMN) {
            let neg: Vec<f64> = mlp.iter().map(|v| -v).collect();
            return argmax(&neg);
        }
        argmax(&self.weights())
    }
}

/// A sample table plus the names of its weight and likelihood columns.
#[derive(Debug, Clone)]
pub struct PosteriorSamples {
    table: SampleTable,
    weight_column: String,
    loglike_column: Option<String>,
}

impl PosteriorSamples {
    pub fn new(
        table: SampleTable,
        weight_column: impl Into<String>,
        loglike_column: Option<String>,
    ) -> Result<Self, FlexError> {
        let weight_column = weight_column.into();
        let weights = table.column(&weight_column).ok_or_else(|| {
            FlexError::InvalidData(format!("weight column '{weight_column}' not found"))
        })?;
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(FlexError::InvalidData(format!(
                "weight column '{weight_column}' has negative or non-finite entries"
            )));
        }
        if let Some(ll) = &loglike_column {
            if table.column(ll).is_none() {
                return Err(FlexError::InvalidData(format!(
                    "log-likelihood column '{ll}' not found"
                )));
            }
        }
        Ok(Self {
            table,
            weight_column,
            loglike_column,
        })
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    pub fn into_table(self) -> SampleTable {
        self.table
    }
}

impl SampleSource for PosteriorSamples {
    fn columns(&self) -> &[String] {
        self.table.columns()
    }

    fn column(&self, name: &str) -> Option<&[f64]> {
        self.table.column(name)
    }

    fn len(&self) -> usize {
        self.table.len()
    }

    fn weights(&self) -> Vec<f64> {
        self.table
            .column(&self.weight_column)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![1.0; self.table.len()])
    }

    fn record(&self, index: usize) -> Option<SampleRecord> {
        let mut rec = self.table.record(index)?;
        rec.weight = self.table.column(&self.weight_column)?[index];
        Some(rec)
    }

    fn best_fit(&self) -> Option<usize> {
        match &self.loglike_column {
            Some(ll) => self.table.column(ll).and_then(argmax),
            None => self.table.best_fit(),
        }
    }
}

/// Columns worth plotting: parameters, minus bookkeeping and ordering draws.
pub fn plot_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| {
            let c = c.as_str();
            !(c == WEIGHT_COLUMN
                || c == LOGLIKE_COLUMN
                || c == "#"
                || c.starts_with("minuslog")
                || c.starts_with("chi2")
                || c.starts_with("v_"))
        })
        .cloned()
        .collect()
}

/// Weighted mean and spread of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Marginal {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

pub fn weighted_summary<S: SampleSource + ?Sized>(
    source: &S,
    columns: &[String],
) -> Result<Vec<Marginal>, FlexError> {
    let weights = source.weights();
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(FlexError::InvalidData(
            "sample weights sum to zero".to_string(),
        ));
    }

    columns
        .iter()
        .map(|name| {
            let values = source.column(name).ok_or_else(|| FlexError::MissingParameter {
                name: name.clone(),
            })?;
            // Zero-weight rows may hold NaN for parameters that were never computed.
            let live = || values.iter().zip(&weights).filter(|(_, w)| **w > 0.0);
            let mean = live().map(|(v, w)| v * w).sum::<f64>() / total;
            let var = live().map(|(v, w)| w * (v - mean) * (v - mean)).sum::<f64>() / total;
            Ok(Marginal {
                name: name.clone(),
                mean,
                std: var.max(0.0).sqrt(),
            })
        })
        .collect()
}

/// Smallest value whose cumulative weight reaches `q` of the total.
///
/// Returns NaN for empty input or zero total weight.
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = values
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .filter(|(v, w)| v.is_finite() && *w > 0.0)
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let target = q.clamp(0.0, 1.0) * total;
    let mut acc = 0.0;
    for &(v, w) in &pairs {
        acc += w;
        if acc >= target {
            return v;
        }
    }
    pairs[pairs.len() - 1].0
}

/// Weighted quantile curves over a grid.
#[derive(Debug, Clone)]
pub struct CurveBands {
    pub grid: Vec<f64>,
    pub quantiles: Vec<f64>,
    /// `bands[q][g]`: quantile `quantiles[q]` at `grid[g]`.
    pub bands: Vec<Vec<f64>>,
    /// Rows skipped for zero weight or degenerate knots.
    pub skipped: usize,
}

pub const DEFAULT_QUANTILES: [f64; 3] = [0.025, 0.5, 0.975];

/// Evaluate every sample's curve on `grid` and reduce to weighted quantiles.
pub fn curve_bands<S: SampleSource + Sync + ?Sized>(
    source: &S,
    order: usize,
    bounds: KnotBounds,
    endpoints: EndpointPolicy,
    grid: &[f64],
    quantiles: &[f64],
) -> Result<CurveBands, FlexError> {
    let endpoints = endpoints.resolve(source.columns());

    let curves: Vec<Option<(Vec<f64>, f64)>> = (0..source.len())
        .into_par_iter()
        .map(|i| {
            let Some(rec) = source.record(i) else {
                return Ok(None);
            };
            if rec.weight <= 0.0 {
                return Ok(None);
            }
            let knots = match extract(order, &rec, bounds, endpoints) {
                Ok(k) => k,
                Err(err) if err.is_numeric() => {
                    log::debug!("skipping sample {i}: {err}");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            let curve = Pchip::new(knots)?.eval_many(grid)?;
            Ok(Some((curve, rec.weight)))
        })
        .collect::<Result<_, FlexError>>()?;

    let skipped = curves.iter().filter(|c| c.is_none()).count();
    let (values, weights): (Vec<Vec<f64>>, Vec<f64>) = curves.into_iter().flatten().unzip();
    if values.is_empty() {
        return Err(FlexError::InvalidData(
            "no sample produced a usable curve".to_string(),
        ));
    }

    let per_point: Vec<Vec<f64>> = (0..grid.len())
        .into_par_iter()
        .map(|g| {
            let column: Vec<f64> = values.iter().map(|c| c[g]).collect();
            quantiles
                .iter()
                .map(|&q| weighted_quantile(&column, &weights, q))
                .collect()
        })
        .collect();

    let bands = (0..quantiles.len())
        .map(|q| per_point.iter().map(|p| p[q]).collect())
        .collect();

    Ok(CurveBands {
        grid: grid.to_vec(),
        quantiles: quantiles.to_vec(),
        bands,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn peak_table() -> SampleTable {
        SampleTable::from_rows(
            names(&["weight", "loglike", "fy_f", "fy_l", "v_1", "x_1", "y_1"]),
            vec![
                vec![1.0, -50.0, 0.0, 0.0, 0.5, 5.0, 8.0],
                vec![2.0, -10.0, 0.0, 0.0, 0.5, 5.0, 10.0],
                vec![1.0, -30.0, 0.0, 0.0, 0.4, 6.0, 12.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn extract_reads_named_row() {
        let row: Assignment = [("fy_f", 0.0), ("fy_l", 0.0), ("x_1", 5.0), ("y_1", 10.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let knots = extract(
            1,
            &row,
            KnotBounds::new(0.0, 10.0).unwrap(),
            EndpointPolicy::Sampled,
        )
        .unwrap();
        assert_eq!(knots.xs(), &[0.0, 5.0, 10.0]);
        assert_eq!(knots.ys(), &[0.0, 10.0, 0.0]);
    }

    #[test]
    fn sampled_policy_requires_endpoints() {
        let row: Assignment = [("x_1".to_string(), 5.0), ("y_1".to_string(), 1.0)]
            .into_iter()
            .collect();
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let err = extract(1, &row, bounds, EndpointPolicy::Sampled).unwrap_err();
        assert_eq!(err, FlexError::MissingParameter { name: "fy_f".into() });

        let knots = extract(1, &row, bounds, EndpointPolicy::DefaultZero).unwrap();
        assert_eq!(knots.ys(), &[0.0, 1.0, 0.0]);

        let knots = extract(1, &row, bounds, EndpointPolicy::Fixed(0.2, -0.2)).unwrap();
        assert_eq!(knots.ys(), &[0.2, 1.0, -0.2]);
    }

    #[test]
    fn both_source_forms_agree_on_best_fit() {
        let table = peak_table();
        assert_eq!(table.best_fit(), Some(1));

        let wrapped =
            PosteriorSamples::new(table.clone(), "weight", Some("loglike".to_string())).unwrap();
        assert_eq!(wrapped.best_fit(), Some(1));

        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let from_raw = extract(1, &table.record(1).unwrap(), bounds, EndpointPolicy::Sampled);
        let from_wrapped =
            extract(1, &wrapped.record(1).unwrap(), bounds, EndpointPolicy::Sampled);
        assert_eq!(from_raw.unwrap(), from_wrapped.unwrap());
    }

    #[test]
    fn wrapped_samples_validate_columns() {
        let err = PosteriorSamples::new(peak_table(), "w", None).unwrap_err();
        assert!(matches!(err, FlexError::InvalidData(_)));
    }

    #[test]
    fn plot_columns_skip_bookkeeping() {
        let cols = names(&[
            "weight",
            "minuslogpost",
            "minuslogprior__0",
            "chi2__flex",
            "loglike",
            "fy_f",
            "v_1",
            "x_1",
            "y_1",
            "a_0",
        ]);
        assert_eq!(plot_columns(&cols), names(&["fy_f", "x_1", "y_1", "a_0"]));
    }

    #[test]
    fn weighted_summary_uses_weights() {
        let summary = weighted_summary(&peak_table(), &names(&["y_1"])).unwrap();
        // (8 + 2*10 + 12) / 4 = 10
        assert!((summary[0].mean - 10.0).abs() < 1e-12);
        // (4 + 0 + 4) / 4 = 2
        assert!((summary[0].std - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn weighted_summary_ignores_zero_weight_nans() {
        let table = SampleTable::from_rows(
            names(&["weight", "x_1"]),
            vec![vec![1.0, 4.0], vec![0.0, f64::NAN], vec![1.0, 6.0]],
        )
        .unwrap();
        let summary = weighted_summary(&table, &names(&["x_1"])).unwrap();
        assert_eq!(summary[0].mean, 5.0);
        assert_eq!(summary[0].std, 1.0);
    }

    #[test]
    fn quantile_follows_cumulative_weight() {
        let v = [3.0, 1.0, 2.0];
        let w = [1.0, 1.0, 2.0];
        assert_eq!(weighted_quantile(&v, &w, 0.0), 1.0);
        assert_eq!(weighted_quantile(&v, &w, 0.5), 2.0);
        assert_eq!(weighted_quantile(&v, &w, 0.9), 3.0);
        assert!(weighted_quantile(&[], &[], 0.5).is_nan());
    }

    #[test]
    fn bands_bracket_the_median() {
        let table = peak_table();
        let grid: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let bands = curve_bands(
            &table,
            1,
            KnotBounds::new(0.0, 10.0).unwrap(),
            EndpointPolicy::Sampled,
            &grid,
            &DEFAULT_QUANTILES,
        )
        .unwrap();
        assert_eq!(bands.bands.len(), 3);
        assert_eq!(bands.skipped, 0);
        for g in 0..grid.len() {
            assert!(bands.bands[0][g] <= bands.bands[1][g]);
            assert!(bands.bands[1][g] <= bands.bands[2][g]);
        }
        // The heaviest sample peaks at 10 at x = 5.
        assert_eq!(bands.bands[1][5], 10.0);
    }

    #[test]
    fn bands_skip_degenerate_rows() {
        let mut table = peak_table();
        table
            .push_row(&[1.0, -40.0, 0.0, 0.0, 1.0, 0.0, 3.0])
            .unwrap();
        let bands = curve_bands(
            &table,
            1,
            KnotBounds::new(0.0, 10.0).unwrap(),
            EndpointPolicy::Sampled,
            &[2.5, 7.5],
            &[0.5],
        )
        .unwrap();
        assert_eq!(bands.skipped, 1);
    }

    #[test]
    fn push_row_checks_width() {
        let mut table = SampleTable::new(names(&["a", "b"]));
        let err = table.push_row(&[1.0]).unwrap_err();
        assert!(matches!(err, FlexError::LengthMismatch { .. }));
    }
}
