//! Shared pipeline logic used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! config -> ingest -> bounds -> parameter space -> scan/select -> summary
//!
//! The `app` module then only decides what to print and what to write.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::cli::{ConfigArgs, DataArgs, PlotArgs, ScanOutputArgs, SimulateArgs};
use crate::data::{SyntheticConfig, SyntheticSpectrum, generate_spectrum, write_spectrum_csv};
use crate::domain::{
    Assignment, FlexConfig, KnotBounds, KnotSet, MAX_ORDER, RawConfig, RunContext,
};
use crate::error::AppError;
use crate::fit::likelihood::{Likelihood, LikelihoodEvaluator, Registration};
use crate::fit::params::{ParameterSpaceBuilder, ParameterSpec};
use crate::fit::posterior::{
    CurveBands, DEFAULT_QUANTILES, EndpointPolicy, LOGLIKE_COLUMN, Marginal, PosteriorSamples,
    SampleSource, WEIGHT_COLUMN, curve_bands, extract, plot_columns, weighted_summary,
};
use crate::fit::scan::{ForegroundMode, ScanResult, ScanSettings, run_scan};
use crate::fit::selection::{OrderSelection, select_order};
use crate::io::curve::linspace;
use crate::io::export::read_samples_csv;
use crate::io::ingest::{IngestOptions, IngestedData, load_series};
use crate::report::{ChannelResidual, compute_residuals};

/// Grid points for quantile bands.
pub const BAND_POINTS: usize = 101;

/// Everything a run needs before any likelihood call.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub ingest: IngestedData,
    pub ctx: RunContext,
    pub config: FlexConfig,
    pub bounds: KnotBounds,
}

/// Best curve of a scan plus its derived summaries.
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub knots: KnotSet,
    pub coefficients: Vec<f64>,
    pub residuals: Vec<ChannelResidual>,
    pub marginals: Vec<Marginal>,
    pub bands: CurveBands,
}

/// Output of `scan` or `select`.
#[derive(Debug, Clone)]
pub struct ScanRun {
    /// Configuration at the reported order.
    pub config: FlexConfig,
    pub spec: ParameterSpec,
    pub scan: ScanResult,
    pub selection: Option<OrderSelection>,
    pub summary: FitSummary,
}

pub fn ingest_options(args: &DataArgs) -> IngestOptions {
    IngestOptions {
        path: args.data.clone(),
        x_column: args.x_column.clone(),
        y_column: args.y_column.clone(),
        weight_column: args.weight_column.clone(),
        skip_head: args.skip_head,
        skip_tail: args.skip_tail,
    }
}

/// Read the JSON config (if any) and apply flag overrides.
pub fn load_raw_config(args: &ConfigArgs) -> Result<RawConfig, AppError> {
    let mut raw = match &args.config {
        Some(path) => read_config_file(path)?,
        None => RawConfig::default(),
    };

    if let Some(order) = args.order {
        raw.order = order;
    }
    if let Some(range) = args.knot_range {
        raw.knot_range = range;
    }
    if let Some(fg) = args.foreground {
        raw.foreground = fg;
    }
    if !args.fg_priors.is_empty() {
        raw.foreground_priors = args.fg_priors.clone();
    }
    if let Some(sigma) = args.noise_sigma {
        raw.noise_sigma = sigma;
    }
    if args.fixed_endpoints.is_some() {
        raw.fixed_endpoints = args.fixed_endpoints;
    }
    if let Some(border) = args.border {
        raw.border = border;
    }
    if let Some(nlive) = args.nlive {
        raw.nlive = nlive;
    }
    if args.write_diagnostics {
        raw.write_diagnostics = true;
    }
    Ok(raw)
}

fn read_config_file(path: &Path) -> Result<RawConfig, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open config '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid config '{}': {e}", path.display())))
}

/// Validate the configuration, load the spectrum, and derive the knot bounds.
pub fn prepare(data: &DataArgs, config: &ConfigArgs) -> Result<PreparedRun, AppError> {
    let config = FlexConfig::try_from(load_raw_config(config)?)?;

    let ingest = load_series(&ingest_options(data))?;
    if !ingest.row_errors.is_empty() {
        log::warn!(
            "{} rows skipped while reading {}",
            ingest.row_errors.len(),
            data.data.display()
        );
    }

    let bounds = KnotBounds::around(&ingest.stats, config.border)?;
    let ctx = RunContext::new(ingest.series.clone(), data.rank, data.world_size)?;
    log::info!(
        "loaded {} channels, knot bounds [{:.3}, {:.3}]",
        ctx.data.len(),
        bounds.min,
        bounds.max
    );

    Ok(PreparedRun {
        ingest,
        ctx,
        config,
        bounds,
    })
}

/// Parameter declaration of a prepared run.
pub fn build_spec(run: &PreparedRun) -> Result<ParameterSpec, AppError> {
    Ok(ParameterSpaceBuilder::new(&run.config, run.bounds).build()?)
}

/// Score one user-supplied point through the registered likelihood.
///
/// Returns the log-likelihood and the completed assignment.
pub fn evaluate_point(
    run: &PreparedRun,
    values: &[(String, f64)],
) -> Result<(f64, Assignment), AppError> {
    let builder = ParameterSpaceBuilder::new(&run.config, run.bounds);
    let likelihood: Box<dyn Likelihood + '_> =
        Box::new(LikelihoodEvaluator::new(&run.ctx, &run.config, run.bounds));
    let registration = Registration::new(&builder, Some(likelihood))?;

    let mut assignment: Assignment = values.iter().cloned().collect();
    let ll = registration.evaluate(&mut assignment)?;
    Ok((ll, assignment))
}

pub fn scan_settings(spec: &ParameterSpec, args: &ScanOutputArgs) -> ScanSettings {
    let mut settings = ScanSettings::for_spec(spec, args.seed);
    if let Some(draws) = args.draws {
        settings.draws = draws;
    }
    if args.profile_foreground {
        settings.foreground = ForegroundMode::Profiled;
    }
    settings
}

/// Scan at the configured order.
pub fn run_fixed_order(run: &PreparedRun, args: &ScanOutputArgs) -> Result<ScanRun, AppError> {
    let spec = build_spec(run)?;
    let settings = scan_settings(&spec, args);
    let eval = LikelihoodEvaluator::new(&run.ctx, &run.config, run.bounds);
    let scan = run_scan(&spec, &eval, &settings)?;
    let summary = summarize(run, &run.config, &scan)?;

    Ok(ScanRun {
        config: run.config.clone(),
        spec,
        scan,
        selection: None,
        summary,
    })
}

/// Scan every order up to `max_order` and keep the BIC choice.
pub fn run_order_selection(
    run: &PreparedRun,
    args: &ScanOutputArgs,
    max_order: usize,
) -> Result<ScanRun, AppError> {
    if max_order as i64 > MAX_ORDER {
        return Err(AppError::new(
            2,
            format!("--max-order must be <= {MAX_ORDER}, got {max_order}"),
        ));
    }

    let settings = scan_settings(&build_spec(run)?, args);
    let selection = select_order(&run.ctx, &run.config, run.bounds, max_order, &settings)?;

    let config = run.config.with_order(selection.best.order);
    let spec = ParameterSpaceBuilder::new(&config, run.bounds).build()?;
    let scan = selection.best_scan.clone();
    let summary = summarize(run, &config, &scan)?;

    Ok(ScanRun {
        config,
        spec,
        scan,
        selection: Some(selection),
        summary,
    })
}

fn endpoint_policy(fixed: Option<(f64, f64)>) -> EndpointPolicy {
    match fixed {
        Some((first, last)) => EndpointPolicy::Fixed(first, last),
        None => EndpointPolicy::Sampled,
    }
}

/// Best-fit curve, residuals, marginals and bands of a finished scan.
pub fn summarize(
    run: &PreparedRun,
    config: &FlexConfig,
    scan: &ScanResult,
) -> Result<FitSummary, AppError> {
    let eval = LikelihoodEvaluator::new(&run.ctx, config, run.bounds);
    let knots = eval.knot_set(&scan.best)?;
    let coefficients = eval.coefficients(&scan.best)?;
    let residuals = compute_residuals(&run.ctx.data, &knots, config.foreground, &coefficients)?;

    let columns = plot_columns(scan.samples.columns());
    let marginals = weighted_summary(&scan.samples, &columns)?;

    let grid = linspace(run.bounds.min, run.bounds.max, BAND_POINTS);
    let bands = curve_bands(
        &scan.samples,
        scan.order,
        run.bounds,
        endpoint_policy(config.fixed_endpoints),
        &grid,
        &DEFAULT_QUANTILES,
    )?;

    Ok(FitSummary {
        knots,
        coefficients,
        residuals,
        marginals,
        bands,
    })
}

/// Generate and write a synthetic spectrum.
pub fn simulate(args: &SimulateArgs) -> Result<SyntheticSpectrum, AppError> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = args.knots.iter().copied().unzip();
    let knots = KnotSet::new(xs, ys)?;
    let config = SyntheticConfig {
        knots,
        foreground: args.foreground,
        coefficients: args.coefficients.clone(),
        noise_sigma: args.noise_sigma,
        n_points: args.points,
        flag_fraction: args.flag_fraction,
        seed: args.seed,
    };
    let spectrum = generate_spectrum(&config)?;
    write_spectrum_csv(&args.out, &spectrum)?;
    Ok(spectrum)
}

/// Number of interior knots named by `x_i` columns.
pub fn infer_order(columns: &[String]) -> usize {
    columns
        .iter()
        .filter(|c| {
            c.strip_prefix("x_")
                .and_then(|i| i.parse::<usize>().ok())
                .is_some()
        })
        .count()
}

/// Best fit and optional bands read back from a sample CSV.
#[derive(Debug, Clone)]
pub struct SamplePlot {
    pub order: usize,
    pub grid: Vec<f64>,
    /// Table row the curve was taken from.
    pub row: usize,
    pub knots: KnotSet,
    pub bands: Option<CurveBands>,
}

/// Load a saved sample CSV and rebuild one row's curve (and bands on request).
///
/// The row is `--row` when given, otherwise the best fit.
pub fn plot_samples(args: &PlotArgs, path: &Path) -> Result<SamplePlot, AppError> {
    let (min, max) = args
        .bounds
        .ok_or_else(|| AppError::new(2, "--bounds MIN:MAX is required with --samples"))?;
    let bounds = KnotBounds::new(min, max)?;

    let table = read_samples_csv(path)?;
    let loglike = table
        .column(LOGLIKE_COLUMN)
        .map(|_| LOGLIKE_COLUMN.to_string());
    let samples = PosteriorSamples::new(table, WEIGHT_COLUMN, loglike)?;

    let order = args.order.unwrap_or_else(|| infer_order(samples.columns()));
    let endpoints = match args.fixed_endpoints {
        Some((first, last)) => EndpointPolicy::Fixed(first, last),
        None => EndpointPolicy::DefaultZero,
    }
    .resolve(samples.columns());

    let row = match args.row {
        Some(row) if row >= samples.len() => {
            return Err(AppError::new(
                2,
                format!("--row {row} is out of range ({} rows)", samples.len()),
            ));
        }
        Some(row) => row,
        None => samples
            .best_fit()
            .ok_or_else(|| AppError::new(3, "Sample CSV has no usable best-fit row."))?,
    };
    let record = samples
        .record(row)
        .ok_or_else(|| AppError::new(3, format!("Sample CSV row {row} is unreadable.")))?;
    let knots = extract(order, &record, bounds, endpoints)?;

    let grid = linspace(bounds.min, bounds.max, BAND_POINTS);
    let bands = if args.bands || args.bands_out.is_some() {
        log::info!("banding {} samples at order {order}", samples.len());
        Some(curve_bands(
            &samples,
            order,
            bounds,
            endpoints,
            &grid,
            &DEFAULT_QUANTILES,
        )?)
    } else {
        None
    };

    Ok(SamplePlot {
        order,
        grid,
        row,
        knots,
        bands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ForegroundKind;
    use crate::io::ingest::ColumnRef;

    fn data_args(path: &Path) -> DataArgs {
        DataArgs {
            data: path.to_path_buf(),
            x_column: ColumnRef::Name("frequency".to_string()),
            y_column: ColumnRef::Name("tsky".to_string()),
            weight_column: Some(ColumnRef::Name("weight".to_string())),
            skip_head: 0,
            skip_tail: 0,
            rank: 0,
            world_size: 1,
        }
    }

    fn output_args(draws: usize) -> ScanOutputArgs {
        ScanOutputArgs {
            draws: Some(draws),
            seed: 5,
            profile_foreground: false,
            samples_out: None,
            curve_out: None,
            bands_out: None,
            top: 5,
            debug_dir: "debug".into(),
            no_plot: true,
            width: 40,
            height: 10,
        }
    }

    fn trough_csv(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("trough.csv");
        simulate(&SimulateArgs {
            out: path.clone(),
            knots: vec![(50.0, 0.0), (78.0, -0.5), (100.0, 0.0)],
            foreground: ForegroundKind::None,
            coefficients: Vec::new(),
            points: 61,
            flag_fraction: 0.0,
            noise_sigma: 0.01,
            seed: 3,
        })
        .unwrap();
        path
    }

    fn trough_config() -> ConfigArgs {
        ConfigArgs {
            order: Some(1),
            knot_range: Some((-1.0, 1.0)),
            fixed_endpoints: Some((0.0, 0.0)),
            ..ConfigArgs::default()
        }
    }

    #[test]
    fn flags_override_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"order": 3, "nlive": 25, "noise_sigma": 0.1}"#).unwrap();

        let raw = load_raw_config(&ConfigArgs {
            config: Some(path),
            order: Some(2),
            ..ConfigArgs::default()
        })
        .unwrap();
        assert_eq!(raw.order, 2);
        assert_eq!(raw.nlive, 25);
        assert_eq!(raw.noise_sigma, 0.1);
        assert_eq!(raw.knot_range, (-1.0, 1.0));
    }

    #[test]
    fn bad_config_file_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_raw_config(&ConfigArgs {
            config: Some(path),
            ..ConfigArgs::default()
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn order_is_inferred_from_columns() {
        let cols: Vec<String> = ["weight", "fy_f", "v_1", "x_1", "y_1", "x_2", "y_2", "x_max"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(infer_order(&cols), 2);
    }

    #[test]
    fn prepare_uses_the_data_range_for_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let csv = trough_csv(dir.path());
        let run = prepare(&data_args(&csv), &trough_config()).unwrap();
        assert_eq!(run.bounds.min, 50.0);
        assert!((run.bounds.max - 100.0).abs() < 1e-6);
        assert_eq!(run.ctx.data.len(), 61);
    }

    #[test]
    fn evaluate_point_completes_derived_knots() {
        let dir = tempfile::tempdir().unwrap();
        let csv = trough_csv(dir.path());
        let run = prepare(&data_args(&csv), &trough_config()).unwrap();

        let (ll, values) = evaluate_point(
            &run,
            &[("v_1".to_string(), 0.5), ("y_1".to_string(), -0.5)],
        )
        .unwrap();
        assert!(ll.is_finite());
        assert!((values["x_1"] - 75.0).abs() < 1e-6);
        assert_eq!(values["fy_f"], 0.0);
    }

    #[test]
    fn fixed_order_scan_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let csv = trough_csv(dir.path());
        let run = prepare(&data_args(&csv), &trough_config()).unwrap();

        let out = run_fixed_order(&run, &output_args(400)).unwrap();
        assert_eq!(out.scan.evaluated, 400);
        assert_eq!(out.summary.knots.order(), 1);
        assert_eq!(out.summary.residuals.len(), 61);
        assert_eq!(out.summary.bands.grid.len(), BAND_POINTS);
        assert!(out.selection.is_none());

        // The best draw puts the single knot inside the trough.
        let x1 = out.summary.knots.xs()[1];
        assert!(x1 > 60.0 && x1 < 95.0, "x_1 = {x1}");
    }

    #[test]
    fn exported_samples_plot_back_to_the_same_best_fit() {
        let dir = tempfile::tempdir().unwrap();
        let csv = trough_csv(dir.path());
        let run = prepare(&data_args(&csv), &trough_config()).unwrap();
        let out = run_fixed_order(&run, &output_args(300)).unwrap();

        let samples = dir.path().join("samples.csv");
        crate::io::export::write_samples_csv(&samples, &out.scan.samples).unwrap();

        let args = PlotArgs {
            curve: None,
            samples: Some(samples.clone()),
            order: None,
            bounds: Some((run.bounds.min, run.bounds.max)),
            fixed_endpoints: None,
            row: None,
            bands: true,
            bands_out: None,
            width: 40,
            height: 10,
        };
        let plot = plot_samples(&args, &samples).unwrap();
        assert_eq!(plot.order, 1);
        let expected = out.summary.knots.xs()[1];
        assert_eq!(plot.row, out.scan.best_index);
        assert!((plot.knots.xs()[1] - expected).abs() < 1e-9 * expected.abs());
        let bands = plot.bands.unwrap();
        assert_eq!(bands.quantiles.len(), 3);
        assert_eq!(bands.grid.len(), BAND_POINTS);
    }

    #[test]
    fn any_exported_row_can_be_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let csv = trough_csv(dir.path());
        let run = prepare(&data_args(&csv), &trough_config()).unwrap();
        let out = run_fixed_order(&run, &output_args(300)).unwrap();

        let samples = dir.path().join("samples.csv");
        crate::io::export::write_samples_csv(&samples, &out.scan.samples).unwrap();

        let x1 = out.scan.samples.column("x_1").unwrap();
        let row = (0..x1.len())
            .find(|&i| i != out.scan.best_index && x1[i].is_finite())
            .unwrap();
        let mut args = PlotArgs {
            curve: None,
            samples: Some(samples.clone()),
            order: None,
            bounds: Some((run.bounds.min, run.bounds.max)),
            fixed_endpoints: None,
            row: Some(row),
            bands: false,
            bands_out: None,
            width: 40,
            height: 10,
        };
        let plot = plot_samples(&args, &samples).unwrap();
        assert_eq!(plot.row, row);
        assert!(plot.bands.is_none());
        let expected = x1[row];
        assert!((plot.knots.xs()[1] - expected).abs() < 1e-9 * expected.abs());

        args.row = Some(x1.len());
        assert_eq!(plot_samples(&args, &samples).unwrap_err().exit_code(), 2);
    }
}
