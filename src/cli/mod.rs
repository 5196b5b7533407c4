//! Command-line parsing for the flexknot fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! modeling/math code. Flags that mirror configuration fields are optional so
//! they can override a JSON config file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ForegroundKind;
use crate::io::ingest::ColumnRef;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "flexknot",
    version,
    about = "Free-form (flexknot) reconstruction of a global 21-cm signal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the parameter declaration for a configuration as JSON.
    Params(ParamsArgs),
    /// Evaluate the log-likelihood at one point (`--set name=value`).
    Eval(EvalArgs),
    /// Run a prior scan at a fixed order and report the best curve.
    Scan(ScanArgs),
    /// Scan every order up to `--max-order` and select one by BIC.
    Select(SelectArgs),
    /// Generate a synthetic spectrum CSV from known knots.
    Simulate(SimulateArgs),
    /// Plot a saved curve JSON, or the best fit (and bands) of a sample CSV.
    Plot(PlotArgs),
}

/// Where the observed spectrum comes from.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Spectrum CSV (with a header row).
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Frequency column (0-based index or header name).
    #[arg(long, default_value = "0")]
    pub x_column: ColumnRef,

    /// Temperature column (0-based index or header name).
    #[arg(long, default_value = "2")]
    pub y_column: ColumnRef,

    /// Weight column; rows with weight <= 0 are dropped.
    #[arg(long)]
    pub weight_column: Option<ColumnRef>,

    /// Data rows discarded from the start of the file.
    #[arg(long, default_value_t = 0)]
    pub skip_head: usize,

    /// Data rows discarded from the end of the file.
    #[arg(long, default_value_t = 0)]
    pub skip_tail: usize,

    /// Rank of this process (only rank 0 prints and writes files).
    #[arg(long, default_value_t = 0)]
    pub rank: usize,

    /// Number of cooperating processes.
    #[arg(long, default_value_t = 1)]
    pub world_size: usize,
}

/// Run configuration: an optional JSON file, overridden by flags.
#[derive(Debug, Args, Clone, Default)]
pub struct ConfigArgs {
    /// JSON configuration file.
    #[arg(long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Number of interior knots.
    #[arg(long, allow_hyphen_values = true)]
    pub order: Option<i64>,

    /// Prior range of every knot y-value, `MIN:MAX`.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub knot_range: Option<(f64, f64)>,

    /// Foreground model.
    #[arg(long, value_enum)]
    pub foreground: Option<ForegroundKind>,

    /// Prior range of one foreground coefficient, `MIN:MAX` (repeat in order).
    #[arg(long = "fg-prior", value_parser = parse_pair, allow_hyphen_values = true)]
    pub fg_priors: Vec<(f64, f64)>,

    /// Gaussian noise level (K).
    #[arg(long)]
    pub noise_sigma: Option<f64>,

    /// Hold the endpoint knot y-values at `FIRST:LAST` instead of sampling them.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub fixed_endpoints: Option<(f64, f64)>,

    /// Padding beyond the data range for the endpoint knot x-locations (MHz).
    #[arg(long)]
    pub border: Option<f64>,

    /// Live points; the scan draws 50 points per live point by default.
    #[arg(long)]
    pub nlive: Option<usize>,

    /// Write a markdown diagnostics bundle.
    #[arg(long)]
    pub write_diagnostics: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ParamsArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Also write the JSON to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct EvalArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// A sampled parameter value, `name=value` (repeatable).
    #[arg(long = "set", value_parser = parse_assignment, allow_hyphen_values = true)]
    pub values: Vec<(String, f64)>,
}

/// Scan budget and result outputs shared by `scan` and `select`.
#[derive(Debug, Args, Clone)]
pub struct ScanOutputArgs {
    /// Number of prior draws (default: nlive * 50).
    #[arg(long)]
    pub draws: Option<usize>,

    /// Random seed for the scan.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Solve linear foreground coefficients per draw instead of sampling them.
    #[arg(long)]
    pub profile_foreground: bool,

    /// Export the weighted samples to CSV.
    #[arg(long)]
    pub samples_out: Option<PathBuf>,

    /// Export the best curve to JSON.
    #[arg(long)]
    pub curve_out: Option<PathBuf>,

    /// Export signal quantile bands to CSV.
    #[arg(long)]
    pub bands_out: Option<PathBuf>,

    /// Show the channels with the largest residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Directory for the diagnostics bundle.
    #[arg(long, default_value = "debug")]
    pub debug_dir: PathBuf,

    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = crate::plot::DEFAULT_WIDTH)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = crate::plot::DEFAULT_HEIGHT)]
    pub height: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ScanArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub output: ScanOutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SelectArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub output: ScanOutputArgs,

    /// Largest order to try.
    #[arg(long, default_value_t = 5)]
    pub max_order: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output CSV (`frequency,weight,tsky`).
    #[arg(long)]
    pub out: PathBuf,

    /// True knot `X:Y` (repeat, ascending x; the first and last span the band).
    #[arg(long = "knot", value_parser = parse_pair, allow_hyphen_values = true, required = true)]
    pub knots: Vec<(f64, f64)>,

    /// Foreground model added to the signal.
    #[arg(long, value_enum, default_value_t = ForegroundKind::None)]
    pub foreground: ForegroundKind,

    /// Foreground coefficient (repeat in order).
    #[arg(long = "coef", allow_hyphen_values = true)]
    pub coefficients: Vec<f64>,

    /// Number of channels.
    #[arg(long, default_value_t = 201)]
    pub points: usize,

    /// Fraction of channels flagged with zero weight.
    #[arg(long, default_value_t = 0.0)]
    pub flag_fraction: f64,

    /// Noise level (K).
    #[arg(long, default_value_t = 0.025)]
    pub noise_sigma: f64,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

/// Options for plotting saved results.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Curve JSON written by `--curve-out`.
    #[arg(long, value_name = "JSON", conflicts_with = "samples", required_unless_present = "samples")]
    pub curve: Option<PathBuf>,

    /// Sample CSV written by `--samples-out`.
    #[arg(long, value_name = "CSV")]
    pub samples: Option<PathBuf>,

    /// Knot count of the samples (default: inferred from the `x_i` columns).
    #[arg(long)]
    pub order: Option<usize>,

    /// Endpoint knot x-locations `MIN:MAX` used when the samples were drawn.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true, requires = "samples")]
    pub bounds: Option<(f64, f64)>,

    /// Endpoint y-values when they were held fixed, `FIRST:LAST`.
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub fixed_endpoints: Option<(f64, f64)>,

    /// Plot this sample row (0-based) instead of the best fit.
    #[arg(long, requires = "samples")]
    pub row: Option<usize>,

    /// Draw 2.5%/97.5% quantile bands around the plotted curve.
    #[arg(long, requires = "samples")]
    pub bands: bool,

    /// Export the quantile bands to CSV.
    #[arg(long, requires = "samples")]
    pub bands_out: Option<PathBuf>,

    /// Plot width (columns).
    #[arg(long, default_value_t = crate::plot::DEFAULT_WIDTH)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = crate::plot::DEFAULT_HEIGHT)]
    pub height: usize,
}

/// Parse `A:B` into two floats.
pub fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected MIN:MAX, got '{s}'"))?;
    let a: f64 = a
        .trim()
        .parse()
        .map_err(|e| format!("invalid number '{a}': {e}"))?;
    let b: f64 = b
        .trim()
        .parse()
        .map_err(|e| format!("invalid number '{b}': {e}"))?;
    Ok((a, b))
}

/// Parse `name=value`.
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{name}': {e}"))?;
    Ok((name.to_string(), value))
}
