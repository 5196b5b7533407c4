//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs the pipeline for the chosen subcommand
//! - prints reports/plots (root rank only)
//! - writes optional exports

use clap::Parser;

use crate::cli::{
    Command, EvalArgs, ParamsArgs, PlotArgs, ScanArgs, ScanOutputArgs, SelectArgs, SimulateArgs,
};
use crate::error::AppError;
use crate::fit::posterior::CurveBands;
use crate::plot::{PlotCapability, PlotInput, Renderer};

pub mod pipeline;

use pipeline::{PreparedRun, ScanRun};

/// Entry point for the `flexknot` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Params(args) => handle_params(args),
        Command::Eval(args) => handle_eval(args),
        Command::Scan(args) => handle_scan(args),
        Command::Select(args) => handle_select(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_params(args: ParamsArgs) -> Result<(), AppError> {
    let run = pipeline::prepare(&args.data, &args.config)?;
    let spec = pipeline::build_spec(&run)?;
    if !run.ctx.is_root() {
        return Ok(());
    }

    let json = spec.to_json_pretty();
    println!("{json}");
    if let Some(path) = &args.out {
        std::fs::write(path, format!("{json}\n")).map_err(|e| {
            AppError::new(2, format!("Failed to write '{}': {e}", path.display()))
        })?;
    }
    Ok(())
}

fn handle_eval(args: EvalArgs) -> Result<(), AppError> {
    let run = pipeline::prepare(&args.data, &args.config)?;
    let (ll, values) = pipeline::evaluate_point(&run, &args.values)?;
    if !run.ctx.is_root() {
        return Ok(());
    }

    let mut names: Vec<&String> = values.keys().collect();
    names.sort();
    for name in names {
        println!("{name} = {}", values[name]);
    }
    println!("logL = {ll}");
    Ok(())
}

fn handle_scan(args: ScanArgs) -> Result<(), AppError> {
    let run = pipeline::prepare(&args.data, &args.config)?;
    let result = pipeline::run_fixed_order(&run, &args.output)?;
    finish_scan(&run, &result, &args.output)
}

fn handle_select(args: SelectArgs) -> Result<(), AppError> {
    let run = pipeline::prepare(&args.data, &args.config)?;
    let result = pipeline::run_order_selection(&run, &args.output, args.max_order)?;
    finish_scan(&run, &result, &args.output)
}

/// Print and export the outcome of `scan`/`select`.
fn finish_scan(run: &PreparedRun, result: &ScanRun, output: &ScanOutputArgs) -> Result<(), AppError> {
    if result.config.write_diagnostics {
        crate::debug::write_debug_bundle(
            &output.debug_dir,
            &run.ctx,
            &result.config,
            &result.spec,
            &result.scan,
            result.selection.as_ref(),
        )?;
    }
    if !run.ctx.is_root() {
        return Ok(());
    }

    let summary = &result.summary;
    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &result.config, run.bounds, &result.scan)
    );
    if let Some(selection) = &result.selection {
        println!("{}", crate::report::format_order_selection(selection));
    }
    println!("Best knots:");
    println!("{}", crate::report::format_knot_table(&summary.knots));
    print!(
        "{}",
        crate::report::format_foreground(result.config.foreground, &summary.coefficients)
    );
    println!(
        "RMS residual: {:.5} K\n",
        crate::report::rms(&summary.residuals)
    );
    println!("Posterior marginals:");
    println!("{}", crate::report::format_marginals(&summary.marginals));
    if output.top > 0 {
        println!("Largest residuals:");
        let top = crate::report::largest_residuals(&summary.residuals, output.top);
        println!("{}", crate::report::format_residuals(&top));
    }

    let renderer = Renderer::new(PlotCapability::resolve(
        output.no_plot,
        output.width,
        output.height,
    ));
    if renderer.is_available() {
        // Foreground-subtracted data against the signal.
        let points: Vec<(f64, f64)> = summary
            .residuals
            .iter()
            .map(|r| (r.x, r.y_obs - foreground_at(result, r.x)))
            .collect();
        let curve = knot_curve(&summary.knots, &summary.bands.grid)?;
        if let Some(txt) = render_bands(&renderer, &points, Some(curve.as_slice()), &summary.bands) {
            println!("{txt}");
        }
    }

    if let Some(path) = &output.samples_out {
        crate::io::export::write_samples_csv(path, &result.scan.samples)?;
        log::info!("wrote samples to {}", path.display());
    }
    if let Some(path) = &output.bands_out {
        crate::io::export::write_bands_csv(path, &summary.bands)?;
    }
    if let Some(path) = &output.curve_out {
        let curve = crate::io::curve::build_curve_file(
            &summary.knots,
            result.config.foreground,
            summary.coefficients.clone(),
            Some(result.scan.max_log_likelihood),
        )?;
        crate::io::curve::write_curve_json(path, &curve)?;
    }

    Ok(())
}

fn foreground_at(result: &ScanRun, x: f64) -> f64 {
    crate::models::predict(result.config.foreground, x, &result.summary.coefficients)
}

fn knot_curve(knots: &crate::domain::KnotSet, grid: &[f64]) -> Result<Vec<(f64, f64)>, AppError> {
    let ys = crate::math::Pchip::new(knots.clone())?.eval_many(grid)?;
    Ok(grid.iter().copied().zip(ys).collect())
}

/// Lower and upper band edges as plottable series (first and last quantile).
fn band_edges(bands: &CurveBands) -> Option<(Vec<(f64, f64)>, Vec<(f64, f64)>)> {
    let lower = bands.bands.first()?;
    let upper = bands.bands.last()?;
    let zip = |b: &[f64]| -> Vec<(f64, f64)> {
        bands.grid.iter().copied().zip(b.iter().copied()).collect()
    };
    Some((zip(lower), zip(upper)))
}

fn render_bands(
    renderer: &Renderer,
    points: &[(f64, f64)],
    curve: Option<&[(f64, f64)]>,
    bands: &CurveBands,
) -> Option<String> {
    let edges = band_edges(bands);
    renderer.render(&PlotInput {
        points,
        curve,
        lower: edges.as_ref().map(|(l, _)| l.as_slice()),
        upper: edges.as_ref().map(|(_, u)| u.as_slice()),
    })
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spectrum = pipeline::simulate(&args)?;
    let flagged = spectrum.weight.iter().filter(|w| **w == 0.0).count();
    println!(
        "Wrote {} channels ({flagged} flagged) to {}",
        spectrum.frequency.len(),
        args.out.display()
    );
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let renderer = Renderer::new(PlotCapability::resolve(false, args.width, args.height));

    if let Some(path) = &args.curve {
        let curve = crate::io::curve::read_curve_json(path)?;
        let knots = crate::io::curve::curve_knots(&curve)?;
        let series: Vec<(f64, f64)> = curve
            .grid
            .x
            .iter()
            .copied()
            .zip(curve.grid.y.iter().copied())
            .collect();
        let knot_points: Vec<(f64, f64)> = knots.knots().map(|k| (k.x, k.y)).collect();
        if let Some(txt) = renderer.render(&PlotInput {
            points: &knot_points,
            curve: Some(series.as_slice()),
            ..PlotInput::default()
        }) {
            println!("{txt}");
        }
        println!("{}", crate::report::format_knot_table(&knots));
        print!(
            "{}",
            crate::report::format_foreground(curve.foreground, &curve.coefficients)
        );
        return Ok(());
    }

    let Some(path) = &args.samples else {
        return Err(AppError::new(2, "Either --curve or --samples is required."));
    };
    let plot = pipeline::plot_samples(&args, path)?;
    match args.row {
        Some(_) => println!("Sample row {} (order {}):", plot.row, plot.order),
        None => println!("Best sample, row {} (order {}):", plot.row, plot.order),
    }
    println!("{}", crate::report::format_knot_table(&plot.knots));

    let curve = knot_curve(&plot.knots, &plot.grid)?;
    let txt = match &plot.bands {
        Some(bands) => {
            if bands.skipped > 0 {
                log::warn!("{} samples skipped while banding", bands.skipped);
            }
            render_bands(&renderer, &[], Some(curve.as_slice()), bands)
        }
        None => renderer.render(&PlotInput {
            curve: Some(curve.as_slice()),
            ..PlotInput::default()
        }),
    };
    if let Some(txt) = txt {
        println!("{txt}");
    }
    if let (Some(out), Some(bands)) = (&args.bands_out, &plot.bands) {
        crate::io::export::write_bands_csv(out, bands)?;
    }
    Ok(())
}
