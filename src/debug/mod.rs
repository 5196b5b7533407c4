//! Diagnostics bundle: a markdown dump of one run for offline inspection.
//!
//! Written only when `write_diagnostics` is set, and only by the root rank.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::{FlexConfig, RunContext};
use crate::error::AppError;
use crate::fit::params::{ParamKind, ParameterSpec};
use crate::fit::scan::ScanResult;
use crate::fit::selection::OrderSelection;

/// Write the bundle into `dir`. Returns `None` on non-root ranks.
pub fn write_debug_bundle(
    dir: &Path,
    ctx: &RunContext,
    config: &FlexConfig,
    spec: &ParameterSpec,
    scan: &ScanResult,
    selection: Option<&OrderSelection>,
) -> Result<Option<PathBuf>, AppError> {
    if !ctx.is_root() {
        log::debug!("rank {} skips the debug bundle", ctx.rank);
        return Ok(None);
    }

    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("flexknot_debug_order{}_{ts}.md", spec.order()));
    let mut file = File::create(&path)
        .map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;

    let io = |e: std::io::Error| AppError::new(4, format!("Failed to write debug: {e}"));

    writeln!(file, "# flexknot debug bundle").map_err(io)?;
    writeln!(file, "- generated: {}", Local::now().to_rfc3339()).map_err(io)?;
    writeln!(file, "- ranks: {}/{}", ctx.rank, ctx.size).map_err(io)?;
    let stats = ctx.data.stats();
    writeln!(
        file,
        "- data: n={} | x=[{:.4}, {:.4}] | y=[{:.6}, {:.6}]",
        stats.n_points, stats.x_min, stats.x_max, stats.y_min, stats.y_max
    )
    .map_err(io)?;

    let config_json = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::new(4, format!("Failed to serialize config: {e}")))?;
    writeln!(file, "\n## Configuration\n```json\n{config_json}\n```").map_err(io)?;

    writeln!(file, "\n## Parameters").map_err(io)?;
    writeln!(file, "| name | kind | range | label | dropped |").map_err(io)?;
    writeln!(file, "| - | - | - | - | - |").map_err(io)?;
    for p in spec.params() {
        let (kind, range) = match &p.kind {
            ParamKind::Sampled { min, max } => ("sampled", format!("[{min}, {max}]")),
            ParamKind::Fixed { value } => ("fixed", format!("{value}")),
            ParamKind::Derived { min, max, .. } => ("derived", format!("[{min}, {max}]")),
        };
        writeln!(
            file,
            "| {} | {kind} | {range} | {} | {} |",
            p.name, p.label, p.drop
        )
        .map_err(io)?;
    }
    writeln!(file, "\nLikelihood inputs: {}", spec.input_params().join(", ")).map_err(io)?;

    writeln!(file, "\n## Scan").map_err(io)?;
    writeln!(file, "- draws: {}", scan.evaluated).map_err(io)?;
    writeln!(file, "- rejected: {}", scan.rejected).map_err(io)?;
    writeln!(file, "- effective samples: {:.2}", scan.effective_samples).map_err(io)?;
    writeln!(file, "- max logL: {:.6}", scan.max_log_likelihood).map_err(io)?;

    writeln!(file, "\n### Best point (draw #{})", scan.best_index).map_err(io)?;
    writeln!(file, "| name | value |").map_err(io)?;
    writeln!(file, "| - | - |").map_err(io)?;
    let mut best: Vec<(&String, &f64)> = scan.best.iter().collect();
    best.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in best {
        writeln!(file, "| {name} | {} |", fmt_value(*value)).map_err(io)?;
    }

    if let Some(selection) = selection {
        writeln!(file, "\n## Order selection").map_err(io)?;
        writeln!(file, "| order | k | max logL | BIC | rejected |").map_err(io)?;
        writeln!(file, "| - | - | - | - | - |").map_err(io)?;
        for fit in &selection.fits {
            let mark = if fit.order == selection.best.order { " (chosen)" } else { "" };
            writeln!(
                file,
                "| {}{mark} | {} | {:.6} | {:.3} | {} |",
                fit.order, fit.parameters, fit.max_log_likelihood, fit.bic, fit.rejected
            )
            .map_err(io)?;
        }
        for (order, reason) in &selection.skipped {
            writeln!(file, "- skipped order {order}: {reason}").map_err(io)?;
        }
    }

    log::info!("wrote debug bundle {}", path.display());
    Ok(Some(path))
}

fn fmt_value(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        "-".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataSeries, KnotBounds, KnotSet, RawConfig};
    use crate::fit::likelihood::LikelihoodEvaluator;
    use crate::fit::params::ParameterSpaceBuilder;
    use crate::fit::scan::{ForegroundMode, ScanSettings, run_scan};
    use crate::math::Pchip;

    fn peak_data() -> DataSeries {
        let knots = KnotSet::new(vec![0.0, 5.0, 10.0], vec![0.0, 10.0, 0.0]).unwrap();
        let x: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        let y = Pchip::new(knots).unwrap().eval_many(&x).unwrap();
        DataSeries::new(x, y).unwrap()
    }

    fn config() -> FlexConfig {
        FlexConfig::try_from(RawConfig {
            order: 1,
            knot_range: (0.0, 12.0),
            fixed_endpoints: Some((0.0, 0.0)),
            write_diagnostics: true,
            ..RawConfig::default()
        })
        .unwrap()
    }

    fn scan(ctx: &RunContext, cfg: &FlexConfig) -> (ParameterSpec, ScanResult) {
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let spec = ParameterSpaceBuilder::new(cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(ctx, cfg, bounds);
        let settings = ScanSettings {
            draws: 200,
            seed: 3,
            foreground: ForegroundMode::Sampled,
        };
        let result = run_scan(&spec, &eval, &settings).unwrap();
        (spec, result)
    }

    #[test]
    fn root_rank_writes_markdown_bundle() {
        let ctx = RunContext::single(peak_data());
        let cfg = config();
        let (spec, result) = scan(&ctx, &cfg);

        let dir = tempfile::tempdir().unwrap();
        let path = write_debug_bundle(dir.path(), &ctx, &cfg, &spec, &result, None)
            .unwrap()
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("# flexknot debug bundle\n"));
        assert!(text.contains("| x_1 | derived | [0, 10] |"));
        assert!(text.contains("| fy_f | fixed | 0 |"));
        assert!(text.contains("- draws: 200"));
        assert!(!text.contains("## Order selection"));
    }

    #[test]
    fn other_ranks_write_nothing() {
        let ctx = RunContext::new(peak_data(), 1, 2).unwrap();
        let cfg = config();
        let (spec, result) = scan(&ctx, &cfg);

        let dir = tempfile::tempdir().unwrap();
        let out = write_debug_bundle(dir.path(), &ctx, &cfg, &spec, &result, None).unwrap();
        assert!(out.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
