//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized (the tables below have snapshot tests)

use crate::domain::{FlexConfig, ForegroundKind, KnotBounds, KnotSet};
use crate::fit::posterior::Marginal;
use crate::fit::scan::ScanResult;
use crate::fit::selection::{OrderFit, OrderSelection};
use crate::io::ingest::IngestedData;

use super::ChannelResidual;

/// Format the run summary: dataset, configuration, and scan diagnostics.
pub fn format_run_summary(
    ingest: &IngestedData,
    config: &FlexConfig,
    bounds: KnotBounds,
    scan: &ScanResult,
) -> String {
    let mut out = String::new();

    out.push_str("=== flexknot - free-form signal reconstruction ===\n");
    out.push_str(&format!(
        "Rows: read={} used={} flagged={} errors={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.rows_flagged,
        ingest.row_errors.len()
    ));
    out.push_str(&format!(
        "Points: n={} | x=[{:.3}, {:.3}] MHz | y=[{:.4}, {:.4}] K\n",
        ingest.stats.n_points,
        ingest.stats.x_min,
        ingest.stats.x_max,
        ingest.stats.y_min,
        ingest.stats.y_max
    ));
    out.push_str(&format!(
        "Knot bounds: [{:.3}, {:.3}] | knot y range: [{}, {}]\n",
        bounds.min, bounds.max, config.knot_range.0, config.knot_range.1
    ));
    out.push_str(&format!(
        "Foreground: {} | sigma={} | endpoints={}\n",
        config.foreground.name(),
        config.noise_sigma,
        match config.fixed_endpoints {
            Some((f, l)) => format!("fixed ({f}, {l})"),
            None => "sampled".to_string(),
        }
    ));

    out.push_str("\nScan diagnostics:\n");
    out.push_str(&format!("- order     : {}\n", scan.order));
    out.push_str(&format!(
        "- draws     : {} ({} rejected)\n",
        scan.evaluated, scan.rejected
    ));
    out.push_str(&format!("- ESS       : {:.1}\n", scan.effective_samples));
    out.push_str(&format!("- max logL  : {:.4}\n", scan.max_log_likelihood));
    out.push_str(&format!("- best draw : #{}\n", scan.best_index));
    out.push('\n');

    out
}

/// Format the knot positions of one curve, endpoints included.
pub fn format_knot_table(knots: &KnotSet) -> String {
    let mut out = String::new();
    push_line(&mut out, format!("{:<6} {:>12} {:>12}", "knot", "x", "y"));
    push_line(&mut out, format!("{:-<6} {:-<12} {:-<12}", "", "", ""));

    let last = knots.len().saturating_sub(1);
    for (i, k) in knots.knots().enumerate() {
        let label = match i {
            0 => "first".to_string(),
            i if i == last => "last".to_string(),
            i => i.to_string(),
        };
        push_line(&mut out, format!("{label:<6} {:>12.4} {:>12.6}", k.x, k.y));
    }
    out
}

/// Format foreground coefficients, or a one-liner when there are none.
pub fn format_foreground(kind: ForegroundKind, coefficients: &[f64]) -> String {
    if coefficients.is_empty() {
        return format!("Foreground {}: no coefficients\n", kind.name());
    }
    format!("Foreground {}: {}\n", kind.name(), fmt_vec(coefficients))
}

/// Format weighted posterior means and standard deviations.
pub fn format_marginals(marginals: &[Marginal]) -> String {
    let mut out = String::new();
    push_line(&mut out, format!("{:<12} {:>14} {:>14}", "param", "mean", "std"));
    push_line(&mut out, format!("{:-<12} {:-<14} {:-<14}", "", "", ""));
    for m in marginals {
        push_line(
            &mut out,
            format!("{:<12} {:>14.6} {:>14.6}", truncate(&m.name, 12), m.mean, m.std),
        );
    }
    out
}

/// Format the per-order table of an order selection.
pub fn format_order_selection(selection: &OrderSelection) -> String {
    format_order_fits(&selection.fits, selection.best.order, &selection.skipped)
}

fn format_order_fits(fits: &[OrderFit], chosen: usize, skipped: &[(usize, String)]) -> String {
    let mut out = String::new();
    out.push_str("Order diagnostics:\n");
    for fit in fits {
        let mark = if fit.order == chosen { "*" } else { " " };
        push_line(
            &mut out,
            format!(
                "{mark} order={:<3} k={:<3} maxlogL={:.3} BIC={:.3} rejected={}",
                fit.order, fit.parameters, fit.max_log_likelihood, fit.bic, fit.rejected
            ),
        );
    }
    for (order, reason) in skipped {
        push_line(&mut out, format!("  (skipped order {order}) {reason}"));
    }
    out
}

/// Format the worst channels of a fit.
pub fn format_residuals(rows: &[ChannelResidual]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!("{:>10} {:>12} {:>12} {:>12}", "x", "y_obs", "y_fit", "residual"),
    );
    push_line(&mut out, format!("{:-<10} {:-<12} {:-<12} {:-<12}", "", "", "", ""));
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:>10.3} {:>12.5} {:>12.5} {:>12.5}",
                r.x, r.y_obs, r.y_fit, r.residual
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}
