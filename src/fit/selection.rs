//! Order selection using BIC with guardrails.
//!
//! For each candidate order the prior scan is run and:
//! - BIC = -2 * max logL + k * ln(n), with `k` the sampled dimension
//!
//! Selection rules:
//! 1. Skip underdetermined orders: require `n >= k + 5`
//! 2. Choose the order with minimum BIC
//! 3. If a lower order is within 2 BIC points of the best, pick the lower order

use crate::domain::{FlexConfig, KnotBounds, RunContext};
use crate::error::FlexError;
use crate::fit::likelihood::LikelihoodEvaluator;
use crate::fit::params::ParameterSpaceBuilder;
use crate::fit::scan::{ScanResult, ScanSettings, run_scan};

/// Minimum number of extra observations beyond parameter count.
const MIN_N_BUFFER: usize = 5;

/// A lower order within this many BIC points of the best is preferred.
const BIC_TOLERANCE: f64 = 2.0;

/// Quality of the scan at one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFit {
    pub order: usize,
    pub parameters: usize,
    pub max_log_likelihood: f64,
    pub bic: f64,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
pub struct OrderSelection {
    pub best: OrderFit,
    /// Scan output for the selected order.
    pub best_scan: ScanResult,
    /// Fits for all attempted orders, ascending.
    pub fits: Vec<OrderFit>,
    /// Orders that were skipped and why.
    pub skipped: Vec<(usize, String)>,
}

pub fn bic(n: usize, max_log_likelihood: f64, k: usize) -> f64 {
    -2.0 * max_log_likelihood + (k as f64) * (n as f64).ln()
}

/// Pick from `fits` (ascending order). Returns an index into `fits`.
pub fn select_by_bic(fits: &[OrderFit]) -> Option<usize> {
    let best_bic = fits
        .iter()
        .map(|f| f.bic)
        .filter(|b| b.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !best_bic.is_finite() {
        return None;
    }
    fits.iter().position(|f| f.bic <= best_bic + BIC_TOLERANCE)
}

/// Scan every order in `0..=max_order` and select one.
pub fn select_order(
    ctx: &RunContext,
    config: &FlexConfig,
    bounds: KnotBounds,
    max_order: usize,
    settings: &ScanSettings,
) -> Result<OrderSelection, FlexError> {
    let n = ctx.data.len();
    let mut fits = Vec::new();
    let mut scans = Vec::new();
    let mut skipped = Vec::new();

    for order in 0..=max_order {
        let cfg = config.with_order(order);
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build()?;
        let k = spec.dimension();
        if n < k + MIN_N_BUFFER {
            skipped.push((
                order,
                format!("Underdetermined: n={n} < k+{MIN_N_BUFFER}={}", k + MIN_N_BUFFER),
            ));
            continue;
        }

        let eval = LikelihoodEvaluator::new(ctx, &cfg, bounds);
        let scan_settings = ScanSettings {
            seed: settings.seed.wrapping_add(order as u64),
            ..settings.clone()
        };
        let scan = run_scan(&spec, &eval, &scan_settings)?;

        fits.push(OrderFit {
            order,
            parameters: k,
            max_log_likelihood: scan.max_log_likelihood,
            bic: bic(n, scan.max_log_likelihood, k),
            rejected: scan.rejected,
        });
        scans.push(scan);
    }

    if fits.is_empty() {
        return Err(FlexError::InvalidData(
            "insufficient data to fit any order after guardrails".to_string(),
        ));
    }

    let idx = select_by_bic(&fits).ok_or(FlexError::NonFinite { what: "BIC" })?;
    log::info!("selected order {} (BIC {:.3})", fits[idx].order, fits[idx].bic);

    let best = fits[idx].clone();
    let best_scan = scans.swap_remove(idx);
    Ok(OrderSelection {
        best,
        best_scan,
        fits,
        skipped,
    })
}
