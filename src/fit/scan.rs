//! Prior scan: a small, deterministic sampler for driving the likelihood
//! without an external nested-sampling engine.
//!
//! Every sampled parameter is drawn uniformly from its prior with a seeded
//! RNG. Draws are scored in parallel and reduced in draw order, so the result
//! only depends on the seed. Each draw gets an importance weight
//! `exp(logL - max logL)`, which makes the output a valid (if inefficient)
//! weighted posterior sample for uniform priors.
//!
//! With [`ForegroundMode::Profiled`] the foreground coefficients are not
//! drawn but solved by least squares for each draw's signal. Sampling a
//! five-term log-polynomial with `±1e5` priors is hopeless otherwise.

use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::domain::Assignment;
use crate::error::FlexError;
use crate::fit::likelihood::{Likelihood, PENALTY};
use crate::fit::params::{ParamKind, ParameterSpec};
use crate::fit::posterior::{LOGLIKE_COLUMN, PosteriorSamples, SampleTable, WEIGHT_COLUMN};

/// Draws per live point when no explicit count is given.
pub const DRAWS_PER_LIVE_POINT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundMode {
    /// Draw coefficients from their priors like any other parameter.
    Sampled,
    /// Solve linear coefficients for every draw.
    Profiled,
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub draws: usize,
    pub seed: u64,
    pub foreground: ForegroundMode,
}

impl ScanSettings {
    /// Default draw budget for a spec: `nlive * 50`.
    pub fn for_spec(spec: &ParameterSpec, seed: u64) -> Self {
        Self {
            draws: spec.sampler().nlive.saturating_mul(DRAWS_PER_LIVE_POINT),
            seed,
            foreground: ForegroundMode::Sampled,
        }
    }
}

/// Outcome of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub order: usize,
    pub samples: PosteriorSamples,
    /// Complete assignment (sampled, fixed and derived values) of the best draw.
    pub best: Assignment,
    pub best_index: usize,
    pub max_log_likelihood: f64,
    pub evaluated: usize,
    pub rejected: usize,
    /// Kish effective sample size of the importance weights.
    pub effective_samples: f64,
}

/// Draw `count` prior points, skipping `skip` names.
fn draw_points(spec: &ParameterSpec, count: usize, seed: u64, skip: &[String]) -> Vec<Assignment> {
    let mut rng = StdRng::seed_from_u64(seed);
    let priors: Vec<(&str, f64, f64)> = spec
        .params()
        .iter()
        .filter(|p| !skip.contains(&p.name))
        .filter_map(|p| match p.kind {
            ParamKind::Sampled { min, max } => Some((p.name.as_str(), min, max)),
            _ => None,
        })
        .collect();

    (0..count)
        .map(|_| {
            priors
                .iter()
                .map(|&(name, min, max)| (name.to_string(), rng.gen_range(min..max)))
                .collect()
        })
        .collect()
}

fn score_point(
    spec: &ParameterSpec,
    likelihood: &dyn Likelihood,
    profile: bool,
    values: &mut Assignment,
) -> Result<f64, FlexError> {
    if profile {
        // Placeholders so `complete` sees every sampled name; overwritten below.
        for name in spec.foreground_inputs() {
            values.insert(name.clone(), 0.0);
        }
    }
    match spec.complete(values) {
        Ok(()) => {}
        Err(err) if err.is_numeric() => {
            if profile {
                for name in spec.foreground_inputs() {
                    values.insert(name.clone(), f64::NAN);
                }
            }
            return Ok(likelihood.reject(&err));
        }
        Err(err) => return Err(err),
    }

    if profile {
        match likelihood.profile_foreground(values) {
            Ok(Some(coeffs)) => {
                for (name, c) in spec.foreground_inputs().iter().zip(coeffs) {
                    values.insert(name.clone(), c);
                }
            }
            Ok(None) => {
                return Err(FlexError::InvalidSetting {
                    name: "foreground_mode",
                    value: "profiled".to_string(),
                    reason: "the foreground model is not linear and cannot be profiled",
                });
            }
            Err(err) if err.is_numeric() => {
                for name in spec.foreground_inputs() {
                    values.insert(name.clone(), f64::NAN);
                }
                return Ok(likelihood.reject(&err));
            }
            Err(err) => return Err(err),
        }
    }

    let input = spec.input_assignment(values)?;
    likelihood.log_likelihood(&input)
}

/// Run the scan.
pub fn run_scan(
    spec: &ParameterSpec,
    likelihood: &dyn Likelihood,
    settings: &ScanSettings,
) -> Result<ScanResult, FlexError> {
    if settings.draws == 0 {
        return Err(FlexError::InvalidSetting {
            name: "draws",
            value: "0".to_string(),
            reason: "must be > 0",
        });
    }

    let profile = settings.foreground == ForegroundMode::Profiled
        && !spec.foreground_inputs().is_empty();
    let skip: &[String] = if profile {
        spec.foreground_inputs()
    } else {
        &[]
    };

    let points = draw_points(spec, settings.draws, settings.seed, skip);

    let scored: Vec<(Assignment, f64)> = points
        .into_par_iter()
        .map(|mut values| {
            let ll = score_point(spec, likelihood, profile, &mut values)?;
            Ok((values, ll))
        })
        .collect::<Result<_, FlexError>>()?;

    // Sequential reduction in draw order; ties keep the lowest index.
    let mut best: Option<(usize, f64)> = None;
    let mut rejected = 0usize;
    for (idx, (_, ll)) in scored.iter().enumerate() {
        if *ll <= PENALTY || !ll.is_finite() {
            rejected += 1;
            continue;
        }
        match best {
            Some((_, b)) if *ll <= b => {}
            _ => best = Some((idx, *ll)),
        }
    }
    let Some((best_index, max_ll)) = best else {
        return Err(FlexError::NonFinite {
            what: "scan log-likelihoods (every draw was rejected)",
        });
    };

    let mut columns = vec![WEIGHT_COLUMN.to_string(), LOGLIKE_COLUMN.to_string()];
    columns.extend(spec.params().iter().map(|p| p.name.clone()));
    let mut table = SampleTable::new(columns);

    let mut sum_w = 0.0;
    let mut sum_w2 = 0.0;
    for (values, ll) in &scored {
        let weight = if *ll <= PENALTY || !ll.is_finite() {
            0.0
        } else {
            (ll - max_ll).exp()
        };
        sum_w += weight;
        sum_w2 += weight * weight;

        let mut row = Vec::with_capacity(2 + spec.params().len());
        row.push(weight);
        row.push(*ll);
        for p in spec.params() {
            row.push(values.get(&p.name).copied().unwrap_or(f64::NAN));
        }
        table.push_row(&row)?;
    }

    let evaluated = scored.len();
    let effective_samples = if sum_w2 > 0.0 { sum_w * sum_w / sum_w2 } else { 0.0 };
    log::info!(
        "order {}: {evaluated} draws, {rejected} rejected, max logL {max_ll:.4}, ESS {effective_samples:.1}",
        spec.order()
    );

    let best_values = scored
        .into_iter()
        .nth(best_index)
        .map(|(values, _)| values)
        .unwrap_or_default();

    Ok(ScanResult {
        order: spec.order(),
        samples: PosteriorSamples::new(table, WEIGHT_COLUMN, Some(LOGLIKE_COLUMN.to_string()))?,
        best: best_values,
        best_index,
        max_log_likelihood: max_ll,
        evaluated,
        rejected,
        effective_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        DataSeries, FlexConfig, ForegroundKind, KnotBounds, KnotSet, RawConfig, RunContext,
    };
    use crate::fit::likelihood::LikelihoodEvaluator;
    use crate::fit::params::ParameterSpaceBuilder;
    use crate::fit::posterior::SampleSource;
    use crate::math::Pchip;
    use crate::models::predict;

    fn peak_context() -> RunContext {
        let knots = KnotSet::new(vec![0.0, 5.0, 10.0], vec![0.0, 10.0, 0.0]).unwrap();
        let curve = Pchip::new(knots).unwrap();
        let x: Vec<f64> = (0..=40).map(|i| i as f64 * 0.25).collect();
        let y = curve.eval_many(&x).unwrap();
        RunContext::single(DataSeries::new(x, y).unwrap())
    }

    fn peak_config() -> FlexConfig {
        FlexConfig::try_from(RawConfig {
            order: 1,
            knot_range: (0.0, 12.0),
            fixed_endpoints: Some((0.0, 0.0)),
            ..RawConfig::default()
        })
        .unwrap()
    }

    fn settings(seed: u64) -> ScanSettings {
        ScanSettings {
            draws: 2000,
            seed,
            foreground: ForegroundMode::Sampled,
        }
    }

    #[test]
    fn scan_finds_the_peak() {
        let ctx = peak_context();
        let cfg = peak_config();
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);

        let result = run_scan(&spec, &eval, &settings(11)).unwrap();
        assert_eq!(result.evaluated, 2000);
        assert!((result.best["x_1"] - 5.0).abs() < 1.0, "{:?}", result.best);
        assert!((result.best["y_1"] - 10.0).abs() < 1.5, "{:?}", result.best);

        let weights = result.samples.weights();
        assert_eq!(weights[result.best_index], 1.0);
        assert_eq!(result.samples.best_fit(), Some(result.best_index));
    }

    #[test]
    fn scan_is_reproducible_for_a_seed() {
        let ctx = peak_context();
        let cfg = peak_config();
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);

        let a = run_scan(&spec, &eval, &settings(3)).unwrap();
        let b = run_scan(&spec, &eval, &settings(3)).unwrap();
        assert_eq!(a.best_index, b.best_index);
        assert_eq!(a.max_log_likelihood.to_bits(), b.max_log_likelihood.to_bits());
        assert_eq!(a.samples.table(), b.samples.table());
    }

    #[test]
    fn zero_draws_is_a_setting_error() {
        let ctx = peak_context();
        let cfg = peak_config();
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);
        let mut s = settings(1);
        s.draws = 0;
        assert!(matches!(
            run_scan(&spec, &eval, &s).unwrap_err(),
            FlexError::InvalidSetting { name: "draws", .. }
        ));
    }

    #[test]
    fn profiled_scan_fills_foreground_columns() {
        let a = [1500.0, 10.0, -5.0, 3.0, -2.0];
        let x: Vec<f64> = (0..=50).map(|i| 50.0 + i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&nu| predict(ForegroundKind::Edges, nu, &a))
            .collect();
        let ctx = RunContext::single(DataSeries::new(x, y).unwrap());
        let cfg = FlexConfig::try_from(RawConfig {
            order: 0,
            knot_range: (-0.5, 0.5),
            foreground: ForegroundKind::Edges,
            foreground_priors: vec![(-1e5, 1e5); 5],
            ..RawConfig::default()
        })
        .unwrap();
        let bounds = KnotBounds::new(50.0, 100.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);

        let result = run_scan(
            &spec,
            &eval,
            &ScanSettings {
                draws: 200,
                seed: 5,
                foreground: ForegroundMode::Profiled,
            },
        )
        .unwrap();
        assert_eq!(result.rejected, 0);
        for i in 0..5 {
            let name = format!("a_{i}");
            assert!(result.best[&name].is_finite());
            assert!(result.samples.column(&name).unwrap().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn profiling_a_nonlinear_foreground_is_refused() {
        let ctx = peak_context();
        let cfg = FlexConfig::try_from(RawConfig {
            order: 0,
            foreground: ForegroundKind::Sims,
            foreground_priors: vec![(-1.0, 1.0); 9],
            ..RawConfig::default()
        })
        .unwrap();
        let bounds = KnotBounds::new(0.0, 10.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);
        let err = run_scan(
            &spec,
            &eval,
            &ScanSettings {
                draws: 10,
                seed: 1,
                foreground: ForegroundMode::Profiled,
            },
        )
        .unwrap_err();
        assert!(matches!(err, FlexError::InvalidSetting { .. }));
    }

    #[test]
    fn profiled_scan_recovers_the_foreground() {
        let a = [1500.0, 10.0, -5.0, 3.0, -2.0];
        let x: Vec<f64> = (0..=50).map(|i| 50.0 + i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&nu| predict(ForegroundKind::Edges, nu, &a))
            .collect();
        let ctx = RunContext::single(DataSeries::new(x, y).unwrap());
        let cfg = FlexConfig::try_from(RawConfig {
            order: 1,
            knot_range: (-0.5, 0.5),
            foreground: ForegroundKind::Edges,
            foreground_priors: vec![(-1e5, 1e5); 5],
            fixed_endpoints: Some((0.0, 0.0)),
            ..RawConfig::default()
        })
        .unwrap();
        let bounds = KnotBounds::new(50.0, 100.0).unwrap();
        let spec = ParameterSpaceBuilder::new(&cfg, bounds).build().unwrap();
        let eval = LikelihoodEvaluator::new(&ctx, &cfg, bounds);

        let result = run_scan(
            &spec,
            &eval,
            &ScanSettings {
                draws: 20,
                seed: 9,
                foreground: ForegroundMode::Profiled,
            },
        )
        .unwrap();
        assert_eq!(result.evaluated, 20);
        assert_eq!(result.rejected as u64, eval.rejections());
        assert!(result.max_log_likelihood.is_finite());
        let coeffs = eval.coefficients(&result.best).unwrap();
        assert!(coeffs.iter().all(|c| c.is_finite()), "{coeffs:?}");
    }
}
