//! Synthetic spectrum generation from a known knot set.
//!
//! The generated CSV has the same shape as a measured low-band spectrum:
//! `frequency,weight,tsky`, with `tsky = signal + foreground + noise` and a
//! small fraction of channels flagged with zero weight.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ForegroundKind, KnotSet};
use crate::error::{AppError, FlexError};
use crate::math::Pchip;
use crate::models::predict;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// True signal knots; the frequency axis spans their x-range.
    pub knots: KnotSet,
    pub foreground: ForegroundKind,
    pub coefficients: Vec<f64>,
    pub noise_sigma: f64,
    pub n_points: usize,
    /// Probability that a channel is flagged (weight 0).
    pub flag_fraction: f64,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct SyntheticSpectrum {
    pub frequency: Vec<f64>,
    pub weight: Vec<f64>,
    pub tsky: Vec<f64>,
    /// Noise-free signal, for comparison.
    pub signal: Vec<f64>,
}

pub fn generate_spectrum(config: &SyntheticConfig) -> Result<SyntheticSpectrum, FlexError> {
    if config.n_points < 2 {
        return Err(FlexError::InvalidSetting {
            name: "n_points",
            value: config.n_points.to_string(),
            reason: "must be >= 2",
        });
    }
    if !(config.noise_sigma.is_finite() && config.noise_sigma >= 0.0) {
        return Err(FlexError::InvalidSetting {
            name: "noise_sigma",
            value: config.noise_sigma.to_string(),
            reason: "must be finite and >= 0",
        });
    }
    if !(0.0..1.0).contains(&config.flag_fraction) {
        return Err(FlexError::InvalidSetting {
            name: "flag_fraction",
            value: config.flag_fraction.to_string(),
            reason: "must be in [0, 1)",
        });
    }
    let expected = config.foreground.param_count();
    if config.coefficients.len() != expected {
        return Err(FlexError::ForegroundMismatch {
            model: config.foreground.name(),
            expected,
            actual: config.coefficients.len(),
        });
    }

    let xs = config.knots.xs();
    let (lo, hi) = (xs[0], xs[xs.len() - 1]);
    let step = (hi - lo) / (config.n_points as f64 - 1.0);
    let frequency: Vec<f64> = (0..config.n_points).map(|i| lo + step * i as f64).collect();
    let signal = Pchip::new(config.knots.clone())?.eval_many(&frequency)?;

    let mut rng = StdRng::seed_from_u64(synthetic_seed(config));
    // Normal::new only fails for a negative or non-finite sigma, checked above.
    let normal = Normal::new(0.0, config.noise_sigma).map_err(|_| FlexError::InvalidSetting {
        name: "noise_sigma",
        value: config.noise_sigma.to_string(),
        reason: "not a valid standard deviation",
    })?;

    let mut weight = Vec::with_capacity(config.n_points);
    let mut tsky = Vec::with_capacity(config.n_points);
    for (&nu, &s) in frequency.iter().zip(&signal) {
        let noise = normal.sample(&mut rng);
        let roll: f64 = rng.r#gen();
        weight.push(if roll < config.flag_fraction { 0.0 } else { 1.0 });
        tsky.push(s + predict(config.foreground, nu, &config.coefficients) + noise);
    }

    log::debug!(
        "generated {} channels over [{lo}, {hi}] MHz, {} flagged",
        config.n_points,
        weight.iter().filter(|w| **w == 0.0).count()
    );

    Ok(SyntheticSpectrum {
        frequency,
        weight,
        tsky,
        signal,
    })
}

/// Write `frequency,weight,tsky` CSV.
pub fn write_spectrum_csv(path: &Path, spectrum: &SyntheticSpectrum) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create spectrum CSV '{}': {e}", path.display()),
        )
    })?;

    writeln!(file, "frequency,weight,tsky")
        .map_err(|e| AppError::new(2, format!("Failed to write spectrum CSV header: {e}")))?;
    for ((nu, w), t) in spectrum
        .frequency
        .iter()
        .zip(&spectrum.weight)
        .zip(&spectrum.tsky)
    {
        writeln!(file, "{nu:.6},{w},{t:.10}")
            .map_err(|e| AppError::new(2, format!("Failed to write spectrum CSV row: {e}")))?;
    }
    Ok(())
}

fn synthetic_seed(config: &SyntheticConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.seed.hash(&mut hasher);
    config.n_points.hash(&mut hasher);
    config.noise_sigma.to_bits().hash(&mut hasher);
    for k in config.knots.knots() {
        k.x.to_bits().hash(&mut hasher);
        k.y.to_bits().hash(&mut hasher);
    }
    config.foreground.name().hash(&mut hasher);
    for c in &config.coefficients {
        c.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
