//! Likelihood evaluation.
//!
//! A sampler only ever sees the [`Likelihood`] trait. The concrete
//! [`LikelihoodEvaluator`] rebuilds the knot set from a named assignment,
//! interpolates it at the data frequencies, adds the foreground and scores the
//! residuals under a Gaussian error model.
//!
//! Numeric failures (coincident knots, non-finite scores) are not errors from
//! the sampler's point of view: they score [`PENALTY`] so the point is simply
//! rejected. Missing parameters are configuration bugs and do propagate.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{
    Assignment, FIRST_ENDPOINT, FlexConfig, ForegroundKind, Knot, KnotBounds, KnotSet,
    LAST_ENDPOINT, RunContext, foreground_name, knot_x_name, knot_y_name,
};
use crate::error::FlexError;
use crate::fit::params::{ParameterSpaceBuilder, ParameterSpec};
use crate::math::{self, weighted_least_squares};
use crate::models::{fill_design_row, predict};

/// Score returned for points that cannot be evaluated.
pub const PENALTY: f64 = -1e30;

/// The contract between a sampler and the model.
pub trait Likelihood: Send + Sync {
    fn log_likelihood(&self, params: &Assignment) -> Result<f64, FlexError>;

    /// Best-fit foreground coefficients given the signal part of `params`.
    ///
    /// `Ok(None)` means the model cannot be profiled and the coefficients
    /// have to be sampled.
    fn profile_foreground(&self, _params: &Assignment) -> Result<Option<Vec<f64>>, FlexError> {
        Ok(None)
    }

    /// Record a numeric failure and return [`PENALTY`].
    ///
    /// Callers that fail before reaching [`Likelihood::log_likelihood`]
    /// (derived values, profiling) report through here too.
    fn reject(&self, err: &FlexError) -> f64 {
        log::debug!("rejected point: {err}");
        PENALTY
    }
}

impl<L: Likelihood + ?Sized> Likelihood for &L {
    fn log_likelihood(&self, params: &Assignment) -> Result<f64, FlexError> {
        (**self).log_likelihood(params)
    }

    fn profile_foreground(&self, params: &Assignment) -> Result<Option<Vec<f64>>, FlexError> {
        (**self).profile_foreground(params)
    }

    fn reject(&self, err: &FlexError) -> f64 {
        (**self).reject(err)
    }
}

/// Gaussian log density of `y` around `mean`.
pub fn gaussian_log_pdf(y: f64, mean: f64, sigma: f64) -> f64 {
    let u = (y - mean) / sigma;
    -0.5 * u * u - ((2.0 * PI).sqrt() * sigma).ln()
}

fn read(params: &Assignment, name: &str) -> Result<f64, FlexError> {
    params
        .get(name)
        .copied()
        .ok_or_else(|| FlexError::MissingParameter {
            name: name.to_string(),
        })
}

pub struct LikelihoodEvaluator<'a> {
    ctx: &'a RunContext,
    bounds: KnotBounds,
    order: usize,
    foreground: ForegroundKind,
    sigma: f64,
    fixed_endpoints: Option<(f64, f64)>,
    rejections: AtomicU64,
}

impl<'a> LikelihoodEvaluator<'a> {
    pub fn new(ctx: &'a RunContext, config: &FlexConfig, bounds: KnotBounds) -> Self {
        Self {
            ctx,
            bounds,
            order: config.order,
            foreground: config.foreground,
            sigma: config.noise_sigma,
            fixed_endpoints: config.fixed_endpoints,
            rejections: AtomicU64::new(0),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn bounds(&self) -> KnotBounds {
        self.bounds
    }

    pub fn foreground(&self) -> ForegroundKind {
        self.foreground
    }

    /// Number of points scored [`PENALTY`] so far.
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Rebuild the knot set named by `params`.
    pub fn knot_set(&self, params: &Assignment) -> Result<KnotSet, FlexError> {
        let (y_first, y_last) = match self.fixed_endpoints {
            Some(fixed) => fixed,
            None => (read(params, FIRST_ENDPOINT)?, read(params, LAST_ENDPOINT)?),
        };
        let interior = (1..=self.order)
            .map(|i| {
                Ok(Knot {
                    x: read(params, &knot_x_name(i))?,
                    y: read(params, &knot_y_name(i))?,
                })
            })
            .collect::<Result<Vec<_>, FlexError>>()?;
        KnotSet::from_parts(self.bounds, y_first, &interior, y_last)
    }

    pub fn coefficients(&self, params: &Assignment) -> Result<Vec<f64>, FlexError> {
        (0..self.foreground.param_count())
            .map(|i| read(params, &foreground_name(i)))
            .collect()
    }

    /// Signal-only curve at the data frequencies.
    pub fn signal(&self, knots: &KnotSet) -> Result<Vec<f64>, FlexError> {
        let derivs = math::fit(knots)?;
        math::evaluate(knots, &derivs, self.ctx.data.x())
    }

    /// Unpenalized score: every failure is returned as an error.
    pub fn score(&self, params: &Assignment) -> Result<f64, FlexError> {
        let knots = self.knot_set(params)?;
        let coeffs = self.coefficients(params)?;
        let signal = self.signal(&knots)?;

        let data = &self.ctx.data;
        let total: f64 = data
            .x()
            .iter()
            .zip(data.y())
            .zip(&signal)
            .map(|((&nu, &y), &s)| {
                gaussian_log_pdf(y, s + predict(self.foreground, nu, &coeffs), self.sigma)
            })
            .sum();

        if !total.is_finite() {
            return Err(FlexError::NonFinite {
                what: "log-likelihood",
            });
        }
        Ok(total)
    }
}

impl Likelihood for LikelihoodEvaluator<'_> {
    fn log_likelihood(&self, params: &Assignment) -> Result<f64, FlexError> {
        match self.score(params) {
            Ok(v) => Ok(v),
            Err(err) if err.is_numeric() => Ok(self.reject(&err)),
            Err(err) => Err(err),
        }
    }

    fn profile_foreground(&self, params: &Assignment) -> Result<Option<Vec<f64>>, FlexError> {
        if !self.foreground.is_linear() {
            return Ok(None);
        }
        let p = self.foreground.param_count();
        if p == 0 {
            return Ok(Some(Vec::new()));
        }

        let knots = self.knot_set(params)?;
        let signal = self.signal(&knots)?;
        let data = &self.ctx.data;

        let mut rows = Vec::with_capacity(data.len());
        let mut residual = Vec::with_capacity(data.len());
        for ((&nu, &y), &s) in data.x().iter().zip(data.y()).zip(&signal) {
            let mut row = vec![0.0; p];
            fill_design_row(self.foreground, nu, &mut row);
            rows.push(row);
            residual.push(y - s);
        }
        let weights = vec![1.0; rows.len()];

        weighted_least_squares(&rows, &residual, &weights)
            .map(Some)
            .ok_or(FlexError::NonFinite {
                what: "profiled foreground coefficients",
            })
    }

    fn reject(&self, err: &FlexError) -> f64 {
        self.rejections.fetch_add(1, Ordering::Relaxed);
        log::debug!("rejected point: {err}");
        PENALTY
    }
}

/// Stand-in used when no likelihood was supplied at registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredLikelihood;

impl Likelihood for UnconfiguredLikelihood {
    fn log_likelihood(&self, _params: &Assignment) -> Result<f64, FlexError> {
        log::error!("log-likelihood called but none was configured");
        Err(FlexError::UnconfiguredLikelihood)
    }
}

/// A parameter space paired with the likelihood that consumes it.
pub struct Registration<'a> {
    pub spec: ParameterSpec,
    pub likelihood: Box<dyn Likelihood + 'a>,
}

impl<'a> Registration<'a> {
    /// Build the parameter declaration and attach `likelihood`, or the unconfigured stub.
    pub fn new(
        builder: &ParameterSpaceBuilder<'_>,
        likelihood: Option<Box<dyn Likelihood + 'a>>,
    ) -> Result<Self, FlexError> {
        let spec = builder.build()?;
        let likelihood = likelihood.unwrap_or_else(|| {
            log::warn!("no likelihood supplied; registering the unconfigured stub");
            Box::new(UnconfiguredLikelihood) as Box<dyn Likelihood + 'a>
        });
        log::info!(
            "registered order {} with {} sampled parameters",
            spec.order(),
            spec.dimension()
        );
        Ok(Self { spec, likelihood })
    }

    /// Complete `values` (fixed and derived parameters) and score the input projection.
    pub fn evaluate(&self, values: &mut Assignment) -> Result<f64, FlexError> {
        match self.spec.complete(values) {
            Ok(()) => {}
            Err(err) if err.is_numeric() => return Ok(self.likelihood.reject(&err)),
            Err(err) => return Err(err),
        }
        let input = self.spec.input_assignment(values)?;
        self.likelihood.log_likelihood(&input)
    }
}
