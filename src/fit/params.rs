//! Declarative parameter space handed to a sampler.
//!
//! For a run of order `n` the space holds, in declaration order:
//!
//! - `fy_f`, `fy_l`: y-values of the two fixed-x endpoint knots
//! - per interior knot `i`: an ordering draw `v_i` (dropped from the
//!   likelihood input), the derived location `x_i`, and the free value `y_i`
//! - `a_0 .. a_{k-1}`: foreground coefficients
//!
//! `x_i` is a [`DerivedExpr`] over `x_{i-1}` and `v_i`, so the chain
//! `x_1 -> x_2 -> ...` reproduces the order-statistic recurrence in
//! `math::order` step by step.

use serde::Serialize;

use crate::domain::{
    Assignment, FIRST_ENDPOINT, FlexConfig, KnotBounds, LAST_ENDPOINT, draw_name, foreground_name,
    knot_x_name, knot_y_name,
};
use crate::error::FlexError;
use crate::math::next_location;

/// Left operand of an ordering step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Constant(f64),
    Param(String),
}

/// Expression for a derived parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DerivedExpr {
    /// `previous + (upper - previous) * (1 - draw^(1/remaining))`
    OrderStatistic {
        knot: usize,
        previous: Operand,
        draw: String,
        upper: f64,
        remaining: usize,
    },
}

impl DerivedExpr {
    /// Names this expression reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DerivedExpr::OrderStatistic { previous, draw, .. } => {
                let mut out = Vec::with_capacity(2);
                if let Operand::Param(name) = previous {
                    out.push(name.as_str());
                }
                out.push(draw.as_str());
                out
            }
        }
    }

    pub fn evaluate(&self, values: &Assignment) -> Result<f64, FlexError> {
        match self {
            DerivedExpr::OrderStatistic {
                knot,
                previous,
                draw,
                upper,
                remaining,
            } => {
                let prev = match previous {
                    Operand::Constant(c) => *c,
                    Operand::Param(name) => lookup(values, name)?,
                };
                let u = lookup(values, draw)?;
                if !(u.is_finite() && (0.0..=1.0).contains(&u)) {
                    return Err(FlexError::InvalidDraw {
                        index: *knot,
                        value: u,
                    });
                }
                Ok(next_location(prev, *upper, u, *remaining))
            }
        }
    }
}

fn lookup(values: &Assignment, name: &str) -> Result<f64, FlexError> {
    values
        .get(name)
        .copied()
        .ok_or_else(|| FlexError::MissingParameter {
            name: name.to_string(),
        })
}

/// How a parameter gets its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamKind {
    /// Uniform prior on `[min, max]`.
    Sampled { min: f64, max: f64 },
    /// Held constant.
    Fixed { value: f64 },
    /// Computed from other parameters; `min`/`max` are the reachable range.
    Derived { expr: DerivedExpr, min: f64, max: f64 },
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub label: String,
    /// Not passed to the likelihood (consumed only by derived expressions).
    pub drop: bool,
}

/// Sampler output settings derived from `write_diagnostics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerSettings {
    pub nlive: usize,
    pub write_resume: bool,
    pub read_resume: bool,
    pub write_stats: bool,
    pub write_live: bool,
    pub write_dead: bool,
}

impl SamplerSettings {
    pub fn new(nlive: usize, write_diagnostics: bool) -> Self {
        Self {
            nlive,
            write_resume: write_diagnostics,
            read_resume: write_diagnostics,
            write_stats: true,
            write_live: write_diagnostics,
            write_dead: write_diagnostics,
        }
    }
}

/// The full parameter declaration for one run. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    order: usize,
    knot_bounds: KnotBounds,
    params: Vec<ParamDecl>,
    input_params: Vec<String>,
    sampler: SamplerSettings,
}

impl ParameterSpec {
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn knot_bounds(&self) -> KnotBounds {
        self.knot_bounds
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Exact ordered list of names the likelihood expects.
    pub fn input_params(&self) -> &[String] {
        &self.input_params
    }

    /// Foreground coefficient names (the tail of the input list).
    pub fn foreground_inputs(&self) -> &[String] {
        &self.input_params[2 + 2 * self.order..]
    }

    pub fn sampler(&self) -> &SamplerSettings {
        &self.sampler
    }

    pub fn get(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Parameters the sampler draws from a prior.
    pub fn sampled(&self) -> impl Iterator<Item = &ParamDecl> + '_ {
        self.params
            .iter()
            .filter(|p| matches!(p.kind, ParamKind::Sampled { .. }))
    }

    /// Dimension of the sampled space.
    pub fn dimension(&self) -> usize {
        self.sampled().count()
    }

    /// Fill in fixed and derived values, in declaration order.
    ///
    /// Every sampled parameter must already be present.
    pub fn complete(&self, values: &mut Assignment) -> Result<(), FlexError> {
        for p in &self.params {
            match &p.kind {
                ParamKind::Sampled { .. } => {
                    if !values.contains_key(&p.name) {
                        return Err(FlexError::MissingParameter {
                            name: p.name.clone(),
                        });
                    }
                }
                ParamKind::Fixed { value } => {
                    values.insert(p.name.clone(), *value);
                }
                ParamKind::Derived { expr, .. } => {
                    let v = expr.evaluate(values)?;
                    values.insert(p.name.clone(), v);
                }
            }
        }
        Ok(())
    }

    /// Project a complete assignment onto the likelihood's input list.
    pub fn input_assignment(&self, values: &Assignment) -> Result<Assignment, FlexError> {
        self.input_params
            .iter()
            .map(|name| lookup(values, name).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Builds a [`ParameterSpec`] from a validated configuration.
#[derive(Debug, Clone)]
pub struct ParameterSpaceBuilder<'a> {
    config: &'a FlexConfig,
    bounds: KnotBounds,
}

impl<'a> ParameterSpaceBuilder<'a> {
    pub fn new(config: &'a FlexConfig, bounds: KnotBounds) -> Self {
        Self { config, bounds }
    }

    pub fn config(&self) -> &FlexConfig {
        self.config
    }

    pub fn bounds(&self) -> KnotBounds {
        self.bounds
    }

    pub fn build(&self) -> Result<ParameterSpec, FlexError> {
        let config = self.config;
        let (lo, hi) = config.knot_range;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(FlexError::InvalidKnotRange { min: lo, max: hi });
        }
        let bounds = KnotBounds::new(self.bounds.min, self.bounds.max)?;

        let n = config.order;
        let mut params = Vec::with_capacity(2 + 3 * n + config.foreground_priors.len());
        let mut input_params = Vec::with_capacity(2 + 2 * n + config.foreground_priors.len());

        let endpoint = |name: &str, fixed: Option<f64>| ParamDecl {
            name: name.to_string(),
            kind: match fixed {
                Some(value) => ParamKind::Fixed { value },
                None => ParamKind::Sampled { min: lo, max: hi },
            },
            label: format!("${name}$"),
            drop: false,
        };
        params.push(endpoint(FIRST_ENDPOINT, config.fixed_endpoints.map(|(f, _)| f)));
        params.push(endpoint(LAST_ENDPOINT, config.fixed_endpoints.map(|(_, l)| l)));
        input_params.push(FIRST_ENDPOINT.to_string());
        input_params.push(LAST_ENDPOINT.to_string());

        for i in 1..=n {
            let v = draw_name(i);
            let x = knot_x_name(i);
            let y = knot_y_name(i);

            params.push(ParamDecl {
                name: v.clone(),
                kind: ParamKind::Sampled { min: 0.0, max: 1.0 },
                label: v.clone(),
                drop: true,
            });

            let previous = if i == 1 {
                Operand::Constant(bounds.min)
            } else {
                Operand::Param(knot_x_name(i - 1))
            };
            params.push(ParamDecl {
                name: x.clone(),
                kind: ParamKind::Derived {
                    expr: DerivedExpr::OrderStatistic {
                        knot: i,
                        previous,
                        draw: v,
                        upper: bounds.max,
                        remaining: n - i + 1,
                    },
                    min: bounds.min,
                    max: bounds.max,
                },
                label: format!("$x_{{{i}}}$"),
                drop: false,
            });
            input_params.push(x);

            params.push(ParamDecl {
                name: y.clone(),
                kind: ParamKind::Sampled { min: lo, max: hi },
                label: format!("$y_{{{i}}}$"),
                drop: false,
            });
            input_params.push(y);
        }

        for (i, &(min, max)) in config.foreground_priors.iter().enumerate() {
            let name = foreground_name(i);
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(FlexError::InvalidPrior { name, min, max });
            }
            params.push(ParamDecl {
                name: name.clone(),
                kind: ParamKind::Sampled { min, max },
                label: format!("$a_{i}$"),
                drop: false,
            });
            input_params.push(name);
        }

        Ok(ParameterSpec {
            order: n,
            knot_bounds: bounds,
            params,
            input_params,
            sampler: SamplerSettings::new(config.nlive, config.write_diagnostics),
        })
    }
}
