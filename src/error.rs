//! Error types.
//!
//! Two layers:
//!
//! - [`FlexError`]: typed failures raised by the numeric core (transform,
//!   spline, parameter space, likelihood, posterior extraction).
//! - [`AppError`]: what the binary reports. It carries a process exit code so
//!   `main` can stay tiny.

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures of the numeric core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlexError {
    #[error("invalid knot order {order}: {reason}")]
    InvalidOrder { order: i64, reason: String },

    #[error("invalid knot bounds [{min}, {max}]: must be finite with min < max")]
    InvalidBounds { min: f64, max: f64 },

    #[error("invalid knot_range [{min}, {max}]: must be finite with min < max")]
    InvalidKnotRange { min: f64, max: f64 },

    #[error("invalid prior for '{name}': [{min}, {max}] must be finite with min < max")]
    InvalidPrior { name: String, min: f64, max: f64 },

    #[error("ordering draw {index} is {value}, expected a finite value in [0, 1]")]
    InvalidDraw { index: usize, value: f64 },

    #[error("a knot set needs at least 2 knots, got {actual}")]
    TooFewKnots { actual: usize },

    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("degenerate knot set: x[{index}] = {current} does not exceed the previous knot at {previous}")]
    DegenerateKnotSet {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("invalid setting {name} = {value}: {reason}")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("missing parameter '{name}'")]
    MissingParameter { name: String },

    #[error("no log-likelihood function was configured")]
    UnconfiguredLikelihood,

    #[error("foreground model '{model}' takes {expected} coefficients, got {actual} priors")]
    ForegroundMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl FlexError {
    /// Numeric failures are the ones a likelihood turns into a penalty score
    /// instead of propagating.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FlexError::DegenerateKnotSet { .. }
                | FlexError::NonFinite { .. }
                | FlexError::InvalidDraw { .. }
                | FlexError::TooFewKnots { .. }
        )
    }
}

impl From<FlexError> for AppError {
    fn from(err: FlexError) -> Self {
        let exit_code = match &err {
            FlexError::InvalidData(_) => 3,
            FlexError::UnconfiguredLikelihood => 5,
            e if e.is_numeric() => 4,
            FlexError::LengthMismatch { .. } => 4,
            _ => 2,
        };
        AppError::new(exit_code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_message_names_offending_knot() {
        let err = FlexError::DegenerateKnotSet {
            index: 2,
            previous: 5.0,
            current: 5.0,
        };
        assert_eq!(
            err.to_string(),
            "degenerate knot set: x[2] = 5 does not exceed the previous knot at 5"
        );
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let app: AppError = FlexError::UnconfiguredLikelihood.into();
        assert_eq!(app.exit_code(), 5);

        let app: AppError = FlexError::InvalidKnotRange { min: 1.0, max: 1.0 }.into();
        assert_eq!(app.exit_code(), 2);

        let app: AppError = FlexError::NonFinite { what: "score" }.into();
        assert_eq!(app.exit_code(), 4);
    }
}
