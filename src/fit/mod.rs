//! Fitting: parameter space, likelihood, posterior handling, and the
//! reference scan driver.
//!
//! Responsibilities:
//!
//! - declare the sampled/derived parameter space for a given order
//! - score parameter points against the data
//! - turn posterior rows back into knot sets and curve bands
//! - scan priors and select an order using BIC + guardrails

pub mod likelihood;
pub mod params;
pub mod posterior;
pub mod scan;
pub mod selection;

pub use likelihood::*;
pub use params::*;
pub use posterior::*;
pub use scan::*;
pub use selection::*;
