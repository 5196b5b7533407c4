//! Mathematical kernels: knot ordering, monotone interpolation, least squares.

pub mod ols;
pub mod order;
pub mod pchip;

pub use ols::*;
pub use order::*;
pub use pchip::{DerivativeSet, Pchip, evaluate, evaluate_slices, fit, fit_slopes};
