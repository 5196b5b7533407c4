//! Foreground models added to the flexknot signal.
//!
//! Models are implemented as small, pure functions so the likelihood and the
//! profiling code can stay generic.

pub mod foreground;

pub use foreground::*;
