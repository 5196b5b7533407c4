//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - knot geometry (`Knot`, `KnotSet`, `KnotBounds`)
//! - the observed spectrum (`DataSeries`) and the run context that owns it
//! - the validated run configuration (`FlexConfig`) and its raw form
//! - posterior rows (`SampleRecord`) and saved curves (`CurveFile`)

pub mod types;

pub use types::*;
