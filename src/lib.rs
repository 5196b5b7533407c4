//! `flexknot` library crate.
//!
//! Free-form reconstruction of a sky-averaged 21-cm signal: a monotone cubic
//! (PCHIP) curve through a variable number of knots whose x-locations are
//! drawn as sorted uniform order statistics, plus an optional foreground
//! model, scored by a Gaussian likelihood.
//!
//! The binary (`flexknot`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the parameter space and likelihood can be driven by an external sampler

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
