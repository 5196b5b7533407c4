//! Input/output helpers.
//!
//! - spectrum CSV ingest + validation (`ingest`)
//! - sample table and band CSVs (`export`)
//! - curve JSON read/write (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
