//! Core data models for nozzlegen.
//!
//! - Configuration: every tunable, loaded from TOML
//! - Errors: one crate-wide error enum plus config errors
//! - Variants: grid points, outcomes and run statistics

mod config;
mod error;
mod variant;

pub use config::*;
pub use error::*;
pub use variant::*;
