//! nozzlegen - Nozzle shielding geometry variants and event histograms for
//! muon collider detector studies.
//!
//! ## Architecture
//!
//! - **Geometry**: zplane tables of the nozzle and blackhole shields,
//!   interpolation, validation of radius reductions, blackhole carving
//! - **XML**: detector description documents, read and rewritten in place
//! - **Pipeline**: one simulation folder per variant, HTCondor job files and
//!   killzone sweeps
//! - **Analysis**: histograms of event dumps, one report per dataset
//!
//! ## Coordinates
//!
//! Detector files place the nozzle tip at `|z| = tip_z`. While a table is
//! modified it is held tip-relative: the depth of a plane is its distance
//! from the tip, with the sign of its side.

pub mod analysis;
pub mod checkpoint;
pub mod geometry;
pub mod models;
pub mod pipeline;
pub mod xml;

// Re-exports for convenience
pub use analysis::{Analyzer, DatasetReport, Recipe};
pub use checkpoint::{CheckpointManager, CheckpointState};
pub use geometry::{GeometryTable, Limits, SweepPlan, ZPlane};
pub use models::{Config, NozzleError, Result, RunStats, VariantRecord, VariantSpec};
pub use pipeline::{SweepWriter, VariantOrganizer, VariantPipeline};
