//! Zplane geometry of the nozzle and blackhole shields.
//!
//! Tables are kept in original detector coordinates when read from or
//! written to XML and in tip-relative coordinates while being modified.

mod carve;
mod component;
mod interp;
mod sweep;
mod table;
mod validate;

pub use carve::{Carving, RmaxChanges, adjust_nozzle, carve_blackhole};
pub use component::{Component, Shield, Side};
pub use interp::{
    NOZZLE_KINK_DEPTH, NOZZLE_KINK_MAX_R, NOZZLE_TIP_R, ThicknessSolution,
    approx_nozzle_outer_radius, depth_for_thickness, interpolate, interpolate_planes,
    interpolate_radius, profile_at,
};
pub use sweep::{KILLZONE_PLANES, KillzonePlane, SweepPlan, SweepStep};
pub use table::{
    GeometryTable, ZPlane, blackhole_base, from_tip_relative, nozzle_base, to_tip_relative,
};
pub use validate::{
    Limits, PositionCheck, ReductionIssue, ValidationReport, validate_configuration,
    validate_reduction_at,
};
