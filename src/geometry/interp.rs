//! Linear interpolation along the nozzle profile.
//!
//! The profile is piecewise linear between defined planes but has flat
//! segments and kinks, so values are only meaningful between two planes of
//! the same segment.

use super::table::ZPlane;
use crate::models::{NozzleError, Result};
use serde::Serialize;

/// Depth of the nozzle kink, tip-relative cm.
pub const NOZZLE_KINK_DEPTH: f64 = 94.0;

/// Outer nozzle radius at the kink, cm.
pub const NOZZLE_KINK_MAX_R: f64 = 17.57473619;

/// Outer nozzle radius at the tip, cm.
pub const NOZZLE_TIP_R: f64 = 1.0;

/// `v1 + (v2 - v1) * (z - z1) / (z2 - z1)`; `v1` for coincident points.
pub fn interpolate(z: f64, z1: f64, v1: f64, z2: f64, v2: f64) -> f64 {
    if (z2 - z1).abs() < 1e-10 {
        return v1;
    }
    let t = (z - z1) / (z2 - z1);
    v1 + t * (v2 - v1)
}

/// Radius at `z` on the line through `(z1, r1)` and `(z2, r2)`.
pub fn interpolate_radius(z1: f64, r1: f64, z2: f64, r2: f64, z: f64) -> Result<f64> {
    if z1 == z2 {
        return Err(NozzleError::InvalidInput(
            "z1 and z2 cannot be the same value".to_string(),
        ));
    }
    Ok(r1 + (r2 - r1) * (z - z1) / (z2 - z1))
}

/// Interpolated `(rmin, rmax)` at depth between two planes.
pub fn interpolate_planes(depth: f64, a: &ZPlane, b: &ZPlane) -> (f64, f64) {
    let (z1, z2) = (a.depth(), b.depth());
    (
        interpolate(depth, z1, a.rmin, z2, b.rmin),
        interpolate(depth, z1, a.rmax, z2, b.rmax),
    )
}

/// `(rmin, rmax)` of a depth-sorted profile, clamped to its end planes.
pub fn profile_at(planes: &[ZPlane], depth: f64) -> Option<(f64, f64)> {
    let first = planes.first()?;
    let last = planes.last()?;

    if let Some(pair) = planes
        .windows(2)
        .find(|w| w[0].depth() <= depth && depth <= w[1].depth())
    {
        return Some(interpolate_planes(depth, &pair[0], &pair[1]));
    }

    if depth < first.depth() {
        Some((first.rmin, first.rmax))
    } else {
        Some((last.rmin, last.rmax))
    }
}

/// Crude outer-radius model of the nozzle cone, used where no profile
/// plane is available.
pub fn approx_nozzle_outer_radius(depth: f64) -> f64 {
    if depth <= 0.0 {
        NOZZLE_TIP_R
    } else if depth >= NOZZLE_KINK_DEPTH {
        NOZZLE_KINK_MAX_R
    } else {
        let slope = (NOZZLE_KINK_MAX_R - NOZZLE_TIP_R) / NOZZLE_KINK_DEPTH;
        NOZZLE_TIP_R + slope * depth
    }
}

/// Where a wall of linearly varying thickness reaches a target thickness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "z", rename_all = "lowercase")]
pub enum ThicknessSolution {
    /// The thickness is reached at this z
    At(f64),
    /// The thickness is constant and equal to the target between both planes
    Everywhere,
}

/// Solve `rmax(z) - rmin(z) = delta_r` between two planes.
pub fn depth_for_thickness(a: &ZPlane, b: &ZPlane, delta_r: f64) -> Result<ThicknessSolution> {
    let t1 = a.thickness();
    let t2 = b.thickness();

    if t1 == t2 {
        if t1 == delta_r {
            return Ok(ThicknessSolution::Everywhere);
        }
        return Err(NozzleError::InvalidInput(
            "Thickness does not change and does not match target delta".to_string(),
        ));
    }

    Ok(ThicknessSolution::At(
        a.z + (b.z - a.z) * (delta_r - t1) / (t2 - t1),
    ))
}
