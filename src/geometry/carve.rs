//! Carving the blackhole volume and refitting the nozzle around it.
//!
//! All tables here are tip-relative. Work is done per side on depths, so
//! both ends of the detector stay mirror images.

use super::component::{Component, Shield, Side};
use super::interp::{approx_nozzle_outer_radius, interpolate, profile_at};
use super::table::{GeometryTable, ZPlane};
use super::validate::Limits;
use crate::models::{NozzleError, Result};
use tracing::{debug, warn};

/// Thickness of a blackhole start plane extrapolated ahead of the profile.
const EXTRAPOLATED_START_THICKNESS: f64 = 0.001;

/// Smallest inner radius of an extrapolated start plane.
const MIN_EXTRAPOLATED_RMIN: f64 = 0.0001;

/// New blackhole outer radii, keyed by side and depth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmaxChanges {
    entries: Vec<(Side, f64, f64)>,
}

impl RmaxChanges {
    fn record(&mut self, side: Side, depth: f64, rmax: f64) {
        match self
            .entries
            .iter_mut()
            .find(|(s, d, _)| *s == side && *d == depth)
        {
            Some(entry) => entry.2 = rmax,
            None => self.entries.push((side, depth, rmax)),
        }
    }

    pub fn get(&self, side: Side, depth: f64) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, d, _)| *s == side && (d - depth).abs() < 1e-9)
            .map(|(_, _, r)| *r)
    }

    /// Outer radius at any depth covered by the carved profile of a side.
    pub fn at(&self, side: Side, depth: f64) -> Option<f64> {
        if let Some(rmax) = self.get(side, depth) {
            return Some(rmax);
        }
        let mut profile: Vec<(f64, f64)> = self
            .entries
            .iter()
            .filter(|(s, _, _)| *s == side)
            .map(|(_, d, r)| (*d, *r))
            .collect();
        profile.sort_by(|a, b| a.0.total_cmp(&b.0));
        profile
            .windows(2)
            .find(|w| w[0].0 <= depth && depth <= w[1].0)
            .map(|w| interpolate(depth, w[0].0, w[0].1, w[1].0, w[1].1))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A carved blackhole.
#[derive(Debug, Clone)]
pub struct Carving {
    /// Blackhole planes after carving
    pub blackhole: GeometryTable,
    /// Outer radii the nozzle has to follow
    pub changes: RmaxChanges,
    /// Start depth actually used
    pub z_start: f64,
}

/// Start the blackhole at `z_start` and shrink its outer radius by
/// `reduction`, never leaving less than `limits.min_thickness` of wall.
///
/// `nozzle` is only read to extrapolate a start plane that lies ahead of the
/// blackhole's first plane.
pub fn carve_blackhole(
    blackhole: &GeometryTable,
    nozzle: &GeometryTable,
    z_start: f64,
    reduction: f64,
    limits: &Limits,
) -> Result<Carving> {
    if !(reduction.is_finite() && reduction >= 0.0) {
        return Err(NozzleError::InvalidInput(format!(
            "reduction must be finite and >= 0, got {reduction}"
        )));
    }
    if !z_start.is_finite() {
        return Err(NozzleError::InvalidInput(format!(
            "z_start must be finite, got {z_start}"
        )));
    }

    let start = if z_start < limits.min_blackhole_start {
        warn!(
            z_start,
            minimum = limits.min_blackhole_start,
            "Blackhole start below minimum, using minimum"
        );
        limits.min_blackhole_start
    } else {
        z_start
    };

    let shrink = |rmin: f64, rmax: f64, depth: f64| -> f64 {
        let available = rmax - rmin;
        let applied = if reduction >= available - limits.min_thickness {
            let capped = (available - limits.min_thickness).max(0.0);
            if capped < reduction {
                warn!(depth, requested = reduction, capped, "Capping reduction");
            }
            capped
        } else {
            reduction
        };
        (rmin + limits.min_thickness).max(rmax - applied)
    };

    let mut carved = GeometryTable::new();
    let mut changes = RmaxChanges::default();

    for side in Side::ALL {
        let component = Component::new(Shield::Blackhole, side);
        let planes = blackhole.planes(component);
        let (Some(first), Some(last)) = (planes.first(), planes.last()) else {
            warn!(component = %component, "No planes to carve");
            continue;
        };

        if start > last.depth() {
            return Err(NozzleError::InvalidInput(format!(
                "blackhole start {start} cm lies beyond the last {component} plane at {} cm",
                last.depth()
            )));
        }

        debug!(
            component = %component,
            original_start = first.depth(),
            new_start = start,
            "Carving blackhole"
        );

        let (rmin, rmax) = if start < first.depth() {
            extrapolated_start(nozzle, component.counterpart(), start)
        } else {
            // Cannot fail: the profile is non-empty
            profile_at(&planes, start).unwrap_or((first.rmin, first.rmax))
        };

        let new_rmax = shrink(rmin, rmax, start);
        carved.insert(component, ZPlane::new(side.z(start), rmin, new_rmax));
        changes.record(side, start, new_rmax);

        // The original first plane is always superseded by the start plane
        for plane in planes.iter().skip(1).filter(|p| p.depth() > start + 1e-9) {
            let new_rmax = shrink(plane.rmin, plane.rmax, plane.depth());
            carved.insert(component, ZPlane::new(plane.z, plane.rmin, new_rmax));
            changes.record(side, plane.depth(), new_rmax);
        }
    }

    Ok(Carving {
        blackhole: carved,
        changes,
        z_start: start,
    })
}

/// Thin start plane following the nozzle's inner cone ahead of the profile.
fn extrapolated_start(nozzle: &GeometryTable, nozzle_component: Component, depth: f64) -> (f64, f64) {
    let planes = nozzle.planes(nozzle_component);
    match planes.as_slice() {
        [a, b, ..] => {
            let rmax = interpolate(depth, a.depth(), a.rmax, b.depth(), b.rmax);
            let rmin = (rmax - EXTRAPOLATED_START_THICKNESS).max(MIN_EXTRAPOLATED_RMIN);
            (rmin, rmax)
        }
        _ => {
            warn!(component = %nozzle_component, "Nozzle profile too short, using minimal start plane");
            (MIN_EXTRAPOLATED_RMIN, EXTRAPOLATED_START_THICKNESS)
        }
    }
}

/// Move the nozzle's inner radius onto the carved blackhole's outer radius
/// from the blackhole start onwards.
pub fn adjust_nozzle(
    nozzle: &GeometryTable,
    changes: &RmaxChanges,
    z_start: f64,
    limits: &Limits,
) -> GeometryTable {
    let step_start = z_start.max(limits.min_blackhole_start);
    let mut adjusted = GeometryTable::new();

    for (component, plane) in nozzle.iter() {
        if component.shield != Shield::Nozzle {
            adjusted.insert(component, plane);
            continue;
        }

        let depth = plane.depth();
        let mut rmin = if depth < step_start {
            plane.rmin
        } else {
            changes.at(component.side, depth).unwrap_or(plane.rmin)
        };

        if rmin >= plane.rmax - limits.min_thickness {
            let kept = plane.rmin.max(plane.rmax - limits.min_thickness);
            if kept != rmin {
                warn!(z = plane.z, "Adjusted nozzle rmin to maintain minimum thickness");
            }
            rmin = kept;
        }

        adjusted.insert(component, ZPlane::new(plane.z, rmin, plane.rmax));
    }

    for side in Side::ALL {
        let component = Component::new(Shield::Nozzle, side);
        let planes = nozzle.planes(component);
        let exists = planes
            .iter()
            .any(|p| (p.depth() - step_start).abs() < 1e-6);
        if exists {
            continue;
        }
        let Some(change) = changes.get(side, step_start) else {
            continue;
        };

        let rmax = profile_at(&planes, step_start)
            .map(|(_, rmax)| rmax)
            .unwrap_or_else(|| approx_nozzle_outer_radius(step_start));
        let rmin = if change >= rmax - limits.min_thickness {
            (rmax - limits.min_thickness).max(0.0)
        } else {
            change
        };
        adjusted.insert(component, ZPlane::new(side.z(step_start), rmin, rmax));
    }

    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::table::{blackhole_base, nozzle_base};

    const BH_RIGHT: Component = Component::new(Shield::Blackhole, Side::Right);
    const BH_LEFT: Component = Component::new(Shield::Blackhole, Side::Left);
    const NZ_RIGHT: Component = Component::new(Shield::Nozzle, Side::Right);
    const NZ_LEFT: Component = Component::new(Shield::Nozzle, Side::Left);

    fn bases() -> (GeometryTable, GeometryTable) {
        (
            nozzle_base().offset_to_tip(6.0),
            blackhole_base().offset_to_tip(6.0),
        )
    }

    #[test]
    fn test_start_ahead_of_profile_is_extrapolated() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.001, 0.05, &limits).unwrap();

        let right = carving.blackhole.planes(BH_RIGHT);
        assert_eq!(right.len(), 6);
        assert_eq!(right[0].z, 0.001);
        assert!(right[0].thickness() >= limits.min_thickness - 1e-12);
        // The original first plane at 4.5176 is replaced by the new start
        assert!(right[1].depth() > 8.9);

        let left = carving.blackhole.planes(BH_LEFT);
        assert_eq!(left[0].z, -0.001);
        for (r, l) in right.iter().zip(left.iter()) {
            assert_eq!(r.z, -l.z);
            assert_eq!(r.rmax, l.rmax);
        }
    }

    #[test]
    fn test_reduction_applied_per_plane() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.001, 0.05, &limits).unwrap();

        let at_15 = carving.blackhole.get(BH_RIGHT, 15.0 - 6.0).unwrap();
        assert!((at_15.rmax - (1.58694 - 0.05)).abs() < 1e-9);
        assert_eq!(at_15.rmin, 0.6);

        let deepest = carving.blackhole.get(BH_RIGHT, 589.0).unwrap();
        assert!((deepest.rmax - 41.95).abs() < 1e-9);
    }

    #[test]
    fn test_large_reduction_keeps_min_thickness() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.001, 100.0, &limits).unwrap();
        for plane in carving.blackhole.planes(BH_RIGHT) {
            assert!(
                (plane.thickness() - limits.min_thickness).abs() < 1e-9,
                "{plane:?}"
            );
        }
    }

    #[test]
    fn test_start_inside_profile_is_interpolated() {
        let (nozzle, blackhole) = bases();
        let carving =
            carve_blackhole(&blackhole, &nozzle, 50.0, 0.0, &Limits::default()).unwrap();
        let right = carving.blackhole.planes(BH_RIGHT);
        assert_eq!(right[0].z, 50.0);
        // rmin interpolated between 0.6 at depth 9 and 0.3 at 93.99999999
        let expected_rmin = 0.6 + (0.3 - 0.6) * (50.0 - 9.0) / (93.99999999 - 9.0);
        assert!((right[0].rmin - expected_rmin).abs() < 1e-9);
        assert!(right.iter().all(|p| p.depth() >= 50.0));
    }

    #[test]
    fn test_start_below_minimum_is_raised() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.0, 0.01, &limits).unwrap();
        assert_eq!(carving.z_start, limits.min_blackhole_start);
    }

    #[test]
    fn test_start_beyond_profile_is_rejected() {
        let (nozzle, blackhole) = bases();
        let err = carve_blackhole(&blackhole, &nozzle, 1000.0, 0.01, &Limits::default());
        assert!(matches!(err, Err(NozzleError::InvalidInput(_))));
        let err = carve_blackhole(&blackhole, &nozzle, 1.0, -0.5, &Limits::default());
        assert!(matches!(err, Err(NozzleError::InvalidInput(_))));
    }

    #[test]
    fn test_nozzle_follows_blackhole() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.001, 0.05, &limits).unwrap();
        let adjusted = adjust_nozzle(&nozzle, &carving.changes, carving.z_start, &limits);

        // Inner nozzle wall sits on the blackhole's new outer wall
        for bh in carving.blackhole.planes(BH_RIGHT) {
            let nz = adjusted
                .planes(NZ_RIGHT)
                .into_iter()
                .find(|p| (p.depth() - bh.depth()).abs() < 1e-9)
                .unwrap();
            if nz.rmax - bh.rmax > limits.min_thickness {
                assert!((nz.rmin - bh.rmax).abs() < 1e-12, "{nz:?} vs {bh:?}");
            }
        }

        // Tip keeps its radii, a plane was added at the start depth
        let tip = adjusted.get(NZ_RIGHT, 0.0).unwrap();
        assert_eq!((tip.rmin, tip.rmax), (1.0, 1.0));
        assert_eq!(adjusted.planes(NZ_RIGHT).len(), 8);
        assert_eq!(adjusted.planes(NZ_LEFT).len(), 8);
        let start = adjusted.get(NZ_LEFT, -0.001).unwrap();
        assert!(start.thickness() >= limits.min_thickness - 1e-12);
    }

    #[test]
    fn test_changes_interpolate_between_planes() {
        let mut changes = RmaxChanges::default();
        changes.record(Side::Right, 1.0, 2.0);
        changes.record(Side::Right, 3.0, 4.0);
        assert_eq!(changes.at(Side::Right, 2.0), Some(3.0));
        assert_eq!(changes.at(Side::Right, 3.0), Some(4.0));
        assert_eq!(changes.at(Side::Right, 5.0), None);
        assert_eq!(changes.at(Side::Left, 2.0), None);
    }

    #[test]
    fn test_nozzle_does_not_overlap_blackhole() {
        let (nozzle, blackhole) = bases();
        let limits = Limits::default();
        let carving = carve_blackhole(&blackhole, &nozzle, 0.001, 0.05, &limits).unwrap();
        let adjusted = adjust_nozzle(&nozzle, &carving.changes, carving.z_start, &limits);

        // The 4.5176 nozzle plane has no blackhole plane of its own any more
        let nz = adjusted.get(NZ_RIGHT, 10.5176 - 6.0).unwrap();
        let bh = carving.changes.at(Side::Right, nz.depth()).unwrap();
        assert!((nz.rmin - bh).abs() < 1e-12);
        assert!(nz.rmin > 0.79922);
    }

    #[test]
    fn test_nozzle_untouched_without_changes() {
        let (nozzle, _) = bases();
        let adjusted = adjust_nozzle(&nozzle, &RmaxChanges::default(), 1.0, &Limits::default());
        assert_eq!(adjusted, nozzle);
    }
}
