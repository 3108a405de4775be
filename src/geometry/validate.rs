//! Feasibility checks for a requested radius reduction.

use super::component::{Component, Shield, Side};
use super::interp::{approx_nozzle_outer_radius, interpolate_planes};
use super::table::GeometryTable;
use crate::models::GeometryConfig;
use serde::Serialize;
use std::fmt;

/// Safety limits applied when shrinking a shield.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Limits {
    /// Smallest allowed blackhole start depth
    pub min_blackhole_start: f64,
    /// Largest fraction of the available wall a reduction may consume
    pub max_reduction_factor: f64,
    /// Wall thickness that is always preserved
    pub min_thickness: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&GeometryConfig::default())
    }
}

impl From<&GeometryConfig> for Limits {
    fn from(config: &GeometryConfig) -> Self {
        Self {
            min_blackhole_start: config.min_blackhole_start,
            max_reduction_factor: config.max_reduction_factor,
            min_thickness: config.min_thickness,
        }
    }
}

/// Why a reduction cannot be applied at a depth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReductionIssue {
    NoGeometry { shield: Shield },
    ExceedsRadius { reduction: f64, rmax: f64, depth: f64 },
    InsufficientThickness { reduction: f64, available: f64, depth: f64 },
    ExceedsFraction { reduction: f64, factor: f64, depth: f64 },
}

impl fmt::Display for ReductionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoGeometry { shield } => write!(f, "No {shield:?} geometry found"),
            Self::ExceedsRadius {
                reduction,
                rmax,
                depth,
            } => write!(
                f,
                "Reduction {reduction:.4} cm exceeds radius {rmax:.4} cm at z={depth:.4} cm"
            ),
            Self::InsufficientThickness {
                reduction,
                available,
                depth,
            } => write!(
                f,
                "Reduction {reduction:.4} cm would leave insufficient thickness at z={depth:.4} cm (available: {available:.4} cm)"
            ),
            Self::ExceedsFraction {
                reduction,
                factor,
                depth,
            } => write!(
                f,
                "Reduction {reduction:.4} cm exceeds {}% of available space at z={depth:.4} cm",
                factor * 100.0
            ),
        }
    }
}

/// Result of checking one depth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionCheck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<ReductionIssue>,
    /// Largest reduction considered safe there (the request itself when valid)
    pub suggested: f64,
}

impl PositionCheck {
    pub fn is_valid(&self) -> bool {
        self.issue.is_none()
    }
}

/// Wall radii of a shield at a depth, from its +z planes beyond the tip.
fn wall_at(table: &GeometryTable, shield: Shield, depth: f64) -> Option<(f64, f64)> {
    let planes: Vec<_> = table
        .planes(Component::new(shield, Side::Right))
        .into_iter()
        .filter(|p| p.z > 0.0)
        .collect();
    let first = planes.first()?;
    let last = planes.last()?;

    if let Some(p) = planes.iter().find(|p| (p.depth() - depth).abs() < 1e-6) {
        return Some((p.rmin, p.rmax));
    }

    if let Some(pair) = planes
        .windows(2)
        .find(|w| w[0].depth() <= depth && depth <= w[1].depth())
    {
        return Some(interpolate_planes(depth, &pair[0], &pair[1]));
    }

    if depth < first.depth() {
        // Near the tip the wall is roughly 1 cm thick
        let rmax = approx_nozzle_outer_radius(depth);
        Some(((rmax - 1.0).max(0.0), rmax))
    } else {
        Some((last.rmin, last.rmax))
    }
}

/// Check whether `reduction` can be taken out of `shield` at `depth`.
pub fn validate_reduction_at(
    depth: f64,
    reduction: f64,
    table: &GeometryTable,
    shield: Shield,
    limits: &Limits,
) -> PositionCheck {
    let Some((rmin, rmax)) = wall_at(table, shield, depth) else {
        return PositionCheck {
            issue: Some(ReductionIssue::NoGeometry { shield }),
            suggested: 0.0,
        };
    };

    let available = rmax - rmin;
    let factor = limits.max_reduction_factor;

    let (issue, suggested) = if reduction >= rmax {
        (
            ReductionIssue::ExceedsRadius {
                reduction,
                rmax,
                depth,
            },
            (rmax * factor).min(available - limits.min_thickness),
        )
    } else if reduction >= available - limits.min_thickness {
        (
            ReductionIssue::InsufficientThickness {
                reduction,
                available,
                depth,
            },
            available * factor,
        )
    } else if reduction > available * factor {
        (
            ReductionIssue::ExceedsFraction {
                reduction,
                factor,
                depth,
            },
            available * factor,
        )
    } else {
        return PositionCheck {
            issue: None,
            suggested: reduction,
        };
    };

    PositionCheck {
        issue: Some(issue),
        suggested: suggested.max(0.0),
    }
}

/// Validation outcome for a whole variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub messages: Vec<String>,
    /// Smallest suggestion over the failed positions, 0 when valid
    pub suggested_reduction: f64,
}

/// Validate a variant. Only the blackhole start position is checked.
pub fn validate_configuration(
    z_start: f64,
    reduction: f64,
    table: &GeometryTable,
    limits: &Limits,
) -> ValidationReport {
    let checks = [validate_reduction_at(
        z_start,
        reduction,
        table,
        Shield::Nozzle,
        limits,
    )];

    let failed: Vec<&PositionCheck> = checks.iter().filter(|c| !c.is_valid()).collect();
    let messages = failed
        .iter()
        .filter_map(|c| c.issue.as_ref().map(ToString::to_string))
        .collect();
    let suggested_reduction = failed
        .iter()
        .map(|c| c.suggested)
        .reduce(f64::min)
        .unwrap_or(0.0);

    ValidationReport {
        valid: failed.is_empty(),
        messages,
        suggested_reduction,
    }
}
