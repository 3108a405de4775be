//! Killzone sweep: a series of nozzles whose absorbing front moves away from
//! the tip while the nozzle's inner radius closes in.

use crate::models::{NozzleError, Result, SweepConfig};
use serde::Serialize;

/// A named killzone plane in original coordinates, cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KillzonePlane {
    pub name: &'static str,
    pub z: f64,
    pub rmin: f64,
    pub rmax: f64,
}

impl KillzonePlane {
    const fn new(name: &'static str, z: f64, rmin: f64, rmax: f64) -> Self {
        Self {
            name,
            z,
            rmin,
            rmax,
        }
    }
}

/// Killzone profile before any shrinking.
pub const KILLZONE_PLANES: [KillzonePlane; 5] = [
    KillzonePlane::new("tip", 6.0, 0.3, 2.49223),
    KillzonePlane::new("kink1", 100.0, 0.3, 13.53),
    KillzonePlane::new("kink2", 100.0, 0.3, 11.0),
    KillzonePlane::new("z200", 200.0, 0.596, 13.0),
    KillzonePlane::new("z600", 600.0, 1.78, 50.0),
];

/// One generated nozzle of the sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepStep {
    pub index: usize,
    /// Depth of the killzone front, cm
    pub z_front: f64,
    /// z of the nozzle's first plane, cm
    pub nozzle_z: f64,
    /// Inner nozzle radius, cm
    pub nozzle_rmin: f64,
    /// Killzone planes at or beyond the front
    pub killzone: Vec<KillzonePlane>,
}

impl SweepStep {
    pub fn file_name(&self) -> String {
        format!(
            "nozzle_rstep{:03}_rdepth{:.2}_zdepth{:.2}_zstep{:03}.xml",
            self.index, self.nozzle_rmin, self.z_front, self.index
        )
    }

    pub fn folder_name(&self) -> String {
        self.file_name().trim_end_matches(".xml").to_string()
    }
}

/// Linear sweep of front depth and inner radius.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPlan {
    pub z_start: f64,
    pub z_end: f64,
    pub r_start: f64,
    pub r_end: f64,
    pub num_steps: usize,
}

impl SweepPlan {
    pub fn new(z_start: f64, z_end: f64, r_start: f64, r_end: f64, num_steps: usize) -> Result<Self> {
        if num_steps < 2 {
            return Err(NozzleError::InvalidInput(format!(
                "a sweep needs at least 2 steps, got {num_steps}"
            )));
        }
        if ![z_start, z_end, r_start, r_end].iter().all(|v| v.is_finite()) {
            return Err(NozzleError::InvalidInput(
                "sweep bounds must be finite".to_string(),
            ));
        }
        Ok(Self {
            z_start,
            z_end,
            r_start,
            r_end,
            num_steps,
        })
    }

    pub fn from_config(config: &SweepConfig) -> Result<Self> {
        Self::new(
            config.z_start,
            config.z_end,
            config.r_start,
            config.r_end,
            config.num_steps,
        )
    }

    pub fn z_step(&self) -> f64 {
        (self.z_end - self.z_start) / (self.num_steps - 1) as f64
    }

    pub fn r_step(&self) -> f64 {
        (self.r_start - self.r_end) / (self.num_steps - 1) as f64
    }

    /// All steps in order. Killzone radii shrink by one radius step after
    /// every step and never drop below the plane's inner radius.
    pub fn steps(&self) -> Vec<SweepStep> {
        let (z_step, r_step) = (self.z_step(), self.r_step());
        let mut rmax: Vec<f64> = KILLZONE_PLANES.iter().map(|p| p.rmax).collect();

        (0..self.num_steps)
            .map(|index| {
                let i = index as f64;
                let z_front = self.z_start + i * z_step;
                let killzone = KILLZONE_PLANES
                    .iter()
                    .zip(&rmax)
                    .filter(|(p, _)| p.z >= z_front)
                    .map(|(p, r)| KillzonePlane { rmax: *r, ..*p })
                    .collect();

                let step = SweepStep {
                    index,
                    z_front,
                    nozzle_z: self.z_start,
                    nozzle_rmin: self.r_end.max(self.r_start - i * r_step),
                    killzone,
                };

                for (r, plane) in rmax.iter_mut().zip(KILLZONE_PLANES.iter()) {
                    *r = plane.rmin.max(*r - r_step);
                }
                step
            })
            .collect()
    }
}
