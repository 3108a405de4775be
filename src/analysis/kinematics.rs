//! Spherical and cylindrical views of a position or momentum.

use serde::{Deserialize, Serialize};

/// A point or momentum in detector coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance from the origin.
    pub fn r(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Distance from the beam axis.
    pub fn rho(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Polar angle from +z. Undefined at the origin.
    pub fn theta(&self) -> Option<f64> {
        let r = self.r();
        if r == 0.0 {
            return None;
        }
        Some((self.z / r).clamp(-1.0, 1.0).acos())
    }

    /// Azimuth in `[-pi, pi]`.
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
}
