//! Shield components and their detector names.

use crate::models::NozzleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which end of the detector a component sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// +z
    Right,
    /// -z
    Left,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Right, Side::Left];

    /// Sign of z on this side.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Right => 1.0,
            Side::Left => -1.0,
        }
    }

    /// Signed z for a depth on this side.
    pub fn z(&self, depth: f64) -> f64 {
        depth.abs().copysign(self.sign())
    }

    pub fn of(z: f64) -> Self {
        if z.is_sign_negative() { Side::Left } else { Side::Right }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Side::Right => "right",
            Side::Left => "left",
        }
    }
}

/// Shielding volume kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shield {
    /// Tungsten nozzle (`NozzleW_*`)
    Nozzle,
    /// Absorbing volume carved out of the nozzle (`NozzleBlackhole_*`)
    Blackhole,
}

impl Shield {
    fn prefix(&self) -> &'static str {
        match self {
            Shield::Nozzle => "NozzleW",
            Shield::Blackhole => "NozzleBlackhole",
        }
    }
}

/// One of the four detectors the generator rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Component {
    pub shield: Shield,
    pub side: Side,
}

impl Component {
    pub const TARGETS: [Component; 4] = [
        Component::new(Shield::Nozzle, Side::Right),
        Component::new(Shield::Nozzle, Side::Left),
        Component::new(Shield::Blackhole, Side::Right),
        Component::new(Shield::Blackhole, Side::Left),
    ];

    pub const fn new(shield: Shield, side: Side) -> Self {
        Self { shield, side }
    }

    /// The component of the other shield on the same side.
    pub fn counterpart(&self) -> Self {
        let shield = match self.shield {
            Shield::Nozzle => Shield::Blackhole,
            Shield::Blackhole => Shield::Nozzle,
        };
        Self::new(shield, self.side)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.shield.prefix(), self.side.suffix())
    }
}

impl FromStr for Component {
    type Err = NozzleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Component::TARGETS
            .into_iter()
            .find(|c| c.to_string() == s)
            .ok_or_else(|| NozzleError::ParseError(format!("Unknown component: {s}")))
    }
}
