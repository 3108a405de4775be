//! Zplane tables keyed by `(component, z)`.

use super::component::{Component, Shield, Side};
use serde::{Deserialize, Serialize};

/// Inner and outer radius at one longitudinal position, cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZPlane {
    pub z: f64,
    pub rmin: f64,
    pub rmax: f64,
}

impl ZPlane {
    pub fn new(z: f64, rmin: f64, rmax: f64) -> Self {
        Self { z, rmin, rmax }
    }

    /// Distance from the tip (tip-relative tables) or from the origin.
    pub fn depth(&self) -> f64 {
        self.z.abs()
    }

    pub fn thickness(&self) -> f64 {
        self.rmax - self.rmin
    }
}

/// Insertion-ordered `(component, z) -> (rmin, rmax)` table.
///
/// Inserting an existing key replaces its radii in place, keeping the
/// original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryTable {
    entries: Vec<(Component, ZPlane)>,
}

impl GeometryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, component: Component, plane: ZPlane) {
        match self
            .entries
            .iter_mut()
            .find(|(c, p)| *c == component && p.z == plane.z)
        {
            Some((_, existing)) => *existing = plane,
            None => self.entries.push((component, plane)),
        }
    }

    pub fn get(&self, component: Component, z: f64) -> Option<ZPlane> {
        self.entries
            .iter()
            .find(|(c, p)| *c == component && p.z == z)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, ZPlane)> + '_ {
        self.entries.iter().copied()
    }

    /// Planes of one component ordered by depth.
    pub fn planes(&self, component: Component) -> Vec<ZPlane> {
        let mut planes: Vec<ZPlane> = self
            .entries
            .iter()
            .filter(|(c, _)| *c == component)
            .map(|(_, p)| *p)
            .collect();
        planes.sort_by(|a, b| a.depth().total_cmp(&b.depth()));
        planes
    }

    /// Components present, in first-insertion order.
    pub fn components(&self) -> Vec<Component> {
        let mut seen = Vec::new();
        for (c, _) in &self.entries {
            if !seen.contains(c) {
                seen.push(*c);
            }
        }
        seen
    }

    /// Entries of `other` are inserted after (and override) ours.
    pub fn merge(&mut self, other: &GeometryTable) {
        for (component, plane) in other.iter() {
            self.insert(component, plane);
        }
    }

    /// Only the entries of one shield.
    pub fn shield(&self, shield: Shield) -> GeometryTable {
        GeometryTable {
            entries: self
                .entries
                .iter()
                .filter(|(c, _)| c.shield == shield)
                .copied()
                .collect(),
        }
    }

    /// Convert original coordinates to tip-relative ones.
    pub fn offset_to_tip(&self, tip_z: f64) -> GeometryTable {
        self.map_z(|side, z| to_tip_relative(z, side, tip_z))
    }

    /// Convert tip-relative coordinates back to original ones.
    pub fn offset_from_tip(&self, tip_z: f64) -> GeometryTable {
        self.map_z(|side, z| from_tip_relative(z, side, tip_z))
    }

    fn map_z(&self, f: impl Fn(Side, f64) -> f64) -> GeometryTable {
        GeometryTable {
            entries: self
                .entries
                .iter()
                .map(|(c, p)| (*c, ZPlane::new(f(c.side, p.z), p.rmin, p.rmax)))
                .collect(),
        }
    }
}

impl FromIterator<(Component, ZPlane)> for GeometryTable {
    fn from_iter<I: IntoIterator<Item = (Component, ZPlane)>>(iter: I) -> Self {
        let mut table = GeometryTable::new();
        for (component, plane) in iter {
            table.insert(component, plane);
        }
        table
    }
}

/// Shift a z so the tip sits at zero; both sides stay mirror images.
pub fn to_tip_relative(z: f64, side: Side, tip_z: f64) -> f64 {
    z - side.sign() * tip_z
}

pub fn from_tip_relative(z: f64, side: Side, tip_z: f64) -> f64 {
    z + side.sign() * tip_z
}

// (z, rmin, rmax) of the +z side in original coordinates, cm.
const NOZZLE_PROFILE: [(f64, f64, f64); 7] = [
    (6.0, 1.0, 1.0),
    (10.5176, 0.79922, 1.79923),
    (15.0, 1.58694, 2.58694),
    (99.99999999, 16.57473619, 17.57473619),
    (100.0, 12.47473619, 13.47473619),
    (204.48824, 12.47473619, 13.47473619),
    (595.0, 42.0, 43.0),
];

const BLACKHOLE_PROFILE: [(f64, f64, f64); 6] = [
    (10.5176, 0.79922, 0.79922),
    (15.0, 0.6, 1.58694),
    (99.99999999, 0.3, 16.57473619),
    (100.0, 0.3, 12.47473619),
    (204.48824, 0.6124092832, 12.47473619),
    (595.0, 1.78, 42.0),
];

fn mirrored(shield: Shield, profile: &[(f64, f64, f64)]) -> GeometryTable {
    Side::ALL
        .into_iter()
        .flat_map(|side| {
            profile.iter().map(move |&(z, rmin, rmax)| {
                (Component::new(shield, side), ZPlane::new(side.z(z), rmin, rmax))
            })
        })
        .collect()
}

/// Reference tungsten nozzle, original coordinates.
pub fn nozzle_base() -> GeometryTable {
    mirrored(Shield::Nozzle, &NOZZLE_PROFILE)
}

/// Reference blackhole volume, original coordinates.
pub fn blackhole_base() -> GeometryTable {
    mirrored(Shield::Blackhole, &BLACKHOLE_PROFILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOZZLE_RIGHT: Component = Component::new(Shield::Nozzle, Side::Right);
    const NOZZLE_LEFT: Component = Component::new(Shield::Nozzle, Side::Left);

    #[test]
    fn test_insert_replaces_in_place() {
        let mut table = GeometryTable::new();
        table.insert(NOZZLE_RIGHT, ZPlane::new(1.0, 0.1, 0.2));
        table.insert(NOZZLE_RIGHT, ZPlane::new(2.0, 0.3, 0.4));
        table.insert(NOZZLE_RIGHT, ZPlane::new(1.0, 0.5, 0.6));

        assert_eq!(table.len(), 2);
        let first = table.iter().next().unwrap().1;
        assert_eq!(first, ZPlane::new(1.0, 0.5, 0.6));
    }

    #[test]
    fn test_base_tables_are_mirrored() {
        let nozzle = nozzle_base();
        assert_eq!(nozzle.len(), 14);
        let right = nozzle.planes(NOZZLE_RIGHT);
        let left = nozzle.planes(NOZZLE_LEFT);
        for (r, l) in right.iter().zip(left.iter()) {
            assert_eq!(r.z, -l.z);
            assert_eq!((r.rmin, r.rmax), (l.rmin, l.rmax));
        }
        assert_eq!(blackhole_base().len(), 12);
    }

    #[test]
    fn test_tip_offset_round_trip() {
        let original = nozzle_base();
        let relative = original.offset_to_tip(6.0);

        let right = relative.planes(NOZZLE_RIGHT);
        let left = relative.planes(NOZZLE_LEFT);
        assert_eq!(right[0].depth(), 0.0);
        assert_eq!(left[0].depth(), 0.0);
        assert!((right[1].z - 4.5176).abs() < 1e-12);
        assert!((left[1].z + 4.5176).abs() < 1e-12);

        let back = relative.offset_from_tip(6.0);
        for ((_, a), (_, b)) in original.iter().zip(back.iter()) {
            assert!((a.z - b.z).abs() < 1e-9);
        }
    }

    #[test]
    fn test_merge_and_shield_filter() {
        let mut table = nozzle_base();
        table.merge(&blackhole_base());
        assert_eq!(table.len(), 26);
        assert_eq!(table.shield(Shield::Blackhole).len(), 12);
        assert_eq!(table.components().len(), 4);
    }
}
