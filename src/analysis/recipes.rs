//! Histogram recipes filled per dataset.

use super::{Axis, Hist1D, Hist2D, Histogram, Observation};
use crate::models::NozzleError;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

const Z_RANGE: (f64, f64) = (-2600.0, 2600.0);
const RHO_RANGE: (f64, f64) = (0.0, 400.0);

/// A named set of histograms and the rule that fills them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipe {
    /// Vertex rho vs z plus its projections and the energy spectrum
    VertexMap,
    /// Polar angle of production vertices
    ProductionTheta,
    /// Energy-weighted theta vs phi
    AngularMap,
}

impl Recipe {
    pub const ALL: [Recipe; 3] = [Self::VertexMap, Self::ProductionTheta, Self::AngularMap];

    pub fn name(&self) -> &'static str {
        match self {
            Self::VertexMap => "vertex_map",
            Self::ProductionTheta => "production_theta",
            Self::AngularMap => "angular_map",
        }
    }

    /// Fresh histograms for `dataset`.
    pub fn book(&self, dataset: &str) -> Booked {
        match self {
            Self::VertexMap => Booked::VertexMap {
                map: Hist2D::new(
                    "r_vs_z",
                    format!("Vertex Map R vs Z - {dataset}"),
                    Axis::new(50, Z_RANGE.0, Z_RANGE.1),
                    Axis::new(50, RHO_RANGE.0, RHO_RANGE.1),
                ),
                z: Hist1D::new(
                    "z_dist",
                    format!("Z Distribution - {dataset}"),
                    Axis::new(100, Z_RANGE.0, Z_RANGE.1),
                ),
                rho: Hist1D::new(
                    "r_dist",
                    format!("R Distribution - {dataset}"),
                    Axis::new(100, RHO_RANGE.0, RHO_RANGE.1),
                ),
                energy: Hist1D::new(
                    "energy",
                    format!("Energy - {dataset}"),
                    Axis::new(100, 0.0, 100.0),
                ),
            },
            Self::ProductionTheta => Booked::ProductionTheta {
                theta: Hist1D::new(
                    "theta",
                    format!("Production Theta - {dataset}"),
                    Axis::new(50, 0.0, PI),
                ),
            },
            Self::AngularMap => Booked::AngularMap {
                map: Hist2D::new(
                    "theta_vs_phi",
                    format!("Energy-weighted Theta vs Phi - {dataset}"),
                    Axis::new(100, 0.0, PI),
                    Axis::new(100, -PI, PI),
                ),
            },
        }
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Recipe {
    type Err = NozzleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| NozzleError::InvalidInput(format!("Unknown histogram recipe: {s}")))
    }
}

/// Histograms of one recipe being filled.
#[derive(Debug, Clone)]
pub enum Booked {
    VertexMap {
        map: Hist2D,
        z: Hist1D,
        rho: Hist1D,
        energy: Hist1D,
    },
    ProductionTheta {
        theta: Hist1D,
    },
    AngularMap {
        map: Hist2D,
    },
}

impl Booked {
    pub fn fill(&mut self, obs: &Observation) {
        let p = obs.position();
        match self {
            Self::VertexMap { map, z, rho, energy } => {
                map.fill(p.z, p.rho());
                z.fill(p.z);
                rho.fill(p.rho());
                if let Some(e) = obs.energy {
                    energy.fill(e);
                }
            }
            Self::ProductionTheta { theta } => {
                if let Some(t) = p.theta() {
                    theta.fill(t);
                }
            }
            Self::AngularMap { map } => {
                if let Some(t) = p.theta() {
                    map.fill_weighted(t, p.phi(), obs.energy.unwrap_or(1.0));
                }
            }
        }
    }

    pub fn into_histograms(self) -> Vec<Histogram> {
        match self {
            Self::VertexMap { map, z, rho, energy } => vec![
                Histogram::Two(map),
                Histogram::One(z),
                Histogram::One(rho),
                Histogram::One(energy),
            ],
            Self::ProductionTheta { theta } => vec![Histogram::One(theta)],
            Self::AngularMap { map } => vec![Histogram::Two(map)],
        }
    }
}

/// Parse configured recipe names, dropping duplicates.
pub fn parse_recipes(names: &[String]) -> crate::models::Result<Vec<Recipe>> {
    let mut recipes = Vec::new();
    for name in names {
        let recipe: Recipe = name.parse()?;
        if !recipes.contains(&recipe) {
            recipes.push(recipe);
        }
    }
    Ok(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(x: f64, y: f64, z: f64, energy: Option<f64>) -> Observation {
        Observation {
            event: 0,
            collection: "MCParticle".to_string(),
            x,
            y,
            z,
            energy,
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("angular_map".parse::<Recipe>().unwrap(), Recipe::AngularMap);
        assert!("lego".parse::<Recipe>().is_err());

        let names = vec!["vertex_map".to_string(), "vertex_map".to_string()];
        assert_eq!(parse_recipes(&names).unwrap(), vec![Recipe::VertexMap]);
    }

    #[test]
    fn test_vertex_map() {
        let mut booked = Recipe::VertexMap.book("bib");
        booked.fill(&obs(30.0, 40.0, 100.0, Some(2.0)));
        booked.fill(&obs(0.0, 0.0, -5000.0, None));

        let hists = booked.into_histograms();
        let Histogram::Two(map) = &hists[0] else {
            panic!("expected a 2D map");
        };
        assert_eq!(map.entries, 2);
        assert_eq!(map.integral(), 1.0);
        assert!(map.title.ends_with("- bib"));

        let Histogram::One(energy) = &hists[3] else {
            panic!("expected energy");
        };
        assert_eq!(energy.entries, 1);
        assert_eq!(energy.mean(), Some(2.0));
    }

    #[test]
    fn test_theta_skips_origin() {
        let mut booked = Recipe::ProductionTheta.book("d");
        booked.fill(&obs(0.0, 0.0, 0.0, None));
        booked.fill(&obs(1.0, 0.0, 0.0, None));
        let hists = booked.into_histograms();
        assert_eq!(hists[0].entries(), 1);
    }

    #[test]
    fn test_angular_map_weights() {
        let mut booked = Recipe::AngularMap.book("d");
        booked.fill(&obs(1.0, 0.0, 0.0, Some(4.0)));
        booked.fill(&obs(1.0, 0.0, 0.0, None));
        let Histogram::Two(map) = &booked.into_histograms()[0] else {
            panic!("expected a 2D map");
        };
        assert_eq!(map.integral(), 5.0);
    }
}
