//! Per-dataset outputs and cross-dataset overlays.

use super::{Hist1D, Histogram, ReadStats};
use crate::models::{NozzleError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const COMPARISON_DIR: &str = "comparisons";

/// Everything produced for one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub stats: ReadStats,
    pub histograms: BTreeMap<String, Histogram>,
}

impl DatasetReport {
    pub fn new(dataset: impl Into<String>, stats: ReadStats, histograms: Vec<Histogram>) -> Self {
        Self {
            dataset: dataset.into(),
            stats,
            histograms: histograms
                .into_iter()
                .map(|h| (h.name().to_string(), h))
                .collect(),
        }
    }

    pub fn hist1d(&self, name: &str) -> Option<&Hist1D> {
        match self.histograms.get(name)? {
            Histogram::One(h) => Some(h),
            Histogram::Two(_) => None,
        }
    }

    fn mean_of(&self, name: &str) -> f64 {
        self.hist1d(name).and_then(Hist1D::mean).unwrap_or(0.0)
    }

    pub fn summary(&self) -> String {
        format!(
            "Dataset: {}\n\
             Total events processed: {}\n\
             Total records: {}\n\
             Mean Z: {:.2} mm\n\
             Mean R: {:.2} mm\n\
             Mean Energy: {:.2} GeV\n",
            self.dataset,
            self.stats.events,
            self.stats.records,
            self.mean_of("z_dist"),
            self.mean_of("r_dist"),
            self.mean_of("energy"),
        )
    }

    /// Write `histograms.json` and `summary.txt` under
    /// `<output_dir>/<dataset>`. Returns that folder.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let dir = output_dir.join(&self.dataset);
        fs::create_dir_all(&dir)
            .map_err(|e| NozzleError::io(format!("creating {}", dir.display()), e))?;

        write_json(&dir.join("histograms.json"), self)?;
        let summary = dir.join("summary.txt");
        fs::write(&summary, self.summary())
            .map_err(|e| NozzleError::io(format!("writing {}", summary.display()), e))?;
        Ok(dir)
    }
}

#[derive(Serialize)]
struct Overlay<'a> {
    dataset: &'a str,
    histogram: &'a Hist1D,
}

/// Overlay the production theta histograms of all datasets. Nothing is
/// written for fewer than two datasets.
pub fn write_comparison(reports: &[DatasetReport], output_dir: &Path) -> Result<Option<PathBuf>> {
    if reports.len() < 2 {
        info!("Not enough datasets for comparison");
        return Ok(None);
    }
    let overlays: Vec<Overlay<'_>> = reports
        .iter()
        .filter_map(|r| {
            r.hist1d("theta").map(|histogram| Overlay {
                dataset: &r.dataset,
                histogram,
            })
        })
        .collect();
    if overlays.len() < 2 {
        info!("Production theta not filled for two datasets, no comparison");
        return Ok(None);
    }

    let dir = output_dir.join(COMPARISON_DIR);
    fs::create_dir_all(&dir)
        .map_err(|e| NozzleError::io(format!("creating {}", dir.display()), e))?;
    let path = dir.join("production_theta.json");
    write_json(&path, &overlays)?;
    Ok(Some(path))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| NozzleError::Internal(format!("Failed to serialize {}: {e}", path.display())))?;
    fs::write(path, json).map_err(|e| NozzleError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Observation, Recipe};
    use tempfile::TempDir;

    fn report(name: &str) -> DatasetReport {
        let mut histograms = Vec::new();
        for recipe in [Recipe::VertexMap, Recipe::ProductionTheta] {
            let mut booked = recipe.book(name);
            booked.fill(&Observation {
                event: 0,
                collection: "MCParticle".to_string(),
                x: 3.0,
                y: 4.0,
                z: 10.0,
                energy: Some(1.25),
            });
            histograms.extend(booked.into_histograms());
        }
        let stats = ReadStats {
            events: 1,
            records: 1,
            ..ReadStats::default()
        };
        DatasetReport::new(name, stats, histograms)
    }

    #[test]
    fn test_summary() {
        let text = report("bib").summary();
        assert!(text.starts_with("Dataset: bib\nTotal events processed: 1\nTotal records: 1\n"));
        assert!(text.contains("Mean R: 5.00 mm\n"));
        assert!(text.contains("Mean Energy: 1.25 GeV\n"));
    }

    #[test]
    fn test_write_outputs() {
        let dir = TempDir::new().unwrap();
        let folder = report("bib").write(dir.path()).unwrap();
        assert!(folder.join("summary.txt").exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(folder.join("histograms.json")).unwrap())
                .unwrap();
        assert_eq!(json["dataset"], "bib");
        assert_eq!(json["histograms"]["r_vs_z"]["kind"], "2d");
        assert_eq!(json["histograms"]["theta"]["entries"], 1);
    }

    #[test]
    fn test_comparison_needs_two() {
        let dir = TempDir::new().unwrap();
        assert!(write_comparison(&[report("a")], dir.path()).unwrap().is_none());

        let path = write_comparison(&[report("a"), report("b")], dir.path())
            .unwrap()
            .unwrap();
        assert!(path.ends_with("comparisons/production_theta.json"));
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[1]["dataset"], "b");
    }
}
