//! Analysis module - histograms of event dumps.
//!
//! Datasets are processed concurrently, each on a blocking thread, with the
//! number in flight bounded by a semaphore.

mod dataset;
mod histogram;
mod kinematics;
mod recipes;
mod report;

pub use dataset::*;
pub use histogram::*;
pub use kinematics::*;
pub use recipes::*;
pub use report::*;

use crate::models::{AnalysisConfig, NozzleError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Histograms every dataset found below a base folder.
#[derive(Debug, Clone)]
pub struct Analyzer {
    base_dir: PathBuf,
    output_dir: PathBuf,
    options: ReadOptions,
    recipes: Vec<Recipe>,
    workers: usize,
}

impl Analyzer {
    pub fn new(base_dir: &Path, config: &AnalysisConfig) -> Result<Self> {
        if !base_dir.is_dir() {
            return Err(NozzleError::InvalidInput(format!(
                "Event folder does not exist: {}",
                base_dir.display()
            )));
        }
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            output_dir: config.output_dir.clone(),
            options: ReadOptions {
                max_events: config.max_events,
                collections: config.collections.clone(),
            },
            recipes: parse_recipes(&config.recipes)?,
            workers: config.workers.max(1),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fill every recipe for one dataset.
    pub fn process(&self, dataset: &Dataset) -> Result<DatasetReport> {
        info!(dataset = %dataset.name, files = dataset.files.len(), "Processing dataset");

        let mut booked: Vec<Booked> = self.recipes.iter().map(|r| r.book(&dataset.name)).collect();
        let stats = read_dataset(dataset, &self.options, |obs| {
            for b in booked.iter_mut() {
                b.fill(obs);
            }
        })?;

        info!(
            dataset = %dataset.name,
            events = stats.events,
            records = stats.records,
            "Dataset processed"
        );
        let histograms = booked.into_iter().flat_map(Booked::into_histograms).collect();
        Ok(DatasetReport::new(dataset.name.clone(), stats, histograms))
    }

    /// Discover, process and write all datasets. Reports come back in
    /// dataset name order. A dataset that fails is logged and left out.
    pub async fn run(&self) -> Result<Vec<DatasetReport>> {
        info!(base = %self.base_dir.display(), "Searching for event files");
        let datasets = discover(&self.base_dir)?;
        if datasets.is_empty() {
            warn!(base = %self.base_dir.display(), "No event files found");
            return Ok(Vec::new());
        }
        for dataset in &datasets {
            info!(dataset = %dataset.name, files = dataset.files.len(), "Found dataset");
        }

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let pb = crate::pipeline::progress_bar(datasets.len() as u64);
        let mut handles = Vec::with_capacity(datasets.len());

        for dataset in datasets {
            let semaphore = Arc::clone(&semaphore);
            let analyzer = self.clone();
            let name = dataset.name.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| NozzleError::Internal("Semaphore closed".to_string()))?;
                tokio::task::spawn_blocking(move || analyzer.process(&dataset))
                    .await
                    .map_err(|e| NozzleError::Internal(format!("Analysis panicked: {e}")))?
            });
            handles.push((name, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut failed = 0;
        for (name, handle) in handles {
            pb.inc(1);
            let result = handle
                .await
                .unwrap_or_else(|e| Err(NozzleError::Internal(format!("Task panicked: {e}"))));
            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    error!(dataset = %name, error = %e, "Dataset failed");
                    failed += 1;
                    continue;
                }
            };
            let folder = report.write(&self.output_dir)?;
            info!(dataset = %report.dataset, folder = %folder.display(), "Wrote histograms");
            reports.push(report);
        }
        pb.finish_with_message(format!("Done! {} datasets, {} failed", reports.len(), failed));

        if let Some(path) = write_comparison(&reports, &self.output_dir)? {
            info!(path = %path.display(), "Wrote comparison");
        }
        info!(output = %self.output_dir.display(), "Analysis complete");
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_events(path: &Path, events: u64) {
        let lines: Vec<String> = (0..events)
            .map(|e| {
                format!(
                    r#"{{"event":{e},"collection":"MCParticle","x":1.0,"y":0.0,"z":{}.0,"energy":2.0}}"#,
                    e * 10
                )
            })
            .collect();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, lines.join("\n")).unwrap();
    }

    fn config(dir: &TempDir) -> AnalysisConfig {
        AnalysisConfig {
            output_dir: dir.path().join("plots"),
            max_events: Some(3),
            workers: 2,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_rejects_unknown_recipe() {
        let dir = TempDir::new().unwrap();
        let config = AnalysisConfig {
            recipes: vec!["lego".to_string()],
            ..AnalysisConfig::default()
        };
        assert!(Analyzer::new(dir.path(), &config).is_err());
        assert!(Analyzer::new(&dir.path().join("nope"), &AnalysisConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_run_writes_reports() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("events");
        write_events(&events.join("bib/a.jsonl"), 5);
        write_events(&events.join("signal/b.jsonl"), 2);

        let analyzer = Analyzer::new(&events, &config(&dir)).unwrap();
        let reports = analyzer.run().await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].dataset, "bib");
        assert_eq!(reports[0].stats.events, 3);
        assert_eq!(reports[1].stats.events, 2);

        let plots = dir.path().join("plots");
        let summary = fs::read_to_string(plots.join("bib/summary.txt")).unwrap();
        assert!(summary.contains("Total events processed: 3\n"));
        assert!(summary.contains("Mean Z: 10.00 mm\n"));
        assert!(plots.join("signal/histograms.json").exists());
        assert!(plots.join("comparisons/production_theta.json").exists());
    }

    #[tokio::test]
    async fn test_failed_dataset_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("events");
        write_events(&events.join("good/a.jsonl"), 2);
        fs::create_dir_all(events.join("broken")).unwrap();
        // Not UTF-8, so the line reader fails
        fs::write(events.join("broken/a.jsonl"), [0xff, 0xfe, b'\n']).unwrap();

        let analyzer = Analyzer::new(&events, &config(&dir)).unwrap();
        let reports = analyzer.run().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].dataset, "good");
        let plots = dir.path().join("plots");
        assert!(plots.join("good/summary.txt").exists());
        assert!(!plots.join("broken").exists());
    }

    #[tokio::test]
    async fn test_dataset_named_like_comparison_folder() {
        let dir = TempDir::new().unwrap();
        let events = dir.path().join("events");
        write_events(&events.join("comparisons/a.jsonl"), 2);
        write_events(&events.join("bib/run1/a.jsonl"), 2);
        write_events(&events.join("sig/run1/a.jsonl"), 2);

        let analyzer = Analyzer::new(&events, &config(&dir)).unwrap();
        let reports = analyzer.run().await.unwrap();
        assert_eq!(reports.len(), 3);

        let plots = dir.path().join("plots");
        assert!(plots.join("bib/run1/summary.txt").exists());
        assert!(plots.join("sig/run1/summary.txt").exists());
        assert!(plots.join("comparisons/summary.txt").exists());
        assert!(plots.join("comparisons/histograms.json").exists());

        let overlay: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(plots.join("comparisons/production_theta.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(overlay.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_run_without_events() {
        let dir = TempDir::new().unwrap();
        let analyzer = Analyzer::new(dir.path(), &config(&dir)).unwrap();
        assert!(analyzer.run().await.unwrap().is_empty());
    }
}
