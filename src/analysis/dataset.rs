//! Event dumps: discovery and streaming.
//!
//! A dump is a JSON-lines file with one record per object. Records of the
//! same event are consecutive and share the `event` id.

use super::Vec3;
use crate::models::{NozzleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One object of an event, positions in mm and energy in GeV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub event: u64,
    pub collection: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub energy: Option<f64>,
}

impl Observation {
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Dump files that belong together.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Find `*.jsonl` below `base`, grouped by parent folder. A dataset is
/// named by its folder's path relative to `base`, `/`-separated. Files
/// directly in `base` form a dataset named after their stem.
pub fn discover(base: &Path) -> Result<Vec<Dataset>> {
    let pattern = base.join("**").join("*.jsonl");
    let pattern = pattern.to_string_lossy();
    let files = glob::glob(&pattern)
        .map_err(|e| NozzleError::InvalidInput(format!("Invalid glob pattern: {e}")))?;

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let path = match file {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                continue;
            }
        };
        let Some(name) = dataset_name(base, &path) else {
            continue;
        };
        groups.entry(name).or_default().push(path);
    }

    Ok(groups
        .into_iter()
        .map(|(name, mut files)| {
            files.sort();
            Dataset { name, files }
        })
        .collect())
}

fn dataset_name(base: &Path, path: &Path) -> Option<String> {
    let parent = path.parent()?;
    if parent == base {
        return Some(path.file_stem()?.to_string_lossy().into_owned());
    }
    let relative = parent.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// What to keep while streaming.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Stop after this many events
    pub max_events: Option<u64>,
    /// Collections passed on; empty passes everything
    pub collections: Vec<String>,
}

impl ReadOptions {
    fn accepts(&self, collection: &str) -> bool {
        self.collections.is_empty() || self.collections.iter().any(|c| c == collection)
    }
}

/// Counters of one streaming pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    pub events: u64,
    pub records: u64,
    pub bad_lines: u64,
    pub missing_files: u64,
}

/// Stream every accepted record of `dataset` into `visit`.
pub fn read_dataset(
    dataset: &Dataset,
    options: &ReadOptions,
    mut visit: impl FnMut(&Observation),
) -> Result<ReadStats> {
    let mut stats = ReadStats::default();

    'files: for path in &dataset.files {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping missing event file");
                stats.missing_files += 1;
                continue;
            }
        };
        debug!(path = %path.display(), "Reading event file");

        let mut current: Option<u64> = None;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| NozzleError::io(format!("reading {}", path.display()), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Observation = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    debug!(path = %path.display(), line = line_no + 1, error = %e, "Bad record");
                    stats.bad_lines += 1;
                    continue;
                }
            };

            if current != Some(record.event) {
                if options.max_events.is_some_and(|max| stats.events >= max) {
                    break 'files;
                }
                current = Some(record.event);
                stats.events += 1;
            }

            if options.accepts(&record.collection) {
                stats.records += 1;
                visit(&record);
            }
        }
    }

    if stats.bad_lines > 0 {
        warn!(dataset = %dataset.name, bad_lines = stats.bad_lines, "Skipped unparsable records");
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(event: u64, collection: &str, z: f64) -> String {
        format!(r#"{{"event":{event},"collection":"{collection}","x":3.0,"y":4.0,"z":{z},"energy":1.5}}"#)
    }

    #[test]
    fn test_discover_groups_by_folder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bib/run1")).unwrap();
        fs::create_dir_all(dir.path().join("signal")).unwrap();
        fs::write(dir.path().join("bib/run1/a.jsonl"), "").unwrap();
        fs::write(dir.path().join("bib/run1/b.jsonl"), "").unwrap();
        fs::write(dir.path().join("signal/s.jsonl"), "").unwrap();
        fs::write(dir.path().join("loose.jsonl"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let datasets = discover(dir.path()).unwrap();
        let names: Vec<_> = datasets.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bib/run1", "loose", "signal"]);
        assert_eq!(datasets[0].files.len(), 2);
    }

    #[test]
    fn test_same_folder_name_under_different_parents() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("bib/run1")).unwrap();
        fs::create_dir_all(dir.path().join("sig/run1")).unwrap();
        fs::write(dir.path().join("bib/run1/a.jsonl"), "").unwrap();
        fs::write(dir.path().join("sig/run1/a.jsonl"), "").unwrap();

        let datasets = discover(dir.path()).unwrap();
        let names: Vec<_> = datasets.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["bib/run1", "sig/run1"]);
        assert!(datasets.iter().all(|d| d.files.len() == 1));
    }

    #[test]
    fn test_read_counts_and_filters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.jsonl");
        let lines = [
            record(0, "MCParticle", 1.0),
            record(0, "SiHits", 2.0),
            "not json".to_string(),
            record(1, "MCParticle", 3.0),
            String::new(),
            record(2, "MCParticle", 4.0),
        ];
        fs::write(&path, lines.join("\n")).unwrap();

        let dataset = Dataset {
            name: "a".to_string(),
            files: vec![path, dir.path().join("gone.jsonl")],
        };
        let options = ReadOptions {
            max_events: None,
            collections: vec!["MCParticle".to_string()],
        };
        let mut zs = Vec::new();
        let stats = read_dataset(&dataset, &options, |o| zs.push(o.z)).unwrap();

        assert_eq!(zs, vec![1.0, 3.0, 4.0]);
        assert_eq!(
            stats,
            ReadStats {
                events: 3,
                records: 3,
                bad_lines: 1,
                missing_files: 1,
            }
        );
    }

    #[test]
    fn test_max_events_spans_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        fs::write(&a, [record(0, "MCParticle", 1.0), record(0, "MCParticle", 2.0)].join("\n")).unwrap();
        fs::write(&b, [record(0, "MCParticle", 3.0), record(1, "MCParticle", 4.0)].join("\n")).unwrap();

        let dataset = Dataset {
            name: "d".to_string(),
            files: vec![a, b],
        };
        let options = ReadOptions {
            max_events: Some(2),
            collections: Vec::new(),
        };
        let mut count = 0;
        let stats = read_dataset(&dataset, &options, |_| count += 1).unwrap();
        assert_eq!(stats.events, 2);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_energy_is_optional() {
        let o: Observation =
            serde_json::from_str(r#"{"event":1,"collection":"c","x":0,"y":0,"z":1}"#).unwrap();
        assert_eq!(o.energy, None);
        assert_eq!(o.position().r(), 1.0);
    }
}
