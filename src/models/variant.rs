//! Variant and run-summary types.
//!
//! A variant is one `(z_start, reduction)` point of the parameter grid and
//! the geometry files generated for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Requested variant parameters, tip-relative cm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Depth at which the blackhole starts
    pub z_start: f64,

    /// Absolute reduction of the blackhole outer radius
    pub rmax_reduction: f64,
}

impl VariantSpec {
    pub fn new(z_start: f64, rmax_reduction: f64) -> Self {
        Self {
            z_start,
            rmax_reduction,
        }
    }

    /// Stable identifier used by checkpoints.
    pub fn id(&self) -> String {
        format!("z{}_r{}", self.z_start, self.rmax_reduction)
    }

    /// Folder and file stem for a variant generated with `reduction`.
    pub fn file_stem(&self, reduction: f64) -> String {
        format!(
            "Nozzle_zstart_{:.4}_reduction_{:.4}",
            self.z_start, reduction
        )
    }

    /// Cartesian product of start depths and reductions, start depth major.
    pub fn grid(z_starts: &[f64], reductions: &[f64]) -> Vec<Self> {
        z_starts
            .iter()
            .flat_map(|&z| reductions.iter().map(move |&r| Self::new(z, r)))
            .collect()
    }
}

/// How a variant ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    /// Generated with the requested reduction
    Generated,
    /// Generated with the suggested reduction after failed validation
    Corrected,
    /// Rejected by validation with nothing to fall back to
    Skipped,
    /// Generation failed
    Failed,
}

impl VariantStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Generated | Self::Corrected)
    }
}

/// Manifest entry for one variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantRecord {
    /// Requested parameters
    pub spec: VariantSpec,

    /// Reduction actually written to the geometry
    pub effective_reduction: f64,

    pub status: VariantStatus,

    /// Geometry file of the variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_path: Option<PathBuf>,

    /// Variant folder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,

    /// Validation or failure messages
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,

    pub generated_at: DateTime<Utc>,
}

impl VariantRecord {
    /// Record for a variant that produced no files.
    pub fn unproduced(spec: VariantSpec, status: VariantStatus, messages: Vec<String>) -> Self {
        Self {
            spec,
            effective_reduction: spec.rmax_reduction,
            status,
            xml_path: None,
            folder: None,
            messages,
            generated_at: Utc::now(),
        }
    }

    /// First line of the first message, used in summaries.
    pub fn headline(&self) -> &str {
        self.messages
            .first()
            .and_then(|m| m.lines().next())
            .unwrap_or("")
    }
}

/// Statistics for a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Configurations attempted
    pub total_configs: usize,

    /// Generated with the requested reduction
    pub total_generated: usize,

    /// Generated with a corrected reduction
    pub total_corrected: usize,

    /// Rejected by validation
    pub total_skipped: usize,

    /// Failed during generation
    pub total_failed: usize,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Successful share of attempted configurations (0.0 - 1.0)
    pub success_rate: f64,
}

impl RunStats {
    /// Count one outcome.
    pub fn record(&mut self, status: VariantStatus) {
        self.total_configs += 1;
        match status {
            VariantStatus::Generated => self.total_generated += 1,
            VariantStatus::Corrected => self.total_corrected += 1,
            VariantStatus::Skipped => self.total_skipped += 1,
            VariantStatus::Failed => self.total_failed += 1,
        }
    }

    pub fn successful(&self) -> usize {
        self.total_generated + self.total_corrected
    }

    pub fn unsuccessful(&self) -> usize {
        self.total_skipped + self.total_failed
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.total_configs > 0 {
            self.success_rate = self.successful() as f64 / self.total_configs as f64;
        }
    }
}
