//! Checkpoint state for resumable batch generation.
//!
//! - Every grid point has an entry keyed by its variant id
//! - State is persisted atomically (backup, temp file, rename)
//! - A missing checkpoint file starts a fresh run

use crate::models::{NozzleError, Result, RunStats, VariantSpec, VariantStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Status of a variant in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    /// Not yet processed
    Pending,
    Generated,
    Corrected,
    Skipped,
    Failed,
}

impl From<VariantStatus> for CheckpointStatus {
    fn from(status: VariantStatus) -> Self {
        match status {
            VariantStatus::Generated => Self::Generated,
            VariantStatus::Corrected => Self::Corrected,
            VariantStatus::Skipped => Self::Skipped,
            VariantStatus::Failed => Self::Failed,
        }
    }
}

/// Checkpoint entry for a single variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantCheckpoint {
    pub spec: VariantSpec,
    pub status: CheckpointStatus,
    /// Reduction written, once generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_reduction: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Counters over all entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointStats {
    pub pending: usize,
    pub generated: usize,
    pub corrected: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CheckpointStats {
    fn slot(&mut self, status: CheckpointStatus) -> &mut usize {
        match status {
            CheckpointStatus::Pending => &mut self.pending,
            CheckpointStatus::Generated => &mut self.generated,
            CheckpointStatus::Corrected => &mut self.corrected,
            CheckpointStatus::Skipped => &mut self.skipped,
            CheckpointStatus::Failed => &mut self.failed,
        }
    }
}

/// Checkpoint state for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointState {
    pub run_id: Uuid,
    pub total_variants: usize,
    pub variants: HashMap<String, VariantCheckpoint>,
    pub stats: CheckpointStats,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn new(specs: &[VariantSpec]) -> Self {
        let now = Utc::now();
        let mut state = Self {
            run_id: Uuid::new_v4(),
            total_variants: 0,
            variants: HashMap::with_capacity(specs.len()),
            stats: CheckpointStats::default(),
            started_at: now,
            updated_at: now,
        };

        for spec in specs {
            let entry = VariantCheckpoint {
                spec: *spec,
                status: CheckpointStatus::Pending,
                effective_reduction: None,
                updated_at: now,
            };
            // Duplicate grid points collapse onto one entry
            if state.variants.insert(spec.id(), entry).is_none() {
                state.stats.pending += 1;
            }
        }
        state.total_variants = state.variants.len();
        state
    }

    /// Add grid points the checkpoint does not know yet as pending.
    /// Returns how many were added.
    pub fn extend(&mut self, specs: &[VariantSpec]) -> usize {
        let now = Utc::now();
        let mut added = 0;
        for spec in specs {
            if self.variants.contains_key(&spec.id()) {
                continue;
            }
            self.variants.insert(
                spec.id(),
                VariantCheckpoint {
                    spec: *spec,
                    status: CheckpointStatus::Pending,
                    effective_reduction: None,
                    updated_at: now,
                },
            );
            self.stats.pending += 1;
            added += 1;
        }
        if added > 0 {
            self.total_variants = self.variants.len();
            self.updated_at = now;
        }
        added
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.variants
            .iter()
            .filter(|(_, cp)| cp.status == CheckpointStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Record the outcome of a variant. Unknown ids are ignored.
    pub fn mark(&mut self, spec: &VariantSpec, status: VariantStatus, effective_reduction: f64) {
        if let Some(cp) = self.variants.get_mut(&spec.id()) {
            *self.stats.slot(cp.status) -= 1;
            cp.status = status.into();
            *self.stats.slot(cp.status) += 1;
            cp.effective_reduction = status.is_success().then_some(effective_reduction);
            cp.updated_at = Utc::now();
        }
        self.updated_at = Utc::now();
    }

    pub fn is_complete(&self) -> bool {
        self.stats.pending == 0
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_variants == 0 {
            return 100.0;
        }
        let processed = self.total_variants - self.stats.pending;
        (processed as f64 / self.total_variants as f64) * 100.0
    }

    /// Statistics over every processed variant, including earlier sessions.
    pub fn to_run_stats(&self, runtime_secs: f64) -> RunStats {
        let mut stats = RunStats {
            total_configs: self.total_variants - self.stats.pending,
            total_generated: self.stats.generated,
            total_corrected: self.stats.corrected,
            total_skipped: self.stats.skipped,
            total_failed: self.stats.failed,
            runtime_secs,
            ..Default::default()
        };
        stats.finalize();
        stats
    }
}

/// Persists checkpoint state next to the variants.
pub struct CheckpointManager {
    dir: PathBuf,
    checkpoint_path: PathBuf,
    backup_path: PathBuf,
    state: Option<CheckpointState>,
}

impl CheckpointManager {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| NozzleError::io("creating checkpoint dir", e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            checkpoint_path: dir.join("checkpoint.json"),
            backup_path: dir.join("checkpoint.backup.json"),
            state: None,
        })
    }

    pub fn exists(&self) -> bool {
        self.checkpoint_path.exists()
    }

    /// Load an existing checkpoint or start a new one for `specs`.
    pub fn init_or_load(&mut self, specs: &[VariantSpec]) -> Result<&CheckpointState> {
        if self.exists() {
            self.load()?;
            let added = match &mut self.state {
                Some(state) => state.extend(specs),
                None => 0,
            };
            if added > 0 {
                self.save()?;
            }
            if let Some(state) = &self.state {
                info!(
                    run_id = %state.run_id,
                    pending = state.stats.pending,
                    generated = state.stats.generated,
                    added,
                    "Resuming from checkpoint"
                );
            }
        } else {
            self.state = Some(CheckpointState::new(specs));
            self.save()?;
            info!(total = specs.len(), "Created new checkpoint");
        }
        self.state
            .as_ref()
            .ok_or_else(|| NozzleError::Internal("checkpoint state missing".to_string()))
    }

    /// Discard any saved progress and start over with `specs`.
    pub fn reset(&mut self, specs: &[VariantSpec]) -> Result<()> {
        self.state = Some(CheckpointState::new(specs));
        self.save()?;
        info!(total = specs.len(), "Started fresh checkpoint");
        Ok(())
    }

    pub fn load(&mut self) -> Result<&CheckpointState> {
        let file = File::open(&self.checkpoint_path)
            .map_err(|e| NozzleError::io("opening checkpoint", e))?;
        let reader = BufReader::new(file);
        let state: CheckpointState = serde_json::from_reader(reader)
            .map_err(|e| NozzleError::ParseError(format!("Invalid checkpoint: {}", e)))?;

        Ok(&*self.state.insert(state))
    }

    /// Save checkpoint to disk (atomic write).
    pub fn save(&self) -> Result<()> {
        let state = self.state.as_ref().ok_or_else(|| {
            NozzleError::Internal("No checkpoint state to save".to_string())
        })?;

        if self.checkpoint_path.exists() {
            fs::copy(&self.checkpoint_path, &self.backup_path)
                .map_err(|e| NozzleError::io("backing up checkpoint", e))?;
        }

        let temp_path = self.dir.join("checkpoint.tmp.json");
        let file = File::create(&temp_path)
            .map_err(|e| NozzleError::io("creating temp checkpoint", e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, state)
            .map_err(|e| NozzleError::Internal(format!("Serializing checkpoint: {}", e)))?;

        fs::rename(&temp_path, &self.checkpoint_path)
            .map_err(|e| NozzleError::io("renaming checkpoint", e))?;

        debug!("Checkpoint saved");
        Ok(())
    }

    pub fn state(&self) -> Option<&CheckpointState> {
        self.state.as_ref()
    }

    /// Mark and save.
    pub fn mark(
        &mut self,
        spec: &VariantSpec,
        status: VariantStatus,
        effective_reduction: f64,
    ) -> Result<()> {
        if let Some(state) = &mut self.state {
            state.mark(spec, status, effective_reduction);
        }
        self.save()
    }

    /// Only the variants still pending in the checkpoint.
    pub fn filter_pending(&self, specs: Vec<VariantSpec>) -> Vec<VariantSpec> {
        let state = match &self.state {
            Some(s) => s,
            None => return specs,
        };

        let pending: HashSet<_> = state.pending_ids().into_iter().collect();
        specs
            .into_iter()
            .filter(|s| pending.contains(&s.id()))
            .collect()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
