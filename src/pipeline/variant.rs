//! Variant generation pipeline.
//!
//! Pipeline flow:
//! (z_start, reduction) → Validation → Carve blackhole → Refit nozzle →
//! Rewrite detector XML → Variant folder → manifest.jsonl

use super::VariantOrganizer;
use crate::checkpoint::CheckpointManager;
use crate::geometry::{
    GeometryTable, Limits, adjust_nozzle, blackhole_base, carve_blackhole, nozzle_base,
    validate_configuration,
};
use crate::models::{
    Config, NozzleError, Result, RunStats, VariantRecord, VariantSpec, VariantStatus,
};
use crate::xml::rewrite_detectors;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Skipped configurations listed in the batch summary.
const SUMMARY_SKIPPED: usize = 5;

/// Result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub stats: RunStats,
    pub records: Vec<VariantRecord>,
}

/// Generates nozzle variants from the reference geometry.
pub struct VariantPipeline {
    input_xml: PathBuf,
    variants_dir: PathBuf,
    tip_z: f64,
    limits: Limits,
    nozzle: GeometryTable,
    blackhole: GeometryTable,
    organizer: VariantOrganizer,
}

impl VariantPipeline {
    pub fn new(config: &Config) -> Result<Self> {
        let variants_dir = config.paths.variants_dir.clone();
        fs::create_dir_all(&variants_dir)
            .map_err(|e| NozzleError::io(format!("creating {}", variants_dir.display()), e))?;

        let organizer = VariantOrganizer::new(
            &config.paths.base_geometry,
            &variants_dir,
            &config.geometry,
        )?;
        let tip_z = config.geometry.tip_z;

        Ok(Self {
            input_xml: config.paths.input_xml.clone(),
            variants_dir,
            tip_z,
            limits: Limits::from(&config.geometry),
            nozzle: nozzle_base().offset_to_tip(tip_z),
            blackhole: blackhole_base().offset_to_tip(tip_z),
            organizer,
        })
    }

    pub fn variants_dir(&self) -> &Path {
        &self.variants_dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.variants_dir.join("manifest.jsonl")
    }

    /// Generate one variant.
    ///
    /// A configuration that fails validation is retried with the suggested
    /// reduction when one exists (`Corrected`) and reported as `Skipped`
    /// otherwise. Errors while writing files are returned as errors.
    pub fn generate(&self, spec: VariantSpec) -> Result<VariantRecord> {
        let mut reference = self.nozzle.clone();
        reference.merge(&self.blackhole);

        let report =
            validate_configuration(spec.z_start, spec.rmax_reduction, &reference, &self.limits);

        let mut messages = Vec::new();
        let (effective, status) = if report.valid {
            (spec.rmax_reduction, VariantStatus::Generated)
        } else {
            let rejection = NozzleError::InvalidConfiguration {
                z_start: spec.z_start,
                reduction: spec.rmax_reduction,
                reasons: report.messages.join("; "),
            };
            error!(
                error = %rejection,
                suggested = format!("{:.4}", report.suggested_reduction),
                "Validation failed"
            );
            messages.push(rejection.to_string());
            messages.push(format!(
                "Suggested maximum reduction: {:.4} cm",
                report.suggested_reduction
            ));

            if report.suggested_reduction > 0.0 {
                info!(
                    reduction = format!("{:.4}", report.suggested_reduction),
                    "Attempting with suggested reduction"
                );
                (report.suggested_reduction, VariantStatus::Corrected)
            } else {
                return Ok(VariantRecord::unproduced(spec, VariantStatus::Skipped, messages));
            }
        };

        let name = spec.file_stem(effective);
        let folder = self.variants_dir.join(&name);
        fs::create_dir_all(&folder)
            .map_err(|e| NozzleError::io(format!("creating {}", folder.display()), e))?;
        let xml_path = folder.join(format!("{name}.xml"));

        let carving = carve_blackhole(
            &self.blackhole,
            &self.nozzle,
            spec.z_start,
            effective,
            &self.limits,
        )?;
        let adjusted = adjust_nozzle(&self.nozzle, &carving.changes, carving.z_start, &self.limits);

        let mut modifications = carving.blackhole;
        modifications.merge(&adjusted);

        let summary = rewrite_detectors(&self.input_xml, &xml_path, &modifications, self.tip_z)?;
        if !summary.missing.is_empty() {
            let missing: Vec<String> = summary.missing.iter().map(ToString::to_string).collect();
            messages.push(format!("Missing detectors in XML: {}", missing.join(", ")));
        }

        let folder = self.organizer.create_variant_folder(&xml_path, Some(&name))?;
        info!(path = %xml_path.display(), status = ?status, "Generated variant");

        Ok(VariantRecord {
            spec,
            effective_reduction: effective,
            status,
            xml_path: Some(xml_path),
            folder: Some(folder),
            messages,
            generated_at: Utc::now(),
        })
    }

    /// Generate one variant. Rejected parameters become a `Skipped` record,
    /// any other error a `Failed` one.
    fn generate_or_fail(&self, spec: VariantSpec) -> VariantRecord {
        match self.generate(spec) {
            Ok(record) => record,
            Err(e) if e.is_rejection() => {
                warn!(z_start = spec.z_start, reduction = spec.rmax_reduction, error = %e, "Variant rejected");
                VariantRecord::unproduced(spec, VariantStatus::Skipped, vec![e.to_string()])
            }
            Err(e) => {
                error!(z_start = spec.z_start, reduction = spec.rmax_reduction, error = %e, "Error generating variant");
                VariantRecord::unproduced(
                    spec,
                    VariantStatus::Failed,
                    vec![format!("Error generating variant: {e}")],
                )
            }
        }
    }

    /// Append a record to the variants' manifest.
    pub fn append_manifest(&self, record: &VariantRecord) -> Result<()> {
        let path = self.manifest_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| NozzleError::io("opening manifest", e))?;
        let json = serde_json::to_string(record)
            .map_err(|e| NozzleError::Internal(format!("Failed to serialize record: {}", e)))?;
        writeln!(file, "{}", json).map_err(|e| NozzleError::io("writing manifest", e))
    }

    /// Start an empty manifest.
    fn reset_manifest(&self) -> Result<()> {
        let path = self.manifest_path();
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Cleared manifest");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NozzleError::io("clearing manifest", e)),
        }
    }

    /// Generate every grid point in order.
    ///
    /// With `resume`, variants finished in an earlier run (per the
    /// checkpoint in the variants directory) are not generated again.
    pub fn run_batch(&self, specs: Vec<VariantSpec>, resume: bool) -> Result<BatchOutcome> {
        let start = Instant::now();
        let total = specs.len();

        let mut checkpoint = CheckpointManager::new(&self.variants_dir)?;
        if resume {
            checkpoint.init_or_load(&specs)?;
        } else {
            checkpoint.reset(&specs)?;
            self.reset_manifest()?;
        }
        let pending = checkpoint.filter_pending(specs);

        info!(
            total,
            pending = pending.len(),
            already_done = total - pending.len(),
            "Running batch generation with validation"
        );

        let pb = super::progress_bar(pending.len() as u64);
        let mut stats = RunStats::default();
        let mut records = Vec::with_capacity(pending.len());

        for spec in pending {
            pb.set_message(format!("z={} r={}", spec.z_start, spec.rmax_reduction));

            let record = self.generate_or_fail(spec);
            match record.status {
                VariantStatus::Generated | VariantStatus::Corrected => {
                    info!(path = ?record.xml_path, "Generated")
                }
                VariantStatus::Skipped | VariantStatus::Failed => {
                    warn!(reason = record.headline(), "Skipped")
                }
            }

            stats.record(record.status);
            self.append_manifest(&record)?;
            checkpoint.mark(&spec, record.status, record.effective_reduction)?;
            records.push(record);
            pb.inc(1);
        }

        stats.runtime_secs = start.elapsed().as_secs_f64();
        stats.finalize();
        pb.finish_with_message(format!(
            "Done! {} generated, {} skipped",
            stats.successful(),
            stats.unsuccessful()
        ));

        log_summary(&stats, &records, &self.variants_dir);
        Ok(BatchOutcome { stats, records })
    }
}

fn log_summary(stats: &RunStats, records: &[VariantRecord], output: &Path) {
    info!(
        attempted = stats.total_configs,
        generated = stats.total_generated,
        corrected = stats.total_corrected,
        skipped = stats.total_skipped,
        failed = stats.total_failed,
        success_rate = format!("{:.1}%", stats.success_rate * 100.0),
        runtime = format!("{:.1}s", stats.runtime_secs),
        output = %output.display(),
        "Batch generation summary"
    );

    let skipped: Vec<&VariantRecord> = records.iter().filter(|r| !r.status.is_success()).collect();
    for record in skipped.iter().take(SUMMARY_SKIPPED) {
        let reason = record.headline().split(':').next().unwrap_or_default();
        info!(
            z = record.spec.z_start,
            r = record.spec.rmax_reduction,
            reason,
            "Skipped configuration"
        );
    }
    if skipped.len() > SUMMARY_SKIPPED {
        info!("... and {} more", skipped.len() - SUMMARY_SKIPPED);
    }
}
