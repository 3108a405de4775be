//! Writes a killzone sweep, one simulation folder per step.

use crate::geometry::{SweepPlan, SweepStep};
use crate::models::{NozzleError, Result, SweepConfig};
use crate::xml::{render_killzone, retarget_include_lines};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Writes every step of a [`SweepPlan`].
pub struct SweepWriter {
    plan: SweepPlan,
    output_dir: PathBuf,
    static_dir: Option<PathBuf>,
    skip_token: String,
    top_level: Option<PathBuf>,
}

impl SweepWriter {
    pub fn new(config: &SweepConfig) -> Result<Self> {
        Ok(Self {
            plan: SweepPlan::from_config(config)?,
            output_dir: config.output_dir.clone(),
            static_dir: config.static_dir.clone(),
            skip_token: config.skip_token.clone(),
            top_level: config.top_level.clone(),
        })
    }

    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Write all steps. Returns the step folders in order.
    pub fn run(&self) -> Result<Vec<PathBuf>> {
        let steps = self.plan.steps();
        info!(
            steps = steps.len(),
            z_step = self.plan.z_step(),
            r_step = self.plan.r_step(),
            output = %self.output_dir.display(),
            "Writing killzone sweep"
        );

        if let Some(dir) = &self.static_dir {
            if !dir.is_dir() {
                warn!(dir = %dir.display(), "Static geometry folder not found, not copying");
            }
        }

        let pb = super::progress_bar(steps.len() as u64);
        let mut folders = Vec::with_capacity(steps.len());
        for step in &steps {
            folders.push(self.write_step(step)?);
            pb.inc(1);
        }
        pb.finish_with_message(format!("Done! {} steps", steps.len()));
        Ok(folders)
    }

    fn write_step(&self, step: &SweepStep) -> Result<PathBuf> {
        let folder = self.output_dir.join(step.folder_name());
        fs::create_dir_all(&folder)
            .map_err(|e| NozzleError::io(format!("creating {}", folder.display()), e))?;

        let file_name = step.file_name();
        let path = folder.join(&file_name);
        fs::write(&path, render_killzone(step)?)
            .map_err(|e| NozzleError::io(format!("writing {}", path.display()), e))?;

        if let Some(dir) = self.static_dir.as_deref().filter(|d| d.is_dir()) {
            self.copy_static(dir, &folder)?;
        }
        if let Some(top) = &self.top_level {
            write_top_level(top, &folder, &file_name)?;
        }

        debug!(step = step.index, path = %path.display(), "Wrote sweep step");
        Ok(folder)
    }

    fn copy_static(&self, dir: &Path, folder: &Path) -> Result<()> {
        let entries =
            fs::read_dir(dir).map_err(|e| NozzleError::io(format!("listing {}", dir.display()), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| NozzleError::io("listing static geometry", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(&self.skip_token) || entry.path().is_dir() {
                continue;
            }
            fs::copy(entry.path(), folder.join(&name))
                .map_err(|e| NozzleError::io(format!("copying {name}"), e))?;
        }
        Ok(())
    }
}

/// Copy the top-level geometry into `folder` with its nozzle include
/// pointing at `nozzle_file`.
fn write_top_level(top: &Path, folder: &Path, nozzle_file: &str) -> Result<()> {
    let content = fs::read_to_string(top)
        .map_err(|e| NozzleError::io(format!("reading {}", top.display()), e))?;
    let (content, count) = retarget_include_lines(&content, nozzle_file);
    if count == 0 {
        warn!(path = %top.display(), "No nozzle include found in top-level geometry");
    }

    let name = top.file_name().ok_or_else(|| {
        NozzleError::InvalidInput(format!("top-level path has no file name: {}", top.display()))
    })?;
    let dest = folder.join(name);
    fs::write(&dest, content).map_err(|e| NozzleError::io(format!("writing {}", dest.display()), e))
}
