//! HTCondor job files for the variant folders.

use crate::models::{CondorConfig, NozzleError, Result};
use regex::{NoExpand, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{error, info, warn};

const STEERING_FILE: &str = "steer_sim.py";
const SUBMIT_FILE: &str = "nozzle_sim.submit";
const RUN_SCRIPT: &str = "run_sim.sh";
const CONDOR_SUBMIT: &str = "condor_submit";

/// Job wrapper converting the geometry and running the simulation.
pub fn run_script(container_view: &str) -> String {
    format!(
        "#!/bin/bash\n\
         apptainer exec {container_view}/bin/dd4hep-geant4 --convert MAIA_*.xml -o geometry.root\n\
         apptainer exec {container_view}/bin/ddsim --steeringFile {STEERING_FILE}\n"
    )
}

/// Write the default run script if absent and make it executable.
pub fn ensure_run_script(path: &Path, container_view: &str) -> Result<()> {
    if !path.exists() {
        fs::write(path, run_script(container_view))
            .map_err(|e| NozzleError::io(format!("writing {}", path.display()), e))?;
        info!(path = %path.display(), "Created run script");
    }
    make_executable(path)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .map_err(|e| NozzleError::io(format!("reading {}", path.display()), e))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
        .map_err(|e| NozzleError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Submit description using paths relative to the variant folder.
pub fn submit_description(maia_file: &str, config: &CondorConfig) -> String {
    format!(
        "initialdir = .\n\
         executable = ./{RUN_SCRIPT}\n\
         arguments = .\n\
         transfer_input_files = {maia_file}, {STEERING_FILE}\n\
         output = ./condor.out\n\
         error = ./condor.err\n\
         log = ./condor.log\n\
         request_cpus = {}\n\
         request_memory = {}\n\
         request_disk = {}\n\
         should_transfer_files = YES\n\
         when_to_transfer_output = ON_EXIT\n\
         +HasSingularity = true\n\
         requirements = (HasSingularity == true || HasApptainer == true)\n\
         queue\n",
        config.request_cpus, config.request_memory, config.request_disk
    )
}

/// Point the steering template's geometry at `maia`. Every path ending in
/// `template_name` is replaced.
pub fn retarget_steering(content: &str, template_name: &str, maia: &Path) -> String {
    let pattern = format!(r#"[^\s"']*{}"#, regex::escape(template_name));
    match Regex::new(&pattern) {
        Ok(re) => re
            .replace_all(content, NoExpand(&maia.to_string_lossy()))
            .into_owned(),
        Err(e) => {
            warn!(error = %e, "Invalid steering pattern, leaving template unchanged");
            content.to_string()
        }
    }
}

fn find_maia(folder: &Path) -> Result<Option<PathBuf>> {
    let entries =
        fs::read_dir(folder).map_err(|e| NozzleError::io(format!("listing {}", folder.display()), e))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("MAIA_") && n.ends_with(".xml"))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn variant_folders(variants_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(variants_dir)
        .map_err(|e| NozzleError::io(format!("listing {}", variants_dir.display()), e))?;
    let mut folders: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    folders.sort();
    Ok(folders)
}

/// Write `steer_sim.py`, `nozzle_sim.submit` and `run_sim.sh` into every
/// variant folder holding a `MAIA_*.xml`. Returns the folders prepared.
pub fn write_submit_files(
    variants_dir: &Path,
    steering_template: &Path,
    template_name: &str,
    run_script: &Path,
    config: &CondorConfig,
) -> Result<Vec<PathBuf>> {
    if !steering_template.is_file() {
        return Err(NozzleError::InvalidInput(format!(
            "Steering template not found: {}",
            steering_template.display()
        )));
    }
    let template = fs::read_to_string(steering_template)
        .map_err(|e| NozzleError::io("reading steering template", e))?;
    let have_script = run_script.is_file();
    if !have_script {
        warn!(path = %run_script.display(), "Run script not found");
    }

    let mut prepared = Vec::new();
    for folder in variant_folders(variants_dir)? {
        let Some(maia) = find_maia(&folder)? else {
            warn!(folder = %folder.display(), "No MAIA xml found");
            continue;
        };
        let maia_abs = maia.canonicalize().unwrap_or_else(|_| maia.clone());
        let maia_name = maia
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let steering = folder.join(STEERING_FILE);
        fs::write(&steering, retarget_steering(&template, template_name, &maia_abs))
            .map_err(|e| NozzleError::io(format!("writing {}", steering.display()), e))?;

        let submit = folder.join(SUBMIT_FILE);
        fs::write(&submit, submit_description(&maia_name, config))
            .map_err(|e| NozzleError::io(format!("writing {}", submit.display()), e))?;

        if have_script {
            let dest = folder.join(RUN_SCRIPT);
            fs::copy(run_script, &dest)
                .map_err(|e| NozzleError::io(format!("copying {}", run_script.display()), e))?;
            make_executable(&dest)?;
        }

        info!(path = %submit.display(), "Generated Condor submit file");
        prepared.push(folder);
    }
    Ok(prepared)
}

/// Run `condor_submit` for every prepared variant folder. Returns the
/// number of accepted submissions; failures are logged and counted out.
pub async fn submit_all(variants_dir: &Path) -> Result<usize> {
    submit_all_with(variants_dir, CONDOR_SUBMIT).await
}

/// Like [`submit_all`] with another submit program. Each submission runs
/// inside its variant folder, where the description's relative paths point.
pub async fn submit_all_with(variants_dir: &Path, program: &str) -> Result<usize> {
    let mut submitted = 0;
    for folder in variant_folders(variants_dir)? {
        let submit = folder.join(SUBMIT_FILE);
        if !submit.exists() {
            continue;
        }
        info!(path = %submit.display(), "Submitting job");
        match submit_one(program, &folder, &submit).await {
            Ok(()) => submitted += 1,
            Err(e) => error!(error = %e, "Submission failed"),
        }
    }
    Ok(submitted)
}

async fn submit_one(program: &str, folder: &Path, submit: &Path) -> Result<()> {
    let output = Command::new(program)
        .arg(SUBMIT_FILE)
        .current_dir(folder)
        .output()
        .await
        .map_err(|e| NozzleError::Command {
            command: program.to_string(),
            message: e.to_string(),
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(NozzleError::Command {
            command: format!("{program} {}", submit.display()),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_submit_description() {
        let text = submit_description("MAIA_Nozzle_a.xml", &CondorConfig::default());
        assert!(text.starts_with("initialdir = .\nexecutable = ./run_sim.sh\n"));
        assert!(text.contains("transfer_input_files = MAIA_Nozzle_a.xml, steer_sim.py\n"));
        assert!(text.contains("request_memory = 2GB\n"));
        assert!(text.contains("+HasSingularity = true\nrequirements = "));
        assert!(text.ends_with("queue\n"));
    }

    #[test]
    fn test_retarget_steering() {
        let template = "SIM.compactFile = [\"/data/geometries/MAIA_v0_Blackhole/MAIA_v0_blackhole.xml\"]\n";
        let out = retarget_steering(template, "MAIA_v0_blackhole.xml", Path::new("/v/a/MAIA_a.xml"));
        assert_eq!(out, "SIM.compactFile = [\"/v/a/MAIA_a.xml\"]\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run_sim.sh");
        ensure_run_script(&path, "/view").unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("#!/bin/bash\n"));
        assert!(content.contains("/view/bin/ddsim --steeringFile steer_sim.py"));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        // An existing script is kept
        fs::write(&path, "#!/bin/sh\n").unwrap();
        ensure_run_script(&path, "/view").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/bin/sh\n");
    }

    #[test]
    fn test_write_submit_files() {
        let dir = TempDir::new().unwrap();
        let variants = dir.path().join("variants");
        let with_maia = variants.join("Nozzle_a");
        let without = variants.join("Nozzle_b");
        fs::create_dir_all(&with_maia).unwrap();
        fs::create_dir_all(&without).unwrap();
        fs::write(with_maia.join("MAIA_Nozzle_a.xml"), "<lccdd/>").unwrap();
        fs::write(variants.join("manifest.jsonl"), "").unwrap();

        let template = dir.path().join("steer.py");
        fs::write(&template, "compact = '/base/MAIA_v0_blackhole.xml'\n").unwrap();
        let script = dir.path().join("run_sim.sh");
        ensure_run_script(&script, "/view").unwrap();

        let prepared = write_submit_files(
            &variants,
            &template,
            "MAIA_v0_blackhole.xml",
            &script,
            &CondorConfig::default(),
        )
        .unwrap();
        assert_eq!(prepared, vec![with_maia.clone()]);

        let steering = fs::read_to_string(with_maia.join("steer_sim.py")).unwrap();
        assert!(steering.contains("MAIA_Nozzle_a.xml'"));
        assert!(!steering.contains("MAIA_v0_blackhole"));
        assert!(with_maia.join("nozzle_sim.submit").exists());
        assert!(with_maia.join("run_sim.sh").exists());
        assert!(!without.join("nozzle_sim.submit").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_submit_runs_inside_variant_folder() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let variants = dir.path().join("variants");
        let ready = variants.join("Nozzle_a");
        let bare = variants.join("Nozzle_b");
        fs::create_dir_all(&ready).unwrap();
        fs::create_dir_all(&bare).unwrap();
        fs::write(ready.join(SUBMIT_FILE), "queue\n").unwrap();

        // Records where it ran and which description it was handed
        let program = dir.path().join("fake_submit.sh");
        fs::write(&program, "#!/bin/sh\npwd > submitted_from.txt\ncat \"$1\" >> submitted_from.txt\n").unwrap();
        let mut permissions = fs::metadata(&program).unwrap().permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&program, permissions).unwrap();

        let submitted = submit_all_with(&variants, &program.to_string_lossy()).await.unwrap();
        assert_eq!(submitted, 1);

        let record = fs::read_to_string(ready.join("submitted_from.txt")).unwrap();
        let mut lines = record.lines();
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(cwd.canonicalize().unwrap(), ready.canonicalize().unwrap());
        assert_eq!(lines.next(), Some("queue"));
        assert!(!bare.join("submitted_from.txt").exists());
        assert!(!dir.path().join("submitted_from.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_submit_program_is_counted_out() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("Nozzle_a");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join(SUBMIT_FILE), "queue\n").unwrap();

        let submitted = submit_all_with(dir.path(), "nozzlegen-no-such-submit")
            .await
            .unwrap();
        assert_eq!(submitted, 0);
    }

    #[test]
    fn test_missing_template() {
        let dir = TempDir::new().unwrap();
        let err = write_submit_files(
            dir.path(),
            &dir.path().join("nope.py"),
            "MAIA_v0_blackhole.xml",
            &dir.path().join("run_sim.sh"),
            &CondorConfig::default(),
        );
        assert!(matches!(err, Err(NozzleError::InvalidInput(_))));
    }
}
