//! One self-contained simulation folder per variant.

use crate::models::{GeometryConfig, NozzleError, Result};
use crate::xml::{basic_maia, retarget_includes};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Copies the base geometry around each generated nozzle.
#[derive(Debug, Clone)]
pub struct VariantOrganizer {
    base_geometry: PathBuf,
    output_base: PathBuf,
    exclude_files: Vec<String>,
    maia_template: String,
}

impl VariantOrganizer {
    pub fn new(base_geometry: &Path, output_base: &Path, geometry: &GeometryConfig) -> Result<Self> {
        if !base_geometry.exists() {
            return Err(NozzleError::InvalidInput(format!(
                "Base geometry path does not exist: {}",
                base_geometry.display()
            )));
        }
        Ok(Self {
            base_geometry: base_geometry.to_path_buf(),
            output_base: output_base.to_path_buf(),
            exclude_files: geometry.exclude_files.clone(),
            maia_template: geometry.maia_template.clone(),
        })
    }

    pub fn output_base(&self) -> &Path {
        &self.output_base
    }

    /// Create `<output>/<name>` holding the base geometry, the nozzle file
    /// and a MAIA top-level file that includes it. `name` defaults to the
    /// nozzle file stem.
    pub fn create_variant_folder(&self, nozzle_xml: &Path, name: Option<&str>) -> Result<PathBuf> {
        if !nozzle_xml.is_file() {
            return Err(NozzleError::InvalidInput(format!(
                "Nozzle XML file not found: {}",
                nozzle_xml.display()
            )));
        }
        let (Some(file_name), Some(stem)) = (
            nozzle_xml.file_name().and_then(|n| n.to_str()),
            nozzle_xml.file_stem().and_then(|n| n.to_str()),
        ) else {
            return Err(NozzleError::InvalidInput(format!(
                "Nozzle XML path has no usable file name: {}",
                nozzle_xml.display()
            )));
        };

        let folder = self.output_base.join(name.unwrap_or(stem));
        fs::create_dir_all(&folder)
            .map_err(|e| NozzleError::io(format!("creating {}", folder.display()), e))?;
        info!(folder = %folder.display(), "Created variant folder");

        self.copy_base_files(&folder)?;

        let target = folder.join(file_name);
        if same_file(nozzle_xml, &target) {
            debug!(path = %target.display(), "Nozzle file already in place");
        } else {
            fs::copy(nozzle_xml, &target)
                .map_err(|e| NozzleError::io(format!("copying {}", nozzle_xml.display()), e))?;
        }

        let maia = self.write_maia(&folder, file_name, stem)?;
        info!(path = %maia.display(), "Wrote MAIA file");
        Ok(folder)
    }

    fn copy_base_files(&self, destination: &Path) -> Result<()> {
        let entries = fs::read_dir(&self.base_geometry).map_err(|e| {
            NozzleError::io(format!("listing {}", self.base_geometry.display()), e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| NozzleError::io("listing base geometry", e))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() || self.exclude_files.contains(&name) {
                continue;
            }
            // The variant brings its own nozzle
            if name.starts_with("Nozzle_") && name.ends_with(".xml") {
                continue;
            }

            fs::copy(&path, destination.join(&name))
                .map_err(|e| NozzleError::io(format!("copying {name}"), e))?;
            debug!(file = %name, "Copied");
        }
        Ok(())
    }

    fn write_maia(&self, folder: &Path, nozzle_file: &str, stem: &str) -> Result<PathBuf> {
        let template = self.base_geometry.join(&self.maia_template);
        let content = if template.is_file() {
            retarget_includes(&template, nozzle_file)?
        } else {
            warn!(template = %template.display(), "MAIA template not found, creating basic MAIA file");
            basic_maia(nozzle_file)?
        };

        let path = folder.join(format!("MAIA_{stem}.xml"));
        fs::write(&path, content)
            .map_err(|e| NozzleError::io(format!("writing {}", path.display()), e))?;
        Ok(path)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base(dir: &TempDir) -> PathBuf {
        let base = dir.path().join("MAIA_v0_Blackhole");
        fs::create_dir_all(base.join("subdir")).unwrap();
        fs::write(base.join("Materials.xml"), "<materials/>").unwrap();
        fs::write(base.join("Nozzle_10deg_skindepth_1.xml"), "<old/>").unwrap();
        fs::write(base.join("Nozzle_other.xml"), "<old/>").unwrap();
        fs::write(
            base.join("MAIA_v0_blackhole.xml"),
            r#"<lccdd><include ref="Nozzle_10deg_skindepth_1.xml"/></lccdd>"#,
        )
        .unwrap();
        base
    }

    #[test]
    fn test_variant_folder_layout() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        let out = dir.path().join("variants");
        let nozzle = dir.path().join("Nozzle_zstart_0.0010_reduction_0.0500.xml");
        fs::write(&nozzle, "<lccdd/>").unwrap();

        let organizer = VariantOrganizer::new(&base, &out, &GeometryConfig::default()).unwrap();
        let folder = organizer.create_variant_folder(&nozzle, None).unwrap();

        assert_eq!(folder, out.join("Nozzle_zstart_0.0010_reduction_0.0500"));
        assert!(folder.join("Materials.xml").exists());
        assert!(folder.join("Nozzle_zstart_0.0010_reduction_0.0500.xml").exists());
        assert!(!folder.join("Nozzle_other.xml").exists());
        assert!(!folder.join("Nozzle_10deg_skindepth_1.xml").exists());
        assert!(!folder.join("MAIA_v0_blackhole.xml").exists());
        assert!(!folder.join("subdir").exists());

        let maia = fs::read_to_string(
            folder.join("MAIA_Nozzle_zstart_0.0010_reduction_0.0500.xml"),
        )
        .unwrap();
        assert!(maia.contains(r#"ref="Nozzle_zstart_0.0010_reduction_0.0500.xml""#));
    }

    #[test]
    fn test_nozzle_already_in_folder() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        fs::remove_file(base.join("MAIA_v0_blackhole.xml")).unwrap();
        let out = dir.path().join("variants");
        let folder = out.join("Nozzle_a");
        fs::create_dir_all(&folder).unwrap();
        let nozzle = folder.join("Nozzle_a.xml");
        fs::write(&nozzle, "<lccdd/>").unwrap();

        let organizer = VariantOrganizer::new(&base, &out, &GeometryConfig::default()).unwrap();
        organizer.create_variant_folder(&nozzle, None).unwrap();

        assert_eq!(fs::read_to_string(&nozzle).unwrap(), "<lccdd/>");
        let maia = fs::read_to_string(folder.join("MAIA_Nozzle_a.xml")).unwrap();
        assert!(maia.contains("<type>CFD</type>"));
    }

    #[test]
    fn test_missing_paths() {
        let dir = TempDir::new().unwrap();
        assert!(
            VariantOrganizer::new(&dir.path().join("nope"), dir.path(), &GeometryConfig::default())
                .is_err()
        );

        let organizer =
            VariantOrganizer::new(&base(&dir), dir.path(), &GeometryConfig::default()).unwrap();
        assert!(
            organizer
                .create_variant_folder(&dir.path().join("missing.xml"), None)
                .is_err()
        );
    }
}
