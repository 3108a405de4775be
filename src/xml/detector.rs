//! Reading and rewriting the zplanes of the shield detectors.

use super::units::{Constants, format_units, parse_units};
use super::{element, load, push, save, visit, visit_mut};
use crate::geometry::{Component, GeometryTable, ZPlane};
use crate::models::{NozzleError, Result};
use std::path::Path;
use tracing::{debug, info, warn};
use xmltree::{Element, XMLNode};

/// What a rewrite did to each target detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteSummary {
    /// Targets whose zplanes were replaced, with the number written
    pub replaced: Vec<(Component, usize)>,
    /// Targets present but without modifications
    pub untouched: Vec<Component>,
    /// Targets absent from the document
    pub missing: Vec<Component>,
}

fn target_of(detector: &Element) -> Option<Component> {
    detector.attributes.get("name")?.parse().ok()
}

fn zplane_element(plane: &ZPlane) -> Element {
    element(
        "zplane",
        &[
            ("z", format_units(plane.z, "cm")),
            ("rmin", format_units(plane.rmin, "cm")),
            ("rmax", format_units(plane.rmax, "cm")),
        ],
    )
}

fn parse_zplane(zplane: &Element, constants: &Constants) -> Result<ZPlane> {
    let attr = |name: &str| -> Result<f64> {
        let text = zplane.attributes.get(name).ok_or_else(|| {
            NozzleError::ParseError(format!("zplane without '{name}' attribute"))
        })?;
        Ok(parse_units(text, constants)?.value)
    };
    Ok(ZPlane::new(attr("z")?, attr("rmin")?, attr("rmax")?))
}

/// Zplanes of the target detectors of a document, original coordinates.
/// Unparsable zplanes are skipped with a warning.
pub fn read_geometry(path: &Path) -> Result<GeometryTable> {
    let root = load(path)?;
    let constants = Constants::from_document(&root);
    let mut table = GeometryTable::new();

    visit(&root, "detector", &mut |detector: &Element| {
        let Some(component) = target_of(detector) else {
            return;
        };
        for zplane in detector
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .filter(|e| e.name == "zplane")
        {
            match parse_zplane(zplane, &constants) {
                Ok(plane) => table.insert(component, plane),
                Err(e) => warn!(component = %component, error = %e, "Skipping zplane"),
            }
        }
    });

    debug!(path = %path.display(), planes = table.len(), "Read geometry");
    Ok(table)
}

/// Replace the zplanes of every target detector that has modifications.
///
/// `modifications` is tip-relative and is converted back with `tip_z`.
/// Planes are written sorted by `|z|`.
pub fn rewrite_detectors(
    input: &Path,
    output: &Path,
    modifications: &GeometryTable,
    tip_z: f64,
) -> Result<RewriteSummary> {
    let mut root = load(input)?;
    let original = modifications.offset_from_tip(tip_z);
    let mut summary = RewriteSummary::default();

    let mut found = Vec::new();
    visit(&root, "detector", &mut |detector: &Element| {
        if let Some(component) = target_of(detector) {
            found.push(component);
        }
    });
    summary.missing = Component::TARGETS
        .into_iter()
        .filter(|c| !found.contains(c))
        .collect();
    if !summary.missing.is_empty() {
        let names: Vec<String> = summary.missing.iter().map(ToString::to_string).collect();
        warn!(missing = ?names, "Missing detectors in XML");
    }

    visit_mut(&mut root, "detector", &mut |detector: &mut Element| {
        let Some(component) = target_of(detector) else {
            return;
        };

        // Insertion order first, then a stable sort on depth
        let mut planes: Vec<ZPlane> = original
            .iter()
            .filter(|(c, _)| *c == component)
            .map(|(_, p)| p)
            .collect();
        if planes.is_empty() {
            debug!(component = %component, "No modifications, keeping zplanes");
            summary.untouched.push(component);
            return;
        }
        planes.sort_by(|a, b| a.depth().total_cmp(&b.depth()));

        detector
            .children
            .retain(|n| !matches!(n, XMLNode::Element(e) if e.name == "zplane"));
        for plane in &planes {
            push(detector, zplane_element(plane));
        }
        info!(component = %component, planes = planes.len(), "Replaced zplanes");
        summary.replaced.push((component, planes.len()));
    });

    save(&root, output)?;
    info!(path = %output.display(), "Saved modified XML");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Shield, Side, blackhole_base, nozzle_base};
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<lccdd>
    <define>
        <constant name="Nozzle_zmax" value="595*cm"/>
    </define>
    <detectors>
        <detector name="NozzleW_right" type="DD4hep_PolyconeSupport" vis="NozzleWVis">
            <material name="Tungsten"/>
            <zplane z="Nozzle_zmin" rmin="1.0*cm" rmax="1.0*cm"/>
            <zplane z="Nozzle_zmax" rmin="42*cm" rmax="43*cm"/>
        </detector>
        <detector name="NozzleW_left" type="DD4hep_PolyconeSupport" vis="NozzleWVis">
            <material name="Tungsten"/>
            <zplane z="-Nozzle_zmin" rmin="1.0*cm" rmax="1.0*cm"/>
            <zplane z="-Nozzle_zmax" rmin="42*cm" rmax="bogus"/>
        </detector>
        <detector name="NozzleBlackhole_right" type="DD4hep_PolyconeSupport">
            <zplane z="10.5176*cm" rmin="0.79922*cm" rmax="0.79922*cm"/>
        </detector>
        <detector name="BeamPipe" type="Other"/>
    </detectors>
</lccdd>
"#;

    fn write_sample(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("Nozzle.xml");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    #[test]
    fn test_read_geometry_resolves_constants() {
        let dir = TempDir::new().unwrap();
        let table = read_geometry(&write_sample(&dir)).unwrap();

        let right = table.planes(Component::new(Shield::Nozzle, Side::Right));
        assert_eq!(right.len(), 2);
        assert_eq!(right[0], ZPlane::new(6.0, 1.0, 1.0));
        assert_eq!(right[1], ZPlane::new(595.0, 42.0, 43.0));

        // The bogus plane is skipped
        assert_eq!(table.planes(Component::new(Shield::Nozzle, Side::Left)).len(), 1);
    }

    #[test]
    fn test_rewrite_replaces_target_zplanes() {
        let dir = TempDir::new().unwrap();
        let input = write_sample(&dir);
        let output = dir.path().join("out.xml");

        let mut mods = nozzle_base();
        mods.merge(&blackhole_base());
        let mods = mods.offset_to_tip(6.0);
        let summary = rewrite_detectors(&input, &output, &mods, 6.0).unwrap();

        assert_eq!(summary.missing, vec![Component::new(Shield::Blackhole, Side::Left)]);
        assert_eq!(summary.replaced.len(), 3);
        assert!(summary.untouched.is_empty());

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.starts_with("<?xml"));
        assert!(written.contains(r#"z="-10.5176*cm""#));
        assert!(written.contains(r#"z="595.0*cm""#));
        assert!(written.contains(r#"<material name="Tungsten""#));
        assert!(!written.contains("Nozzle_zmax\" rmin"));

        let table = read_geometry(&output).unwrap();
        let left = table.planes(Component::new(Shield::Nozzle, Side::Left));
        assert_eq!(left.len(), 7);
        assert_eq!(left[0].z, -6.0);
        assert_eq!(left[6], ZPlane::new(-595.0, 42.0, 43.0));
    }

    #[test]
    fn test_rewrite_keeps_detectors_without_modifications() {
        let dir = TempDir::new().unwrap();
        let input = write_sample(&dir);
        let output = dir.path().join("out.xml");

        let mods = nozzle_base().offset_to_tip(6.0);
        let summary = rewrite_detectors(&input, &output, &mods, 6.0).unwrap();
        assert_eq!(
            summary.untouched,
            vec![Component::new(Shield::Blackhole, Side::Right)]
        );

        let table = read_geometry(&output).unwrap();
        let bh = table.planes(Component::new(Shield::Blackhole, Side::Right));
        assert_eq!(bh, vec![ZPlane::new(10.5176, 0.79922, 0.79922)]);
    }

    #[test]
    fn test_invalid_xml_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xml");
        fs::write(&path, "<lccdd><detectors>").unwrap();
        assert!(matches!(read_geometry(&path), Err(NozzleError::Xml { .. })));
        assert!(matches!(
            read_geometry(&dir.path().join("absent.xml")),
            Err(NozzleError::Io { .. })
        ));
    }
}
