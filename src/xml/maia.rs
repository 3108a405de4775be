//! Top-level geometry files that include the nozzle description.

use super::{element, load, push, render, visit_mut};
use crate::models::{NozzleError, Result};
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{error, info, warn};
use xmltree::{Element, XMLNode};

static INCLUDE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<include\s+ref\s*=\s*")([^"]*)(")"#).expect("valid include regex")
});

fn is_nozzle_ref(reference: &str) -> bool {
    reference.contains("Nozzle") && reference.ends_with(".xml")
}

/// Point every nozzle `<include ref=...>` of a template at `nozzle_file`.
///
/// A template that cannot be parsed is returned verbatim.
pub fn retarget_includes(template: &Path, nozzle_file: &str) -> Result<String> {
    let mut root = match load(template) {
        Ok(root) => root,
        Err(NozzleError::Xml { message, .. }) => {
            error!(template = %template.display(), error = %message, "Error parsing XML template");
            return fs::read_to_string(template)
                .map_err(|e| NozzleError::io(format!("reading {}", template.display()), e));
        }
        Err(e) => return Err(e),
    };

    let mut updated = 0;
    visit_mut(&mut root, "include", &mut |include: &mut Element| {
        let Some(reference) = include.attributes.get("ref").cloned() else {
            return;
        };
        if is_nozzle_ref(&reference) {
            include
                .attributes
                .insert("ref".to_string(), nozzle_file.to_string());
            info!(from = %reference, to = %nozzle_file, "Updated include ref");
            updated += 1;
        }
    });

    if updated == 0 {
        warn!(template = %template.display(), "No nozzle include ref found to update");
    }
    render(&root, "\t")
}

/// Minimal MAIA document used when no template is available.
pub fn basic_maia(nozzle_file: &str) -> Result<String> {
    let mut root = Element::new("MAIA");

    let mut geometry = Element::new("geometry");
    push(&mut geometry, element("nozzle", &[("file", nozzle_file.to_string())]));
    push(&mut root, geometry);

    let mut kind = Element::new("type");
    kind.children.push(XMLNode::Text("CFD".to_string()));
    let mut simulation = Element::new("simulation");
    push(&mut simulation, kind);
    push(&mut root, simulation);

    render(&root, "  ")
}

/// Textual variant of [`retarget_includes`] that leaves the rest of the
/// file byte for byte intact. Returns the new text and the number of
/// includes changed.
pub fn retarget_include_lines(content: &str, nozzle_file: &str) -> (String, usize) {
    let mut count = 0;
    let replaced = INCLUDE_REF.replace_all(content, |caps: &Captures| {
        if is_nozzle_ref(&caps[2]) {
            count += 1;
            format!("{}{}{}", &caps[1], nozzle_file, &caps[3])
        } else {
            caps[0].to_string()
        }
    });
    (replaced.into_owned(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<lccdd>
    <includes>
        <include ref="BeamPipe.xml"/>
        <include ref="Nozzle_10deg_skindepth_1.xml"/>
        <include ref="Nozzle_notes.txt"/>
    </includes>
</lccdd>
"#;

    #[test]
    fn test_retarget_nozzle_include() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MAIA_v0_blackhole.xml");
        fs::write(&path, TEMPLATE).unwrap();

        let out = retarget_includes(&path, "Nozzle_zstart_0.0010_reduction_0.0500.xml").unwrap();
        assert!(out.starts_with("<?xml"));
        assert!(out.contains(r#"ref="Nozzle_zstart_0.0010_reduction_0.0500.xml""#));
        assert!(out.contains(r#"ref="BeamPipe.xml""#));
        assert!(out.contains(r#"ref="Nozzle_notes.txt""#));
        assert!(!out.contains("skindepth"));
    }

    #[test]
    fn test_unparsable_template_is_returned_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.xml");
        fs::write(&path, "<lccdd><include ref=\"Nozzle_a.xml\">").unwrap();
        let out = retarget_includes(&path, "Nozzle_b.xml").unwrap();
        assert_eq!(out, "<lccdd><include ref=\"Nozzle_a.xml\">");
    }

    #[test]
    fn test_basic_maia() {
        let out = basic_maia("Nozzle_x.xml").unwrap();
        assert!(out.contains("<MAIA>"));
        assert!(out.contains(r#"<nozzle file="Nozzle_x.xml""#));
        assert!(out.contains("<type>CFD</type>"));
    }

    #[test]
    fn test_textual_retarget_keeps_layout() {
        let (out, count) = retarget_include_lines(TEMPLATE, "nozzle_rstep001.xml");
        assert_eq!(count, 1);
        assert_eq!(
            out,
            TEMPLATE.replace("Nozzle_10deg_skindepth_1.xml", "nozzle_rstep001.xml")
        );
    }
}
