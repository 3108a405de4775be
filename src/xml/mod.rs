//! Detector description documents: zplane rewriting, MAIA top-level files
//! and killzone sweep geometries.

mod detector;
mod killzone;
mod maia;
mod units;

pub use detector::{RewriteSummary, read_geometry, rewrite_detectors};
pub use killzone::render_killzone;
pub use maia::{basic_maia, retarget_include_lines, retarget_includes};
pub use units::{Constants, Quantity, format_units, parse_units};

use crate::models::{NozzleError, Result};
use std::fs;
use std::path::Path;
use xmltree::{Element, EmitterConfig, XMLNode};

pub(crate) fn load(path: &Path) -> Result<Element> {
    let content =
        fs::read(path).map_err(|e| NozzleError::io(format!("reading {}", path.display()), e))?;
    Element::parse(content.as_slice()).map_err(|e| NozzleError::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Serialize with an XML declaration, indenting with `indent`.
pub(crate) fn render(root: &Element, indent: &'static str) -> Result<String> {
    let mut buffer = Vec::new();
    root.write_with_config(
        &mut buffer,
        EmitterConfig::new()
            .perform_indent(true)
            .indent_string(indent),
    )
    .map_err(|e| NozzleError::XmlWrite(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| NozzleError::XmlWrite(e.to_string()))
}

pub(crate) fn save(root: &Element, path: &Path) -> Result<()> {
    let content = render(root, "    ")?;
    fs::write(path, content).map_err(|e| NozzleError::io(format!("writing {}", path.display()), e))
}

/// Depth-first visit of every element with the given tag.
pub(crate) fn visit(element: &Element, tag: &str, f: &mut impl FnMut(&Element)) {
    if element.name == tag {
        f(element);
    }
    for child in element.children.iter().filter_map(|n| n.as_element()) {
        visit(child, tag, f);
    }
}

pub(crate) fn visit_mut(element: &mut Element, tag: &str, f: &mut impl FnMut(&mut Element)) {
    if element.name == tag {
        f(element);
    }
    for child in element.children.iter_mut() {
        if let XMLNode::Element(child) = child {
            visit_mut(child, tag, f);
        }
    }
}

/// Element with attributes in the given order.
pub(crate) fn element(name: &str, attributes: &[(&str, String)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element.attributes.insert((*key).to_string(), value.clone());
    }
    element
}

pub(crate) fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}
