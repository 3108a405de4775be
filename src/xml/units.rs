//! Unit-bearing attribute values (`6*cm`, `-Nozzle_kink_z`, `12.5`).

use crate::models::{NozzleError, Result};
use std::collections::HashMap;
use tracing::debug;
use xmltree::Element;

/// A number with an optional unit suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    pub fn cm(value: f64) -> Self {
        Self::new(value, "cm")
    }

    fn negated(&self) -> Self {
        Self::new(-self.value, self.unit.clone())
    }
}

/// Named constants that zplane attributes may refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Constants {
    values: HashMap<String, Quantity>,
}

impl Default for Constants {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert("Nozzle_zmin".to_string(), Quantity::cm(6.0));
        values.insert("Nozzle_kink_z".to_string(), Quantity::cm(100.0));
        values.insert("Nozzle_kink_max_r".to_string(), Quantity::cm(17.57473619));
        Self { values }
    }
}

impl Constants {
    pub fn get(&self, name: &str) -> Option<&Quantity> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, quantity: Quantity) {
        self.values.insert(name.into(), quantity);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Defaults extended by every `<define><constant name value/>` of a
    /// document. Constants may refer to earlier ones.
    pub fn from_document(root: &Element) -> Self {
        let mut constants = Self::default();
        let Some(define) = root.get_child("define") else {
            return constants;
        };

        for constant in define
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .filter(|e| e.name == "constant")
        {
            let (Some(name), Some(value)) =
                (constant.attributes.get("name"), constant.attributes.get("value"))
            else {
                continue;
            };
            match parse_units(value, &constants) {
                Ok(quantity) => constants.insert(name.clone(), quantity),
                Err(e) => debug!(name = %name, error = %e, "Skipping constant"),
            }
        }
        constants
    }

    fn lookup(&self, name: &str) -> Option<Quantity> {
        if let Some(q) = self.values.get(name) {
            return Some(q.clone());
        }
        name.strip_prefix('-')
            .and_then(|n| self.values.get(n))
            .map(Quantity::negated)
    }
}

/// Parse `name`, `-name`, `number`, `number*unit`, `name*unit` or
/// `-name*unit`. For `name*unit` the constant's value is taken as is and
/// `unit` becomes the unit.
pub fn parse_units(text: &str, constants: &Constants) -> Result<Quantity> {
    let text = text.trim();

    if let Some(q) = constants.lookup(text) {
        return Ok(q);
    }

    if let Some((number, unit)) = text.split_once('*') {
        let (number, unit) = (number.trim(), unit.trim());
        if let Some(q) = constants.lookup(number) {
            return Ok(Quantity::new(q.value, unit));
        }
        let value = parse_number(number, text)?;
        return Ok(Quantity::new(value, unit));
    }

    Ok(Quantity::new(parse_number(text, text)?, ""))
}

fn parse_number(number: &str, whole: &str) -> Result<f64> {
    number
        .parse::<f64>()
        .map_err(|_| NozzleError::ParseError(format!("Could not parse value '{whole}'")))
}

/// Value rounded to 8 decimals, followed by `*unit` when a unit is given.
pub fn format_units(value: f64, unit: &str) -> String {
    let value = format_float((value * 1e8).round() / 1e8);
    if unit.is_empty() {
        value
    } else {
        format!("{value}*{unit}")
    }
}

/// Shortest round-trip float text, always with a decimal point or exponent.
fn format_float(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        return match text.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(d) => ('-', d),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => text,
        };
    }
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let c = Constants::default();
        assert_eq!(parse_units("6*cm", &c).unwrap(), Quantity::cm(6.0));
        assert_eq!(parse_units(" -10.5176*cm ", &c).unwrap(), Quantity::cm(-10.5176));
        assert_eq!(parse_units("Nozzle_kink_z", &c).unwrap(), Quantity::cm(100.0));
        assert_eq!(parse_units("-Nozzle_kink_z", &c).unwrap(), Quantity::cm(-100.0));
        assert_eq!(parse_units("-Nozzle_zmin*mm", &c).unwrap(), Quantity::new(-6.0, "mm"));
        assert_eq!(parse_units("0.3", &c).unwrap(), Quantity::new(0.3, ""));
        assert!(parse_units("Nozzle_zmax", &c).is_err());
        assert!(parse_units("abc*cm", &c).is_err());
    }

    #[test]
    fn test_format_matches_geometry_files() {
        assert_eq!(format_units(6.0, "cm"), "6.0*cm");
        assert_eq!(format_units(10.5176, "cm"), "10.5176*cm");
        assert_eq!(format_units(-595.0, "cm"), "-595.0*cm");
        assert_eq!(format_units(1.000177000000001, "cm"), "1.000177*cm");
        assert_eq!(format_units(0.00001, "cm"), "1e-05*cm");
        assert_eq!(format_units(2.5, ""), "2.5");
    }

    #[test]
    fn test_constants_from_document() {
        let xml = r#"<lccdd>
            <define>
                <constant name="Nozzle_zmax" value="600*cm"/>
                <constant name="Nozzle_back" value="-Nozzle_zmax"/>
                <constant name="Broken" value="oops"/>
            </define>
        </lccdd>"#;
        let root = Element::parse(xml.as_bytes()).unwrap();
        let c = Constants::from_document(&root);
        assert_eq!(c.get("Nozzle_zmax"), Some(&Quantity::cm(600.0)));
        assert_eq!(c.get("Nozzle_back"), Some(&Quantity::cm(-600.0)));
        assert!(c.get("Broken").is_none());
        assert_eq!(c.len(), 5);
    }
}
