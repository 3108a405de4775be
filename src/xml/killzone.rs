//! Complete nozzle geometry for one killzone sweep step.

use super::{element, push, render};
use crate::geometry::{Side, SweepStep};
use crate::models::Result;
use xmltree::Element;

/// Outer radius of the nozzle's first plane, cm.
const NOZZLE_TIP_RMAX: &str = "2.59223";

const REGION: &str = "NozzleRegion";
const POLYCONE: &str = "DD4hep_PolyconeSupport";

fn sign(side: Side) -> &'static str {
    match side {
        Side::Right => "",
        Side::Left => "-",
    }
}

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Right => "right",
        Side::Left => "left",
    }
}

fn vis(name: &str, alpha: &str, rgb: (&str, &str, &str), visible: bool) -> Element {
    element(
        "vis",
        &[
            ("name", name.to_string()),
            ("alpha", alpha.to_string()),
            ("r", rgb.0.to_string()),
            ("g", rgb.1.to_string()),
            ("b", rgb.2.to_string()),
            ("showDaughters", "false".to_string()),
            ("visible", visible.to_string()),
        ],
    )
}

fn detector(name: String, vis: &str, material: &str, limits: bool) -> Element {
    let mut attributes = vec![
        ("name", name),
        ("type", POLYCONE.to_string()),
        ("vis", vis.to_string()),
        ("region", REGION.to_string()),
    ];
    if limits {
        attributes.push(("limits", "NozzleRegionLimitSet".to_string()));
    }
    let mut detector = element("detector", &attributes);
    push(&mut detector, element("material", &[("name", material.to_string())]));
    detector
}

fn zplane(z: String, rmin: String, rmax: String) -> Element {
    element("zplane", &[("z", z), ("rmin", rmin), ("rmax", rmax)])
}

fn killzone(step: &SweepStep, side: Side) -> Element {
    let s = sign(side);
    let mut det = detector(
        format!("NozzleKillZone_{}", side_name(side)),
        "NozzleKillZoneVis",
        "Tungsten",
        true,
    );
    for plane in &step.killzone {
        push(
            &mut det,
            zplane(
                format!("{s}{:.2}*cm", plane.z),
                format!("{:.3}*cm", plane.rmin),
                format!("{:.5}*cm", plane.rmax),
            ),
        );
    }
    det
}

fn nozzle(step: &SweepStep, side: Side) -> Element {
    let s = sign(side);
    let rmin = format!("{:.5}*cm", step.nozzle_rmin);
    let mut det = detector(
        format!("NozzleW_{}", side_name(side)),
        "NozzleWVis",
        "Tungsten",
        false,
    );
    let planes = [
        (format!("{s}{:.2}*cm", step.nozzle_z), format!("{NOZZLE_TIP_RMAX}*cm")),
        (format!("{s}Nozzle_kink_z"), "17.63*cm".to_string()),
        (format!("{s}Nozzle_kink_z"), "15*cm".to_string()),
        (format!("{s}200*cm"), "17*cm".to_string()),
        (format!("{s}600*cm"), "50*cm".to_string()),
    ];
    for (z, rmax) in planes {
        push(&mut det, zplane(z, rmin.clone(), rmax));
    }
    det
}

fn borated_shield(side: Side) -> Element {
    let s = sign(side);
    let mut det = detector(
        format!("NozzleBCH_{}", side_name(side)),
        "NozzleBCHVis",
        "BCH2",
        false,
    );
    let planes = [
        ("Nozzle_kink_z", "15*cm", "17.63*cm"),
        ("200*cm", "17*cm", "26.104*cm"),
        ("Nozzle_zmax", "50*cm", "60*cm"),
    ];
    for (z, rmin, rmax) in planes {
        push(
            &mut det,
            zplane(format!("{s}{z}"), rmin.to_string(), rmax.to_string()),
        );
    }
    det
}

/// `<lccdd>` document with killzone, nozzle and borated shield on both
/// sides. `Nozzle_zmax` is left to the including file.
pub fn render_killzone(step: &SweepStep) -> Result<String> {
    let mut root = Element::new("lccdd");

    let mut define = Element::new("define");
    push(
        &mut define,
        element(
            "constant",
            &[
                ("name", "Nozzle_kink_z".to_string()),
                ("value", "100*cm".to_string()),
            ],
        ),
    );
    push(&mut root, define);

    let mut display = Element::new("display");
    push(&mut display, vis("NozzleWVis", "1.0", ("0.0", "1.0", "1.0"), true));
    push(&mut display, vis("NozzleKillZoneVis", "1.0", ("1.0", "1.0", "1.0"), true));
    push(&mut display, vis("NozzleBCHVis", "0.3", ("1.0", "1.0", "1.0"), false));
    push(&mut root, display);

    let mut detectors = Element::new("detectors");
    for side in Side::ALL {
        push(&mut detectors, killzone(step, side));
    }
    for side in Side::ALL {
        push(&mut detectors, nozzle(step, side));
    }
    for side in Side::ALL {
        push(&mut detectors, borated_shield(side));
    }
    push(&mut root, detectors);

    render(&root, "  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SweepPlan;
    use xmltree::Element;

    fn zplanes_of(root: &Element, name: &str) -> Vec<(String, String, String)> {
        let detectors = root.get_child("detectors").unwrap();
        let detector = detectors
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .find(|e| e.attributes.get("name").map(String::as_str) == Some(name))
            .unwrap();
        detector
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .filter(|e| e.name == "zplane")
            .map(|e| {
                let a = |k: &str| e.attributes.get(k).cloned().unwrap_or_default();
                (a("z"), a("rmin"), a("rmax"))
            })
            .collect()
    }

    #[test]
    fn test_first_step_document() {
        let plan = SweepPlan::new(6.0, 600.0, 50.0, 1.78, 100).unwrap();
        let steps = plan.steps();
        let text = render_killzone(&steps[0]).unwrap();
        let root = Element::parse(text.as_bytes()).unwrap();

        let kz = zplanes_of(&root, "NozzleKillZone_left");
        assert_eq!(kz.len(), 5);
        assert_eq!(
            kz[0],
            ("-6.00*cm".to_string(), "0.300*cm".to_string(), "2.49223*cm".to_string())
        );

        let nozzle = zplanes_of(&root, "NozzleW_right");
        assert_eq!(nozzle.len(), 5);
        assert_eq!(nozzle[0].0, "6.00*cm");
        assert_eq!(nozzle[0].1, "50.00000*cm");
        assert_eq!(nozzle[1].0, "Nozzle_kink_z");

        let bch = zplanes_of(&root, "NozzleBCH_left");
        assert_eq!(bch[2].0, "-Nozzle_zmax");
    }

    #[test]
    fn test_late_step_has_short_killzone() {
        let steps = SweepPlan::new(6.0, 600.0, 50.0, 1.78, 100).unwrap().steps();
        let text = render_killzone(&steps[99]).unwrap();
        let root = Element::parse(text.as_bytes()).unwrap();
        let kz = zplanes_of(&root, "NozzleKillZone_right");
        assert_eq!(kz.len(), 1);
        assert_eq!(kz[0].0, "600.00*cm");
        assert_eq!(kz[0].1, "1.780*cm");
    }
}
