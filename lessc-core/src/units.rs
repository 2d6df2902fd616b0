//! Unit conversion (spec.md §9 open question).
//!
//! Two unit families have an unambiguous linear conversion: absolute
//! lengths and angles. Everything else (`px`, `em`, `rem`, `%`, viewport
//! units, time, resolution, ...) has no fixed ratio to any other unit
//! without assumptions this core does not make, so mixing two *different*
//! such units is a hard [`EvalError::IncompatibleUnits`].

/// Absolute length units, in conversion order, with their ratio to
/// centimeters.
const ABSOLUTE_LENGTHS: &[(&str, f64)] = &[
    ("cm", 1.0),
    ("mm", 0.1),
    ("in", 2.54),
    ("pt", 2.54 / 72.0),
    ("pc", 2.54 / 6.0),
];

/// Angle units, with their ratio to degrees.
const ANGLES: &[(&str, f64)] = &[
    ("deg", 1.0),
    ("grad", 0.9),
    ("rad", 180.0 / std::f64::consts::PI),
];

fn family_ratio(table: &[(&str, f64)], unit: &str) -> Option<f64> {
    table.iter().find(|(u, _)| u.eq_ignore_ascii_case(unit)).map(|(_, r)| *r)
}

/// Returns `value` converted from `from_unit` to `to_unit` if both units
/// belong to the same convertible family (absolute lengths or angles).
pub fn convert(value: f64, from_unit: &str, to_unit: &str) -> Option<f64> {
    if from_unit.eq_ignore_ascii_case(to_unit) {
        return Some(value);
    }
    if let (Some(from), Some(to)) =
        (family_ratio(ABSOLUTE_LENGTHS, from_unit), family_ratio(ABSOLUTE_LENGTHS, to_unit))
    {
        return Some(value * from / to);
    }
    if let (Some(from), Some(to)) = (family_ratio(ANGLES, from_unit), family_ratio(ANGLES, to_unit)) {
        return Some(value * from / to);
    }
    None
}

/// Whether `unit` belongs to a family this module knows how to convert
/// within (used to decide whether two differing units should attempt
/// conversion or fail outright).
pub fn is_convertible(unit: &str) -> bool {
    family_ratio(ABSOLUTE_LENGTHS, unit).is_some() || family_ratio(ANGLES, unit).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cm_to_mm() {
        assert_eq!(convert(1.0, "cm", "mm"), Some(10.0));
    }

    #[test]
    fn inches_to_cm() {
        let v = convert(1.0, "in", "cm").unwrap();
        assert!((v - 2.54).abs() < 1e-9);
    }

    #[test]
    fn deg_to_rad_family() {
        assert!(convert(180.0, "deg", "grad").unwrap() - 200.0 < 1e-9);
    }

    #[test]
    fn px_does_not_convert() {
        assert_eq!(convert(1.0, "px", "pt"), None);
        assert!(!is_convertible("px"));
    }
}
