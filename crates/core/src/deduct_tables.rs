//! ASTM D6433-style deduct-value curves.
//!
//! Each curve maps distress density (percent of the sample unit, 0-100)
//! to a deduct value (0-100). Curves are static break-point tables; values
//! between break-points are linearly interpolated.

use crate::types::{DefectType, Severity};

/// A piecewise-linear curve as `(x, y)` break-points sorted by `x`.
pub type Curve = &'static [(f64, f64)];

// ---------------------------------------------------------------------------
// Curves
// ---------------------------------------------------------------------------

const TRANSVERSE_LOW: Curve = &[
    (0.0, 0.0),
    (0.1, 0.0),
    (0.5, 2.0),
    (1.0, 3.0),
    (2.0, 5.0),
    (5.0, 9.0),
    (10.0, 13.0),
    (20.0, 18.0),
    (50.0, 25.0),
    (100.0, 30.0),
];
const TRANSVERSE_MEDIUM: Curve = &[
    (0.0, 0.0),
    (0.1, 2.0),
    (0.5, 6.0),
    (1.0, 9.0),
    (2.0, 13.0),
    (5.0, 20.0),
    (10.0, 27.0),
    (20.0, 35.0),
    (50.0, 45.0),
    (100.0, 53.0),
];
const TRANSVERSE_HIGH: Curve = &[
    (0.0, 0.0),
    (0.1, 5.0),
    (0.5, 12.0),
    (1.0, 17.0),
    (2.0, 23.0),
    (5.0, 33.0),
    (10.0, 42.0),
    (20.0, 52.0),
    (50.0, 65.0),
    (100.0, 75.0),
];

const LONGITUDINAL_LOW: Curve = &[
    (0.0, 0.0),
    (0.1, 0.0),
    (0.5, 1.5),
    (1.0, 2.5),
    (2.0, 4.5),
    (5.0, 8.0),
    (10.0, 12.0),
    (20.0, 17.0),
    (50.0, 24.0),
    (100.0, 29.0),
];
const LONGITUDINAL_MEDIUM: Curve = &[
    (0.0, 0.0),
    (0.1, 1.5),
    (0.5, 5.0),
    (1.0, 8.0),
    (2.0, 12.0),
    (5.0, 19.0),
    (10.0, 26.0),
    (20.0, 34.0),
    (50.0, 44.0),
    (100.0, 52.0),
];
const LONGITUDINAL_HIGH: Curve = &[
    (0.0, 0.0),
    (0.1, 4.0),
    (0.5, 11.0),
    (1.0, 16.0),
    (2.0, 22.0),
    (5.0, 32.0),
    (10.0, 41.0),
    (20.0, 51.0),
    (50.0, 64.0),
    (100.0, 74.0),
];

const ALLIGATOR_LOW: Curve = &[
    (0.0, 0.0),
    (0.1, 4.0),
    (0.5, 11.0),
    (1.0, 16.0),
    (2.0, 21.0),
    (5.0, 30.0),
    (10.0, 38.0),
    (20.0, 46.0),
    (50.0, 57.0),
    (100.0, 65.0),
];
const ALLIGATOR_MEDIUM: Curve = &[
    (0.0, 0.0),
    (0.1, 8.0),
    (0.5, 18.0),
    (1.0, 25.0),
    (2.0, 32.0),
    (5.0, 43.0),
    (10.0, 52.0),
    (20.0, 62.0),
    (50.0, 74.0),
    (100.0, 83.0),
];
const ALLIGATOR_HIGH: Curve = &[
    (0.0, 0.0),
    (0.1, 12.0),
    (0.5, 25.0),
    (1.0, 34.0),
    (2.0, 43.0),
    (5.0, 56.0),
    (10.0, 66.0),
    (20.0, 76.0),
    (50.0, 89.0),
    (100.0, 98.0),
];

const POTHOLE_LOW: Curve = &[
    (0.0, 0.0),
    (0.01, 4.0),
    (0.1, 15.0),
    (0.5, 30.0),
    (1.0, 38.0),
    (2.0, 48.0),
    (5.0, 62.0),
    (10.0, 73.0),
    (20.0, 84.0),
    (50.0, 95.0),
    (100.0, 100.0),
];
const POTHOLE_MEDIUM: Curve = &[
    (0.0, 0.0),
    (0.01, 8.0),
    (0.1, 25.0),
    (0.5, 45.0),
    (1.0, 55.0),
    (2.0, 65.0),
    (5.0, 79.0),
    (10.0, 90.0),
    (20.0, 98.0),
    (50.0, 100.0),
    (100.0, 100.0),
];
const POTHOLE_HIGH: Curve = &[
    (0.0, 0.0),
    (0.01, 14.0),
    (0.1, 38.0),
    (0.5, 62.0),
    (1.0, 72.0),
    (2.0, 82.0),
    (5.0, 94.0),
    (10.0, 100.0),
    (20.0, 100.0),
    (50.0, 100.0),
    (100.0, 100.0),
];

/// Deduct curve for a defect type and severity, if the type is rated.
///
/// Sealed cracks and unclassified defects carry no ASTM deduct.
pub fn deduct_curve(defect_type: DefectType, severity: Severity) -> Option<Curve> {
    let curve = match (defect_type, severity) {
        (DefectType::Transverse, Severity::Low) => TRANSVERSE_LOW,
        (DefectType::Transverse, Severity::Medium) => TRANSVERSE_MEDIUM,
        (DefectType::Transverse, Severity::High) => TRANSVERSE_HIGH,
        (DefectType::Longitudinal, Severity::Low) => LONGITUDINAL_LOW,
        (DefectType::Longitudinal, Severity::Medium) => LONGITUDINAL_MEDIUM,
        (DefectType::Longitudinal, Severity::High) => LONGITUDINAL_HIGH,
        (DefectType::Alligator, Severity::Low) => ALLIGATOR_LOW,
        (DefectType::Alligator, Severity::Medium) => ALLIGATOR_MEDIUM,
        (DefectType::Alligator, Severity::High) => ALLIGATOR_HIGH,
        (DefectType::Pothole, Severity::Low) => POTHOLE_LOW,
        (DefectType::Pothole, Severity::Medium) => POTHOLE_MEDIUM,
        (DefectType::Pothole, Severity::High) => POTHOLE_HIGH,
        (DefectType::SealedCrack | DefectType::Other, _) => return None,
    };
    Some(curve)
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Piecewise-linear interpolation over `curve`.
///
/// `x` below the first break-point returns the first `y`; above the last
/// returns the last `y`. Non-finite `x` is treated as the first break-point.
pub fn interpolate(curve: &[(f64, f64)], x: f64) -> f64 {
    let (first, last) = match (curve.first(), curve.last()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return 0.0,
    };
    if !x.is_finite() || x <= first.0 {
        return first.1;
    }
    if x >= last.0 {
        return last.1;
    }
    for pair in curve.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            if (x1 - x0).abs() < f64::EPSILON {
                return y1;
            }
            return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        }
    }
    last.1
}

/// Deduct value for one distress type, severity and density percentage.
///
/// Density is clamped to `[0, 100]`; the result is always in `[0, 100]`.
pub fn get_deduct_value(defect_type: DefectType, severity: Severity, density: f64) -> f64 {
    let Some(curve) = deduct_curve(defect_type, severity) else {
        return 0.0;
    };
    let density = if density.is_finite() {
        density.clamp(0.0, 100.0)
    } else {
        0.0
    };
    interpolate(curve, density).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
