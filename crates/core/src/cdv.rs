//! Corrected Deduct Value (CDV) for multiple simultaneous distresses.
//!
//! Implements the ASTM iterative correction: limit the number of deducts
//! that may stack, then repeatedly look up a CDV from the q-curve for the
//! current total and reduce the smallest significant deduct to 2.0 until
//! only one significant deduct remains. The highest CDV seen wins.
//!
//! Each reduction step is a pure function over an immutable slice so that
//! individual steps can be tested in isolation.

use serde::Serialize;

use crate::deduct_tables::{interpolate, Curve};

/// Deducts at or below this value are not "significant" for the q count.
pub const SIGNIFICANT_DEDUCT: f64 = 2.0;

/// Upper bound on the allowable number of deducts.
pub const MAX_ALLOWABLE_DEDUCTS: f64 = 10.0;

/// Hard cap on reduction iterations.
pub const MAX_CORRECTION_ITERATIONS: usize = 20;

// ---------------------------------------------------------------------------
// Correction curves (TDV -> CDV), indexed by q = 1..=10
// ---------------------------------------------------------------------------

const Q1: Curve = &[(0.0, 0.0), (100.0, 100.0)];
const Q2: Curve = &[
    (0.0, 0.0),
    (10.0, 7.0),
    (20.0, 15.0),
    (40.0, 30.0),
    (60.0, 44.0),
    (80.0, 57.0),
    (100.0, 68.0),
    (120.0, 78.0),
    (140.0, 87.0),
    (160.0, 94.0),
    (180.0, 99.0),
    (200.0, 100.0),
];
const Q3: Curve = &[
    (0.0, 0.0),
    (20.0, 12.0),
    (40.0, 26.0),
    (60.0, 39.0),
    (80.0, 51.0),
    (100.0, 61.0),
    (120.0, 70.0),
    (140.0, 78.0),
    (160.0, 85.0),
    (180.0, 91.0),
    (200.0, 96.0),
];
const Q4: Curve = &[
    (0.0, 0.0),
    (20.0, 10.0),
    (40.0, 23.0),
    (60.0, 35.0),
    (80.0, 46.0),
    (100.0, 56.0),
    (120.0, 65.0),
    (140.0, 73.0),
    (160.0, 80.0),
    (180.0, 86.0),
    (200.0, 91.0),
];
const Q5: Curve = &[
    (0.0, 0.0),
    (20.0, 8.0),
    (40.0, 20.0),
    (60.0, 32.0),
    (80.0, 43.0),
    (100.0, 52.0),
    (120.0, 61.0),
    (140.0, 69.0),
    (160.0, 76.0),
    (180.0, 82.0),
    (200.0, 87.0),
];
const Q6: Curve = &[
    (0.0, 0.0),
    (20.0, 7.0),
    (40.0, 18.0),
    (60.0, 29.0),
    (80.0, 40.0),
    (100.0, 49.0),
    (120.0, 58.0),
    (140.0, 66.0),
    (160.0, 73.0),
    (180.0, 79.0),
    (200.0, 84.0),
];
const Q7: Curve = &[
    (0.0, 0.0),
    (20.0, 6.0),
    (40.0, 17.0),
    (60.0, 28.0),
    (80.0, 38.0),
    (100.0, 47.0),
    (120.0, 56.0),
    (140.0, 64.0),
    (160.0, 71.0),
    (180.0, 77.0),
    (200.0, 82.0),
];
const Q8: Curve = &[
    (0.0, 0.0),
    (20.0, 5.0),
    (40.0, 16.0),
    (60.0, 27.0),
    (80.0, 37.0),
    (100.0, 46.0),
    (120.0, 54.0),
    (140.0, 62.0),
    (160.0, 69.0),
    (180.0, 75.0),
    (200.0, 80.0),
];
const Q9: Curve = &[
    (0.0, 0.0),
    (20.0, 5.0),
    (40.0, 15.0),
    (60.0, 26.0),
    (80.0, 36.0),
    (100.0, 45.0),
    (120.0, 53.0),
    (140.0, 61.0),
    (160.0, 68.0),
    (180.0, 74.0),
    (200.0, 79.0),
];
const Q10: Curve = &[
    (0.0, 0.0),
    (20.0, 4.0),
    (40.0, 14.0),
    (60.0, 25.0),
    (80.0, 35.0),
    (100.0, 44.0),
    (120.0, 52.0),
    (140.0, 60.0),
    (160.0, 67.0),
    (180.0, 73.0),
    (200.0, 78.0),
];

const CORRECTION_CURVES: [Curve; 10] = [Q1, Q2, Q3, Q4, Q5, Q6, Q7, Q8, Q9, Q10];

/// CDV for a total deduct value on the curve for `q` (clamped to 1..=10).
pub fn corrected_deduct_for(q: usize, total_deduct_value: f64) -> f64 {
    let idx = q.clamp(1, CORRECTION_CURVES.len()) - 1;
    interpolate(CORRECTION_CURVES[idx], total_deduct_value).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// Pure steps
// ---------------------------------------------------------------------------

/// Number of deducts above [`SIGNIFICANT_DEDUCT`].
pub fn significant_count(values: &[f64]) -> usize {
    values.iter().filter(|v| **v > SIGNIFICANT_DEDUCT).count()
}

/// Allowable number of deducts `m` for a given highest deduct value.
pub fn allowable_deduct_count(highest_deduct: f64) -> f64 {
    (1.0 + (9.0 / 98.0) * (100.0 - highest_deduct)).min(MAX_ALLOWABLE_DEDUCTS)
}

/// Sort descending and keep the `floor(m)` largest values plus the next
/// value scaled by the fractional part of `m`.
pub fn retain_allowable(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let Some(&highest) = sorted.first() else {
        return sorted;
    };

    let m = allowable_deduct_count(highest);
    let whole = m.floor() as usize;
    let fraction = m - m.floor();

    let mut retained: Vec<f64> = sorted.iter().take(whole).copied().collect();
    if fraction > 0.0 {
        if let Some(next) = sorted.get(whole) {
            retained.push(next * fraction);
        }
    }
    retained
}

/// Clamp the smallest value above 2.0 down to exactly 2.0.
///
/// Returns `None` when no value is above 2.0.
pub fn reduce_smallest_significant(values: &[f64]) -> Option<Vec<f64>> {
    let (idx, _) = values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > SIGNIFICANT_DEDUCT)
        .min_by(|(_, a), (_, b)| a.total_cmp(b))?;
    let mut next = values.to_vec();
    next[idx] = SIGNIFICANT_DEDUCT;
    Some(next)
}

// ---------------------------------------------------------------------------
// Correction
// ---------------------------------------------------------------------------

/// One iteration of the reduction loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrectionStep {
    pub q: usize,
    pub total_deduct_value: f64,
    pub corrected_deduct_value: f64,
}

/// Full record of a correction run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectionOutcome {
    /// Final CDV in `[0, 100]`.
    pub corrected_deduct_value: f64,
    /// `true` when at most one deduct was significant and the sum was used.
    pub direct_sum: bool,
    /// Allowable deduct count `m`, when the iterative path ran.
    pub allowable_count: Option<f64>,
    pub steps: Vec<CorrectionStep>,
    /// Invariant violations hit during iteration.
    pub warnings: Vec<String>,
}

/// Drop non-finite and negative inputs, clamp the rest to `[0, 100]`.
fn sanitize(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.min(100.0))
        .collect()
}

/// Run the correction and keep every intermediate step.
pub fn correction_trace(deduct_values: &[f64]) -> CorrectionOutcome {
    let values = sanitize(deduct_values);

    if significant_count(&values) <= 1 {
        let sum: f64 = values.iter().sum();
        return CorrectionOutcome {
            corrected_deduct_value: sum.min(100.0),
            direct_sum: true,
            allowable_count: None,
            steps: Vec::new(),
            warnings: Vec::new(),
        };
    }

    let mut current = retain_allowable(&values);
    let allowable = current.first().map(|h| allowable_deduct_count(*h));
    let mut steps = Vec::new();
    let mut warnings = Vec::new();
    let mut converged = false;

    for _ in 0..MAX_CORRECTION_ITERATIONS {
        let q = significant_count(&current);
        let total: f64 = current.iter().sum();
        steps.push(CorrectionStep {
            q,
            total_deduct_value: total,
            corrected_deduct_value: corrected_deduct_for(q, total),
        });
        if q <= 1 {
            converged = true;
            break;
        }
        match reduce_smallest_significant(&current) {
            Some(next) => current = next,
            None => {
                let msg = format!("q = {q} but no deduct above {SIGNIFICANT_DEDUCT} to reduce");
                tracing::warn!(q, total, "CDV correction stopped early: {msg}");
                warnings.push(msg);
                converged = true;
                break;
            }
        }
    }

    if !converged {
        let msg = format!("CDV correction hit the {MAX_CORRECTION_ITERATIONS}-iteration cap");
        tracing::warn!(steps = steps.len(), "{msg}");
        warnings.push(msg);
    }

    let best = steps
        .iter()
        .map(|s| s.corrected_deduct_value)
        .fold(0.0_f64, f64::max);

    CorrectionOutcome {
        corrected_deduct_value: best.clamp(0.0, 100.0),
        direct_sum: false,
        allowable_count: allowable,
        steps,
        warnings,
    }
}

/// Combine individual deduct values into one Corrected Deduct Value.
pub fn apply_multiple_deduct_correction(deduct_values: &[f64]) -> f64 {
    correction_trace(deduct_values).corrected_deduct_value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
