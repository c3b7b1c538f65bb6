//! Power-law PCI estimator for pixel-coverage inputs.
//!
//! A closed-form approximation used on video-analysis output, where each
//! defect category is reported as a percentage of road pixels. Each
//! category's deduct is `min(cap, a * density^b)`; deducts are combined with
//! fixed diminishing weights instead of the iterative ASTM correction in
//! [`crate::cdv`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::coerce_number;
use crate::rating::{get_pixel_based_pci_rating, PciRating};
use crate::types::DefectType;

// ---------------------------------------------------------------------------
// Curves and weights
// ---------------------------------------------------------------------------

/// `deduct = min(cap, coefficient * density^exponent)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawCurve {
    pub coefficient: f64,
    pub exponent: f64,
    pub cap: f64,
}

impl PowerLawCurve {
    pub fn deduct(&self, density: f64) -> f64 {
        (self.coefficient * density.powf(self.exponent)).min(self.cap)
    }
}

pub const ALLIGATOR_CURVE: PowerLawCurve = PowerLawCurve {
    coefficient: 28.0,
    exponent: 0.45,
    cap: 80.0,
};
pub const POTHOLE_CURVE: PowerLawCurve = PowerLawCurve {
    coefficient: 75.0,
    exponent: 0.2,
    cap: 100.0,
};
pub const LONGITUDINAL_CURVE: PowerLawCurve = PowerLawCurve {
    coefficient: 10.0,
    exponent: 0.5,
    cap: 40.0,
};
pub const TRANSVERSE_CURVE: PowerLawCurve = PowerLawCurve {
    coefficient: 10.0,
    exponent: 0.5,
    cap: 40.0,
};
pub const SEALED_CURVE: PowerLawCurve = PowerLawCurve {
    coefficient: 2.0,
    exponent: 0.35,
    cap: 15.0,
};

/// Weights applied to deducts sorted descending. Positions past the end
/// use [`TAIL_WEIGHT`].
pub const DIMINISHING_WEIGHTS: [f64; 4] = [1.0, 0.7, 0.4, 0.1];
pub const TAIL_WEIGHT: f64 = 0.1;

pub fn power_law_curve(defect_type: DefectType) -> Option<PowerLawCurve> {
    match defect_type {
        DefectType::Alligator => Some(ALLIGATOR_CURVE),
        DefectType::Pothole => Some(POTHOLE_CURVE),
        DefectType::Longitudinal => Some(LONGITUDINAL_CURVE),
        DefectType::Transverse => Some(TRANSVERSE_CURVE),
        DefectType::SealedCrack => Some(SEALED_CURVE),
        DefectType::Other => None,
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Percentage of road pixels covered by each defect category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelPercentages {
    pub alligator: f64,
    pub pothole: f64,
    pub longitudinal: f64,
    pub transverse: f64,
    #[serde(alias = "sealed")]
    pub sealed_crack: f64,
}

impl PixelPercentages {
    /// Read percentages from a loosely-keyed JSON object.
    ///
    /// Keys are matched through [`DefectType`] parsing, so `alligator_crack`
    /// and `Alligator` both land on `alligator`. Values that are not numbers
    /// are skipped; unknown keys are ignored.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut out = Self::default();
        for (key, raw) in obj {
            let (Ok(defect_type), Some(pct)) = (key.parse::<DefectType>(), coerce_number(raw)) else {
                continue;
            };
            if let Some(slot) = out.slot_mut(defect_type) {
                *slot += pct;
            }
        }
        Some(out)
    }

    pub fn get(&self, defect_type: DefectType) -> f64 {
        match defect_type {
            DefectType::Alligator => self.alligator,
            DefectType::Pothole => self.pothole,
            DefectType::Longitudinal => self.longitudinal,
            DefectType::Transverse => self.transverse,
            DefectType::SealedCrack => self.sealed_crack,
            DefectType::Other => 0.0,
        }
    }

    fn slot_mut(&mut self, defect_type: DefectType) -> Option<&mut f64> {
        match defect_type {
            DefectType::Alligator => Some(&mut self.alligator),
            DefectType::Pothole => Some(&mut self.pothole),
            DefectType::Longitudinal => Some(&mut self.longitudinal),
            DefectType::Transverse => Some(&mut self.transverse),
            DefectType::SealedCrack => Some(&mut self.sealed_crack),
            DefectType::Other => None,
        }
    }

    /// Sum of all category percentages, clamped to `[0, 100]`.
    pub fn total(&self) -> f64 {
        let sum: f64 = SCORED_TYPES
            .iter()
            .map(|t| self.get(*t))
            .filter(|v| v.is_finite() && *v > 0.0)
            .sum();
        sum.clamp(0.0, 100.0)
    }
}

const SCORED_TYPES: [DefectType; 5] = [
    DefectType::Alligator,
    DefectType::Pothole,
    DefectType::Longitudinal,
    DefectType::Transverse,
    DefectType::SealedCrack,
];

/// Estimator options.
#[derive(Debug, Clone, PartialEq)]
pub struct PciOptions {
    /// Score sealed cracks with their (flat) curve.
    pub include_sealed: bool,
    /// Per-type defect counts echoed into [`DamageMetrics`].
    pub defect_counts: BTreeMap<DefectType, u32>,
}

impl Default for PciOptions {
    fn default() -> Self {
        Self {
            include_sealed: true,
            defect_counts: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Which model produced a [`PciResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PciMethod {
    PowerLaw,
    Astm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageMetrics {
    /// Percentage of the segment affected by any defect.
    pub affected_percentage: f64,
    pub defect_counts: BTreeMap<DefectType, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PciResult {
    /// 0-100, one decimal.
    pub pci_score: f64,
    pub pci_rating: PciRating,
    pub method: PciMethod,
    /// Sum of individual deducts before combination.
    pub total_deduct_value: f64,
    /// Combined deduct subtracted from 100.
    pub corrected_deduct_value: f64,
    pub deduct_breakdown: BTreeMap<DefectType, f64>,
    pub damage_metrics: DamageMetrics,
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Score from a combined deduct: `max(0, 100 - cdv)`, one decimal.
pub fn score_from_cdv(cdv: f64) -> f64 {
    round1((100.0 - cdv.clamp(0.0, 100.0)).max(0.0))
}

/// Weighted combination of deducts sorted descending, clamped to 100.
pub fn combine_weighted(deducts: &[f64]) -> f64 {
    let mut sorted = deducts.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let total: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, d)| d * DIMINISHING_WEIGHTS.get(i).copied().unwrap_or(TAIL_WEIGHT))
        .sum();
    total.clamp(0.0, 100.0)
}

/// Estimate PCI from per-category pixel coverage percentages.
pub fn calculate_pci(pixels: &PixelPercentages, options: &PciOptions) -> PciResult {
    let mut breakdown = BTreeMap::new();
    for defect_type in SCORED_TYPES {
        if defect_type == DefectType::SealedCrack && !options.include_sealed {
            continue;
        }
        let density = pixels.get(defect_type);
        if !(density.is_finite() && density > 0.0) {
            continue;
        }
        if let Some(curve) = power_law_curve(defect_type) {
            breakdown.insert(defect_type, curve.deduct(density));
        }
    }

    let deducts: Vec<f64> = breakdown.values().copied().collect();
    let total_cdv = combine_weighted(&deducts);
    let pci_score = score_from_cdv(total_cdv);

    PciResult {
        pci_score,
        pci_rating: get_pixel_based_pci_rating(pci_score),
        method: PciMethod::PowerLaw,
        total_deduct_value: round1(deducts.iter().sum()),
        corrected_deduct_value: round1(total_cdv),
        deduct_breakdown: breakdown.into_iter().map(|(k, v)| (k, round1(v))).collect(),
        damage_metrics: DamageMetrics {
            affected_percentage: round1(pixels.total()),
            defect_counts: options.defect_counts.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_road_scores_100_good() {
        let r = calculate_pci(&PixelPercentages::default(), &PciOptions::default());
        assert_eq!(r.pci_score, 100.0);
        assert_eq!(r.pci_rating, PciRating::Good);
        assert!(r.deduct_breakdown.is_empty());
    }

    #[test]
    fn single_alligator_percent() {
        let pixels = PixelPercentages {
            alligator: 1.0,
            ..Default::default()
        };
        let r = calculate_pci(&pixels, &PciOptions::default());
        assert_eq!(r.deduct_breakdown[&DefectType::Alligator], 28.0);
        assert_eq!(r.pci_score, 72.0);
        assert_eq!(r.pci_rating, PciRating::Satisfactory);
    }

    #[test]
    fn pothole_dominates_sealed_at_equal_density() {
        let pothole = calculate_pci(
            &PixelPercentages {
                pothole: 5.0,
                ..Default::default()
            },
            &PciOptions::default(),
        );
        let sealed = calculate_pci(
            &PixelPercentages {
                sealed_crack: 5.0,
                ..Default::default()
            },
            &PciOptions::default(),
        );
        assert!(pothole.pci_score + 50.0 < sealed.pci_score);
    }

    #[test]
    fn caps_apply_per_category() {
        assert_eq!(ALLIGATOR_CURVE.deduct(100.0), 80.0);
        assert_eq!(LONGITUDINAL_CURVE.deduct(100.0), 40.0);
        assert_eq!(SEALED_CURVE.deduct(100.0), 15.0);
        assert_eq!(POTHOLE_CURVE.deduct(50.0), 100.0);
    }

    #[test]
    fn weights_diminish_then_flatten() {
        let combined = combine_weighted(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        assert!((combined - 23.0).abs() < 1e-9);
        assert_eq!(combine_weighted(&[]), 0.0);
        assert_eq!(combine_weighted(&[90.0, 90.0]), 100.0);
    }

    #[test]
    fn score_never_negative() {
        let pixels = PixelPercentages {
            alligator: 100.0,
            pothole: 100.0,
            longitudinal: 100.0,
            transverse: 100.0,
            sealed_crack: 100.0,
        };
        let r = calculate_pci(&pixels, &PciOptions::default());
        assert_eq!(r.pci_score, 0.0);
        assert_eq!(r.pci_rating, PciRating::Failed);
    }

    #[test]
    fn sealed_can_be_excluded() {
        let pixels = PixelPercentages {
            sealed_crack: 10.0,
            ..Default::default()
        };
        let opts = PciOptions {
            include_sealed: false,
            ..Default::default()
        };
        assert_eq!(calculate_pci(&pixels, &opts).pci_score, 100.0);
    }

    #[test]
    fn negative_and_nan_densities_are_skipped() {
        let pixels = PixelPercentages {
            alligator: -3.0,
            pothole: f64::NAN,
            ..Default::default()
        };
        assert_eq!(calculate_pci(&pixels, &PciOptions::default()).pci_score, 100.0);
    }

    #[test]
    fn pixel_percentages_from_loose_keys() {
        let value = json!({
            "alligator_crack": "1.5",
            "Pothole": 0.2,
            "sealed": 3,
            "shadow": 40,
            "transverse": null
        });
        let p = PixelPercentages::from_value(&value).unwrap();
        assert_eq!(p.alligator, 1.5);
        assert_eq!(p.pothole, 0.2);
        assert_eq!(p.sealed_crack, 3.0);
        assert_eq!(p.transverse, 0.0);
        assert!(PixelPercentages::from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn damage_metrics_echo_counts() {
        let mut counts = BTreeMap::new();
        counts.insert(DefectType::Pothole, 2);
        let opts = PciOptions {
            defect_counts: counts.clone(),
            ..Default::default()
        };
        let pixels = PixelPercentages {
            pothole: 0.4,
            transverse: 0.6,
            ..Default::default()
        };
        let r = calculate_pci(&pixels, &opts);
        assert_eq!(r.damage_metrics.defect_counts, counts);
        assert_eq!(r.damage_metrics.affected_percentage, 1.0);
    }
}
