//! Full ASTM PCI calculation from distress observations.
//!
//! Looks up a deduct per observation from [`crate::deduct_tables`], folds
//! them through the iterative correction in [`crate::cdv`], and rates the
//! result on the standard scale.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cdv::correction_trace;
use crate::deduct_tables::get_deduct_value;
use crate::error::CoreError;
use crate::pci::{round1, score_from_cdv, DamageMetrics, PciMethod, PciResult};
use crate::rating::get_pci_rating;
use crate::types::{DefectType, Severity};

/// One distress type/severity with its density in the sample unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistressObservation {
    pub defect_type: DefectType,
    pub severity: Severity,
    /// Percent of the sample unit area (or length for linear cracks).
    pub density: f64,
    /// Number of individual defects behind this observation.
    #[serde(default)]
    pub count: u32,
}

/// Density as a percentage of the sample unit.
pub fn density_percent(quantity: f64, sample_area: f64) -> Result<f64, CoreError> {
    if !(sample_area.is_finite() && sample_area > 0.0) {
        return Err(CoreError::Validation(format!(
            "sample_area must be > 0, got {sample_area}"
        )));
    }
    if !quantity.is_finite() || quantity < 0.0 {
        return Ok(0.0);
    }
    Ok((quantity / sample_area * 100.0).clamp(0.0, 100.0))
}

/// Score a sample unit from its distress observations.
pub fn calculate_astm_pci(observations: &[DistressObservation]) -> PciResult {
    let mut breakdown: BTreeMap<DefectType, f64> = BTreeMap::new();
    let mut counts: BTreeMap<DefectType, u32> = BTreeMap::new();
    let mut deducts = Vec::with_capacity(observations.len());
    let mut affected = 0.0;

    for obs in observations {
        let dv = get_deduct_value(obs.defect_type, obs.severity, obs.density);
        if obs.count > 0 {
            *counts.entry(obs.defect_type).or_default() += obs.count;
        }
        if obs.density.is_finite() && obs.density > 0.0 {
            affected += obs.density;
        }
        if dv <= 0.0 {
            continue;
        }
        *breakdown.entry(obs.defect_type).or_default() += dv;
        deducts.push(dv);
    }

    let outcome = correction_trace(&deducts);
    let pci_score = score_from_cdv(outcome.corrected_deduct_value);

    tracing::debug!(
        observations = observations.len(),
        deducts = deducts.len(),
        cdv = outcome.corrected_deduct_value,
        pci_score,
        "ASTM PCI computed"
    );

    PciResult {
        pci_score,
        pci_rating: get_pci_rating(pci_score),
        method: PciMethod::Astm,
        total_deduct_value: round1(deducts.iter().sum()),
        corrected_deduct_value: round1(outcome.corrected_deduct_value),
        deduct_breakdown: breakdown.into_iter().map(|(k, v)| (k, round1(v))).collect(),
        damage_metrics: DamageMetrics {
            affected_percentage: round1(f64::min(affected, 100.0)),
            defect_counts: counts,
        },
    }
}
